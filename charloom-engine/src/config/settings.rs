//! Settings configuration
//!
//! Manages user-configurable settings for generation and the front ends.
//! Default values are defined in `config/default.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::ModelSignature;
use crate::sampler::{SamplingConfig, Temperature};

/// Default configuration TOML embedded from config/default.toml
const DEFAULT_CONFIG_TOML: &str = include_str!("../../config/default.toml");

/// Configuration settings for charloom
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Model and vocabulary files
    pub model: ModelSettings,
    /// Generation defaults
    pub generation: GenerationSettings,
    /// HTTP server settings
    pub server: ServerSettings,
}

/// Model-related settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Path to the exported ONNX model
    pub path: PathBuf,
    /// Path to the vocabulary JSON file
    pub vocab: PathBuf,
    pub input_name: String,
    pub hidden_input_name: String,
    pub logits_output_name: String,
    pub hidden_output_name: String,
    /// Recurrent layers (first axis of the hidden state)
    pub num_layers: usize,
    /// Hidden width (last axis of the hidden state)
    pub hidden_size: usize,
}

/// Defaults applied when a request leaves a value unset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Characters to generate per request
    pub num_chars: usize,
    /// Softmax temperature (non-positive values fall back to 1.0)
    pub temperature: f32,
    /// Sampler seed; random when unset
    #[serde(default)]
    pub seed: Option<u64>,
    /// Pause between characters in milliseconds
    #[serde(default)]
    pub yield_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG_TOML).expect("embedded default.toml must be valid")
    }
}

impl ModelSettings {
    /// Input/output names and state dimensions for the inference step
    pub fn signature(&self) -> ModelSignature {
        ModelSignature {
            input_name: self.input_name.clone(),
            hidden_input_name: self.hidden_input_name.clone(),
            logits_output_name: self.logits_output_name.clone(),
            hidden_output_name: self.hidden_output_name.clone(),
            num_layers: self.num_layers,
            hidden_size: self.hidden_size,
        }
    }
}

impl GenerationSettings {
    pub fn sampling(&self) -> SamplingConfig {
        SamplingConfig {
            temperature: Temperature::or_default(Some(self.temperature)),
            seed: self.seed,
        }
    }

    pub fn yield_delay(&self) -> Duration {
        Duration::from_millis(self.yield_delay_ms)
    }
}

/// Overlay `user` onto `base`. Tables present in both are merged key by key;
/// every other user value replaces the base value.
fn overlay(base: &mut toml::Table, user: toml::Table) {
    for (key, value) in user {
        match value {
            toml::Value::Table(nested) if base.get(&key).is_some_and(toml::Value::is_table) => {
                if let Some(toml::Value::Table(inner)) = base.get_mut(&key) {
                    overlay(inner, nested);
                }
            }
            value => {
                base.insert(key, value);
            }
        }
    }
}

impl Settings {
    /// Platform configuration directory, e.g. `~/.config/charloom` on Linux
    pub fn config_dir() -> Option<PathBuf> {
        ProjectDirs::from("com", "charloom", "charloom").map(|dirs| dirs.config_dir().to_owned())
    }

    /// `config.toml` inside [`Settings::config_dir`]
    pub fn config_file() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Parse TOML text. Keys it leaves out keep their embedded default.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut table: toml::Table = toml::from_str(DEFAULT_CONFIG_TOML)?;
        overlay(&mut table, toml::from_str(content)?);
        Ok(toml::Value::Table(table).try_into()?)
    }

    /// Load the user's config file, or the defaults when there is none.
    pub fn load() -> Result<Self> {
        match Self::config_file() {
            Some(path) if path.exists() => Self::load_from(&path),
            Some(path) => {
                debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            None => {
                warn!("Could not determine config directory, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load a specific file on top of the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {}", path.display());
        let content = fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Write the complete settings to `path`, creating missing directories.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)
            .with_context(|| format!("cannot write {}", path.display()))?;
        debug!("Wrote config to {}", path.display());
        Ok(())
    }
}
