//! Configuration management

pub mod settings;

pub use settings::{GenerationSettings, ModelSettings, ServerSettings, Settings};
