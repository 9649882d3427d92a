//! Loading a ready-to-use [`Generator`] from settings

use std::path::Path;
use std::sync::Arc;

use crate::config::{ModelSettings, Settings};
use crate::error::{GenerationError, Result};
use crate::model::{ModelSignature, RecurrentModel};
use crate::session::Generator;
use crate::vocab::Vocabulary;

/// Load the recurrent model described by `settings`.
#[cfg(feature = "onnx")]
pub fn load_model(settings: &ModelSettings) -> Result<Arc<dyn RecurrentModel>> {
    let model = crate::model::OnnxModel::from_file(&settings.path, &settings.signature())?;
    Ok(Arc::new(model))
}

/// Load the recurrent model described by `settings`.
///
/// Always fails: this build has no model backend.
#[cfg(not(feature = "onnx"))]
pub fn load_model(settings: &ModelSettings) -> Result<Arc<dyn RecurrentModel>> {
    Err(GenerationError::ModelLoad(
        format!(
            "cannot load {}: built without the `onnx` feature",
            settings.path.display()
        )
        .into(),
    ))
}

/// Build a generator from an already-loaded model.
pub fn generator_with_model(
    model: Arc<dyn RecurrentModel>,
    vocab_path: &Path,
    signature: ModelSignature,
    settings: &Settings,
) -> Result<Generator> {
    let vocab = Vocabulary::from_file(vocab_path)?;
    Ok(Generator::new(model, Arc::new(vocab), signature)
        .with_yield_delay(settings.generation.yield_delay()))
}

/// Load vocabulary and model, then build a generator.
pub fn load_generator(settings: &Settings) -> Result<Generator> {
    if !settings.model.vocab.exists() {
        return Err(GenerationError::VocabularyLoad(format!(
            "{} not found",
            settings.model.vocab.display()
        )));
    }
    let model = load_model(&settings.model)?;
    generator_with_model(
        model,
        &settings.model.vocab,
        settings.model.signature(),
        settings,
    )
}
