//! Boundary to the pretrained recurrent model
//!
//! The model itself is opaque: it takes a token sequence plus the current
//! recurrent state and returns named output tensors. [`step`] turns one such
//! call into a sampled character.

#[cfg(feature = "onnx")]
pub mod onnx;
pub mod step;
pub mod tensor;

#[cfg(feature = "onnx")]
pub use onnx::OnnxModel;
pub use step::{InferenceStep, StepOutput, last_timestep};
pub use tensor::{FloatTensor, ModelOutputs, RecurrentState, TokenSequence};

use crate::error::Result;

/// Names and dimensions fixed by the exported model's signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSignature {
    /// Token input, i64 `[1, L]`
    pub input_name: String,
    /// Recurrent state input, f32 `[layers, 1, hidden]`
    pub hidden_input_name: String,
    /// Logits output, f32 `[1, L, vocab]`
    pub logits_output_name: String,
    /// Updated recurrent state output
    pub hidden_output_name: String,
    pub num_layers: usize,
    pub hidden_size: usize,
}

impl Default for ModelSignature {
    fn default() -> Self {
        Self {
            input_name: "input".to_string(),
            hidden_input_name: "hidden.1".to_string(),
            logits_output_name: "output".to_string(),
            hidden_output_name: "hidden".to_string(),
            num_layers: 2,
            hidden_size: 512,
        }
    }
}

impl ModelSignature {
    /// Zeroed recurrent state matching this signature
    pub fn initial_state(&self) -> RecurrentState {
        RecurrentState::zeros(self.num_layers, self.hidden_size)
    }
}

/// An inference engine for a character-level recurrent model.
///
/// Implementations receive the inputs in one call and return every output the
/// model produces, keyed by name. Output validation happens in [`InferenceStep`].
pub trait RecurrentModel: Send + Sync {
    fn run(&self, input: &TokenSequence, hidden: &RecurrentState) -> Result<ModelOutputs>;
}
