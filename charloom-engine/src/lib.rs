//! charloom-engine: character-level text generation over a recurrent model
//!
//! The model is treated as an opaque inference engine (see [`model::RecurrentModel`]).
//! This crate supplies everything around it: the vocabulary codec, temperature
//! sampling, the per-step inference logic, and cancellable generation sessions.

pub mod backend;
pub mod config;
pub mod error;
pub mod model;
pub mod sampler;
pub mod session;
pub mod vocab;

pub use backend::{load_generator, load_model};
pub use config::Settings;
pub use error::{GenerationError, RequestError};
pub use model::{
    FloatTensor, InferenceStep, ModelOutputs, ModelSignature, RecurrentModel, RecurrentState,
    TokenSequence,
};
pub use sampler::{Sampler, SamplingConfig, Temperature};
pub use session::{
    GenerationController, GenerationRequest, Generator, Outcome, OutputSink, RequestId, Session,
    SessionState,
};
pub use vocab::{FALLBACK_CHAR, Vocabulary};
