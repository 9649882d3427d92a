//! Generation sessions
//!
//! A [`Generator`] owns the model, vocabulary and current-request cell.
//! [`Generator::start`] turns a validated request into a running [`Session`];
//! starting another request supersedes it. The loop checks its token before
//! every step and again before touching the output, so a superseded session
//! never calls the model or publishes text afterwards.

mod controller;
mod request;

pub use controller::{GenerationController, GenerationToken, RequestId};
pub use request::GenerationRequest;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::error::GenerationError;
use crate::model::{InferenceStep, ModelSignature, RecurrentModel, TokenSequence};
use crate::sampler::Sampler;
use crate::vocab::Vocabulary;

/// Lifecycle of a generation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Running,
    Completed,
    Superseded,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Superseded | Self::Failed)
    }
}

/// How a session ended. Every variant keeps the text produced so far.
#[derive(Debug)]
pub enum Outcome {
    Completed { text: String },
    Superseded { text: String },
    Failed { text: String, error: GenerationError },
}

impl Outcome {
    pub fn state(&self) -> SessionState {
        match self {
            Self::Completed { .. } => SessionState::Completed,
            Self::Superseded { .. } => SessionState::Superseded,
            Self::Failed { .. } => SessionState::Failed,
        }
    }

    /// Prompt plus every character generated before the session ended
    pub fn text(&self) -> &str {
        match self {
            Self::Completed { text } | Self::Superseded { text } | Self::Failed { text, .. } => {
                text
            }
        }
    }

    pub fn error(&self) -> Option<&GenerationError> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Display surface receiving the accumulated text after each character.
pub trait OutputSink {
    fn publish(&mut self, text: &str);
}

impl<F: FnMut(&str)> OutputSink for F {
    fn publish(&mut self, text: &str) {
        self(text)
    }
}

/// Entry point for starting generation requests against one model
#[derive(Clone)]
pub struct Generator {
    model: Arc<dyn RecurrentModel>,
    vocab: Arc<Vocabulary>,
    signature: ModelSignature,
    controller: GenerationController,
    yield_delay: Duration,
}

impl Generator {
    pub fn new(
        model: Arc<dyn RecurrentModel>,
        vocab: Arc<Vocabulary>,
        signature: ModelSignature,
    ) -> Self {
        Self {
            model,
            vocab,
            signature,
            controller: GenerationController::new(),
            yield_delay: Duration::ZERO,
        }
    }

    /// Pause between steps. Zero only yields to the scheduler.
    pub fn with_yield_delay(mut self, delay: Duration) -> Self {
        self.yield_delay = delay;
        self
    }

    pub fn controller(&self) -> &GenerationController {
        &self.controller
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn signature(&self) -> &ModelSignature {
        &self.signature
    }

    /// Make `request` the current one and return its session.
    ///
    /// Any session started earlier stops at its next check.
    pub fn start(&self, request: GenerationRequest) -> Session {
        let token = self.controller.begin();
        tracing::info!(
            "Starting generation #{}: {} prompt chars, {} to generate, temperature {}",
            token.id(),
            request.prompt().chars().count(),
            request.num_chars(),
            request.sampling().temperature.get()
        );
        Session {
            token,
            model: Arc::clone(&self.model),
            vocab: Arc::clone(&self.vocab),
            signature: self.signature.clone(),
            request,
            yield_delay: self.yield_delay,
        }
    }

    /// Start `request` and drive it to the end.
    pub async fn generate<S: OutputSink + ?Sized>(
        &self,
        request: GenerationRequest,
        sink: &mut S,
    ) -> Outcome {
        self.start(request).run(sink).await
    }
}

/// A started request. Consumed by [`Session::run`].
pub struct Session {
    token: GenerationToken,
    model: Arc<dyn RecurrentModel>,
    vocab: Arc<Vocabulary>,
    signature: ModelSignature,
    request: GenerationRequest,
    yield_delay: Duration,
}

impl Session {
    pub fn id(&self) -> RequestId {
        self.token.id()
    }

    pub fn is_current(&self) -> bool {
        self.token.is_current()
    }

    pub fn request(&self) -> &GenerationRequest {
        &self.request
    }

    /// Run the generation loop until completion, supersession or failure.
    pub async fn run<S: OutputSink + ?Sized>(self, sink: &mut S) -> Outcome {
        let id = self.token.id();
        let step = InferenceStep::new(self.model.as_ref(), &self.signature, &self.vocab);
        let mut sampler = Sampler::new(self.request.sampling());

        let mut text = self.request.prompt().to_string();
        let mut input = TokenSequence::from_indices(&self.vocab.encode(&text));
        let mut hidden = self.signature.initial_state();

        for produced in 0..self.request.num_chars() {
            if !self.token.is_current() {
                tracing::debug!("Generation #{} superseded after {} chars", id, produced);
                return Outcome::Superseded { text };
            }

            let out = match step.run(&input, &hidden, &mut sampler) {
                Ok(out) => out,
                Err(error) => {
                    tracing::error!("Generation #{} failed at char {}: {}", id, produced, error);
                    return Outcome::Failed { text, error };
                }
            };

            // A newer request may have started while the model was running.
            if !self.token.is_current() {
                tracing::debug!("Generation #{} superseded after {} chars", id, produced);
                return Outcome::Superseded { text };
            }

            text.push(out.ch);
            hidden = out.hidden;
            input = TokenSequence::from_indices(&self.vocab.encode(&out.ch.to_string()));
            sink.publish(&text);
            tracing::trace!("Generation #{} produced {:?}", id, out.ch);

            if self.yield_delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(self.yield_delay).await;
            }
        }

        tracing::info!(
            "Generation #{} completed ({} chars)",
            id,
            self.request.num_chars()
        );
        Outcome::Completed { text }
    }
}
