//! Validated generation requests

use crate::error::RequestError;
use crate::sampler::{SamplingConfig, Temperature};

/// A request that passed validation: non-empty prompt, positive count.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    prompt: String,
    num_chars: usize,
    sampling: SamplingConfig,
}

impl GenerationRequest {
    /// Validate a request. The prompt is checked before the count.
    pub fn new(
        prompt: impl Into<String>,
        num_chars: i64,
        sampling: SamplingConfig,
    ) -> Result<Self, RequestError> {
        let prompt = prompt.into();
        if prompt.is_empty() {
            return Err(RequestError::EmptyPrompt);
        }
        let num_chars = usize::try_from(num_chars)
            .ok()
            .filter(|&n| n > 0)
            .ok_or(RequestError::InvalidCharCount)?;

        Ok(Self {
            prompt,
            num_chars,
            sampling,
        })
    }

    /// Build a request from raw text fields as typed by a user.
    ///
    /// A non-numeric count counts as zero and is rejected. A blank or
    /// unusable temperature falls back to 1.0.
    pub fn from_fields(
        prompt: &str,
        num_chars: &str,
        temperature: &str,
    ) -> Result<Self, RequestError> {
        let count = num_chars.trim().parse::<i64>().unwrap_or(0);
        Self::new(
            prompt,
            count,
            SamplingConfig {
                temperature: Temperature::parse(temperature),
                seed: None,
            },
        )
    }

    /// Fix the sampler seed for reproducible output.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.sampling.seed = seed;
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn num_chars(&self) -> usize {
        self.num_chars
    }

    pub fn sampling(&self) -> &SamplingConfig {
        &self.sampling
    }
}
