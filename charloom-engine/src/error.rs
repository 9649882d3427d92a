//! Error types for vocabulary loading, model invocation and generation

/// A generation request that was rejected before it started.
///
/// The `Display` text is the message shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("Please enter a prompt.")]
    EmptyPrompt,

    #[error("Enter a valid number.")]
    InvalidCharCount,
}

/// Errors that can occur while loading resources or running a generation.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error(transparent)]
    InvalidRequest(#[from] RequestError),

    #[error("vocabulary load failed: {0}")]
    VocabularyLoad(String),

    #[error("model load failed")]
    ModelLoad(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("model invocation failed")]
    ModelInvocation(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("model output '{0}' is missing")]
    MissingOutput(String),

    #[error("model output '{name}' is malformed: {reason}")]
    MalformedOutput { name: String, reason: String },
}

impl GenerationError {
    pub(crate) fn malformed(name: &str, reason: impl Into<String>) -> Self {
        Self::MalformedOutput {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GenerationError>;
