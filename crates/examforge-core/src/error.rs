//! Error types for the exam engine and the services it talks to.
//!
//! `ProviderError` is defined here rather than in `examforge-providers` so the
//! engine can classify failures (retry or not, timeout or not) without string
//! matching.

use thiserror::Error;

/// Errors that can occur when calling an external service.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key or app id).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The response body could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl ProviderError {
    /// Returns `true` if this error is permanent and should not be retried.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ProviderError::AuthenticationFailed(_) | ProviderError::ModelNotFound(_)
        )
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }

    /// Returns `true` if the call ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProviderError::Timeout(_))
    }
}

/// The uploaded document could not be used as exam source material.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractionError {
    #[error("no readable text could be extracted from '{name}'")]
    Empty { name: String },

    #[error("could not read '{name}': {reason}")]
    Unreadable { name: String, reason: String },
}

/// Failures that abort exam generation. Surfaced to the learner.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("a topic or a document is required to generate an exam")]
    MissingSource,

    #[error("at least one math topic must be selected")]
    NoMathTopics,

    #[error("the question count must be at least 1")]
    InvalidCount,

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("no valid questions could be generated; check the source text or format and try again")]
    NoValidQuestions,

    #[error("generation took too long; try a smaller document or fewer questions")]
    TimedOut,

    #[error("question generation failed: {0}")]
    Service(ProviderError),
}

impl From<ProviderError> for GenerationError {
    fn from(err: ProviderError) -> Self {
        if err.is_timeout() {
            GenerationError::TimedOut
        } else {
            GenerationError::Service(err)
        }
    }
}

/// An operation was rejected because of the attempt's current state.
/// The attempt is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("question index {index} is out of range (exam has {len} questions)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("question {index} was already answered")]
    AlreadyAnswered { index: usize },

    #[error("question {index} cannot be answered yet; next question is {expected}")]
    OutOfOrder { index: usize, expected: usize },

    #[error("the exam is already completed")]
    Completed,

    #[error("the exam is incomplete: {answered} of {total} questions answered")]
    Incomplete { answered: usize, total: usize },

    #[error("no exam in progress")]
    NoAttempt,
}

/// Umbrella error for callers driving the whole exam lifecycle.
#[derive(Debug, Error)]
pub enum ExamError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    State(#[from] StateError),
}
