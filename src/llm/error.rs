//! Error types for generation backends.

use std::time::Duration;

use thiserror::Error;

/// Failure of a generation call. Always recovered by the relay.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The call exceeded its deadline.
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
    /// HTTP transport failure.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The API answered with a non-success status.
    #[error("api returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },
    /// The API refused to answer (content safety).
    #[error("response blocked: {0}")]
    Blocked(String),
    /// The model produced no text.
    #[error("model returned an empty response")]
    EmptyResponse,
    /// Completion error from Rig.
    #[error("completion error: {0}")]
    Completion(#[from] rig::completion::CompletionError),
    /// HTTP client error from Rig.
    #[error("http client error: {0}")]
    HttpClient(#[from] rig::http_client::Error),
    /// Backend misconfiguration.
    #[error("invalid backend configuration: {0}")]
    InvalidConfig(String),
}

impl GenerationError {
    /// Check if resending the same request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Http(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Convenience result alias for generation calls.
pub type GenerationResult<T> = Result<T, GenerationError>;
