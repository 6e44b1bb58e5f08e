//! Error types for the Telegram transport.

use thiserror::Error;

/// Failure talking to the Bot API.
#[derive(Debug, Error)]
pub enum TelegramError {
    /// HTTP transport or decoding failure. The request URL is stripped since
    /// it carries the bot token.
    #[error("http request failed: {0}")]
    Http(reqwest::Error),
    /// The Bot API answered `ok: false`.
    #[error("bot api error {code}: {description}")]
    Api {
        /// Telegram error code, 0 when absent.
        code: i64,
        /// Human-readable description.
        description: String,
    },
    /// Invalid API root URL.
    #[error("invalid api url: {0}")]
    Url(#[from] url::ParseError),
    /// Transport misconfiguration.
    #[error("invalid telegram configuration: {0}")]
    InvalidConfig(String),
}

impl From<reqwest::Error> for TelegramError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.without_url())
    }
}

/// Convenience result alias for Bot API calls.
pub type TelegramResult<T> = Result<T, TelegramError>;
