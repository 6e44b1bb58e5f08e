//! Error types for the conversation subsystem.

use thiserror::Error;

/// Conversation subsystem error type.
#[derive(Debug, Error)]
pub enum ConversationError {
    /// A history entry was given a role other than user or assistant.
    #[error("invalid role for a history entry: {0}")]
    InvalidRole(String),
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience result alias for conversation operations.
pub type ConversationResult<T> = Result<T, ConversationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_errors_convert() {
        fn parse(raw: &str) -> ConversationResult<serde_json::Value> {
            Ok(serde_json::from_str(raw)?)
        }
        let err = parse("{").unwrap_err();
        assert!(matches!(err, ConversationError::Serialization(_)));
        assert!(err.to_string().starts_with("serialization error"));
    }
}
