//! Configuration for the conversation subsystem.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::conversation::core::errors::{ConversationError, ConversationResult};

/// Instruction sent as the first turn of every prompt unless overridden.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a helpful AI assistant in a Telegram chat. \
Respond naturally and helpfully to user messages. \
Keep responses concise but informative.";

/// Top-level configuration for conversation handling.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Stored history bounds.
    pub history: HistoryConfig,
    /// Prompt assembly settings.
    pub prompt: PromptConfig,
    /// Generation call parameters.
    pub generation: GenerationConfig,
}

impl ConversationConfig {
    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> ConversationResult<()> {
        if self.history.max_history == 0 {
            return Err(ConversationError::InvalidConfig(
                "history.max_history must be > 0".to_string(),
            ));
        }

        if self.history.timeout_seconds == 0 {
            return Err(ConversationError::InvalidConfig(
                "history.timeout_seconds must be > 0".to_string(),
            ));
        }

        if self.prompt.context_turns == 0 {
            return Err(ConversationError::InvalidConfig(
                "prompt.context_turns must be > 0".to_string(),
            ));
        }

        if self.prompt.system_instruction.trim().is_empty() {
            return Err(ConversationError::InvalidConfig(
                "prompt.system_instruction must not be empty".to_string(),
            ));
        }

        if self.generation.max_tokens == 0 {
            return Err(ConversationError::InvalidConfig(
                "generation.max_tokens must be > 0".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(ConversationError::InvalidConfig(format!(
                "generation.temperature must be within [0, 2], got {}",
                self.generation.temperature
            )));
        }

        if self.generation.timeout_seconds == 0 {
            return Err(ConversationError::InvalidConfig(
                "generation.timeout_seconds must be > 0".to_string(),
            ));
        }

        // A turn must not outlive its own conversation.
        if self.history.timeout_seconds <= self.generation.timeout_seconds {
            return Err(ConversationError::InvalidConfig(format!(
                "history.timeout_seconds ({}) must exceed generation.timeout_seconds ({})",
                self.history.timeout_seconds, self.generation.timeout_seconds
            )));
        }

        Ok(())
    }
}

/// Bounds on what is remembered per user.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum entries retained per user.
    pub max_history: usize,
    /// Idle seconds before a conversation is discarded.
    pub timeout_seconds: u64,
}

impl HistoryConfig {
    /// Idle timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_history: 50,
            timeout_seconds: 3600,
        }
    }
}

/// Prompt assembly settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Maximum history entries sent per generation call.
    pub context_turns: usize,
    /// Fixed instruction placed in the system turn.
    pub system_instruction: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            context_turns: 10,
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
        }
    }
}

/// Pass-through generation parameters and the call deadline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Maximum output length in tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Seconds before a generation call is abandoned.
    pub timeout_seconds: u64,
}

impl GenerationConfig {
    /// Call deadline as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1000,
            temperature: 0.7,
            timeout_seconds: 60,
        }
    }
}
