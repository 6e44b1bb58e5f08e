//! Bounded prompt assembly from stored history.

use serde::{Deserialize, Serialize};

use crate::conversation::core::config::PromptConfig;
use crate::conversation::core::entry::{ConversationEntry, Role};

/// One role-tagged unit sent to the generation API.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Speaker of the turn.
    pub role: Role,
    /// Turn content.
    pub text: String,
}

impl Turn {
    /// Build a system turn.
    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            text: text.into(),
        }
    }

    /// Build a user turn.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    /// Build an assistant turn.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

impl From<&ConversationEntry> for Turn {
    fn from(entry: &ConversationEntry) -> Self {
        Self {
            role: entry.role,
            text: entry.text.clone(),
        }
    }
}

/// Assemble the turns for one generation call.
///
/// The result is the system instruction, then the last `max_turns` history
/// entries in stored order, then `new_user_text` as a user turn. History is
/// only read.
#[must_use]
pub fn build_prompt(
    system_instruction: &str,
    history: &[ConversationEntry],
    new_user_text: &str,
    max_turns: usize,
) -> Vec<Turn> {
    let window = &history[history.len().saturating_sub(max_turns)..];

    let mut turns = Vec::with_capacity(window.len() + 2);
    turns.push(Turn::system(system_instruction));
    turns.extend(window.iter().map(Turn::from));
    turns.push(Turn::user(new_user_text));
    turns
}

/// Prompt builder bound to a fixed instruction and context window.
#[derive(Clone, Debug)]
pub struct PromptAssembler {
    system_instruction: String,
    max_turns: usize,
}

impl PromptAssembler {
    /// Create an assembler with an explicit instruction and window.
    #[must_use]
    pub fn new(system_instruction: impl Into<String>, max_turns: usize) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            max_turns,
        }
    }

    /// Create an assembler from prompt settings.
    #[must_use]
    pub fn from_config(config: &PromptConfig) -> Self {
        Self::new(config.system_instruction.clone(), config.context_turns)
    }

    /// See [`build_prompt`].
    #[must_use]
    pub fn build(&self, history: &[ConversationEntry], new_user_text: &str) -> Vec<Turn> {
        build_prompt(
            &self.system_instruction,
            history,
            new_user_text,
            self.max_turns,
        )
    }
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self::from_config(&PromptConfig::default())
    }
}
