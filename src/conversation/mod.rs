//! Conversation-context management for the relay.
//!
//! - `core`: configuration, errors, identifiers, entries and per-user state
//! - `store`: the per-user history store and its export
//! - `prompt`: bounded prompt assembly and transcript rendering
//! - `maintenance`: background sweep of idle conversations

pub mod core;
pub mod maintenance;
pub mod prompt;
pub mod store;

pub use core::{
    ConversationConfig, ConversationEntry, ConversationError, ConversationResult,
    ConversationState, GenerationConfig, HistoryConfig, PromptConfig, Role, UserId,
};
pub use maintenance::{ExpirySweeper, SweepConfig, SweepStats};
pub use prompt::{PromptAssembler, Turn, build_prompt, render_dialogue_only};
pub use store::{ConversationExport, ConversationStats, ConversationStore};
