//! Core conversation types and identifiers.

pub mod config;
pub mod entry;
pub mod errors;
pub mod ids;

pub use config::{
    ConversationConfig, DEFAULT_SYSTEM_INSTRUCTION, GenerationConfig, HistoryConfig, PromptConfig,
};
pub use entry::{ConversationEntry, ConversationState, Role};
pub use errors::{ConversationError, ConversationResult};
pub use ids::UserId;
