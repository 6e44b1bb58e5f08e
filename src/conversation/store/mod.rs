//! Per-user conversation storage.

pub mod conversation_store;
pub mod export;

pub use conversation_store::{ConversationStats, ConversationStore};
pub use export::ConversationExport;
