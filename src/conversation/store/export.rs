//! Read-only conversation export for debugging.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::conversation::core::entry::ConversationEntry;
use crate::conversation::core::errors::ConversationResult;
use crate::conversation::core::ids::UserId;
use crate::conversation::store::conversation_store::ConversationStore;

/// Serializable dump of one user's history.
#[derive(Clone, Debug, Serialize)]
pub struct ConversationExport {
    /// Owner of the history.
    pub user_id: UserId,
    /// When the dump was taken.
    pub exported_at: DateTime<Utc>,
    /// `{role, text, timestamp}` records, oldest first.
    pub entries: Vec<ConversationEntry>,
}

impl ConversationStore {
    /// Snapshot the user's history into an export record.
    #[must_use]
    pub fn export(&self, user_id: UserId) -> ConversationExport {
        ConversationExport {
            user_id,
            exported_at: Utc::now(),
            entries: self.snapshot(user_id),
        }
    }

    /// Snapshot the user's history as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn export_json(&self, user_id: UserId) -> ConversationResult<String> {
        Ok(serde_json::to_string_pretty(&self.export(user_id))?)
    }
}
