//! Conversation entries and per-user state.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conversation::core::errors::{ConversationError, ConversationResult};
use crate::conversation::core::ids::UserId;

/// Role of a turn exchanged with the generation API.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Fixed instruction prefix; never stored in history.
    System,
    /// Message written by the chat user.
    User,
    /// Reply produced by the language model.
    Assistant,
}

impl Role {
    /// Stable string form for logs and exports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Whether entries with this role may be kept in a user's history.
    #[must_use]
    pub const fn is_history_role(self) -> bool {
        matches!(self, Self::User | Self::Assistant)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = ConversationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(ConversationError::InvalidRole(value.to_string())),
        }
    }
}

/// One turn of a stored dialogue.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    /// Who produced the text.
    pub role: Role,
    /// Message content.
    pub text: String,
    /// Wall-clock creation time.
    pub timestamp: DateTime<Utc>,
}

impl ConversationEntry {
    /// Build an entry, rejecting roles that never belong in history.
    ///
    /// # Errors
    /// Returns [`ConversationError::InvalidRole`] for [`Role::System`].
    pub fn new(
        role: Role,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> ConversationResult<Self> {
        if !role.is_history_role() {
            return Err(ConversationError::InvalidRole(role.as_str().to_string()));
        }
        Ok(Self {
            role,
            text: text.into(),
            timestamp,
        })
    }
}

/// History and activity tracking for a single user.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationState {
    /// Owner of this conversation.
    pub user_id: UserId,
    /// Stored turns, oldest first.
    pub history: VecDeque<ConversationEntry>,
    /// Most recent append or read.
    pub last_active: DateTime<Utc>,
}

impl ConversationState {
    /// Create an empty conversation last touched at `now`.
    #[must_use]
    pub const fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            history: VecDeque::new(),
            last_active: now,
        }
    }

    /// Whether the conversation has been idle for longer than `timeout`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        let idle_ms = now.signed_duration_since(self.last_active).num_milliseconds();
        let timeout_ms = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
        idle_ms > timeout_ms
    }

    /// Record activity; `last_active` never moves backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_active {
            self.last_active = now;
        }
    }

    /// Append a turn and evict from the front past `max_history`.
    ///
    /// Returns the number of evicted entries.
    ///
    /// # Errors
    /// Returns [`ConversationError::InvalidRole`] for [`Role::System`].
    pub fn push(
        &mut self,
        role: Role,
        text: impl Into<String>,
        now: DateTime<Utc>,
        max_history: usize,
    ) -> ConversationResult<usize> {
        // Clock steps backwards must not reorder history.
        let timestamp = self
            .history
            .back()
            .map_or(now, |last| last.timestamp.max(now));
        let entry = ConversationEntry::new(role, text, timestamp)?;
        self.history.push_back(entry);

        let mut evicted = 0;
        while self.history.len() > max_history {
            self.history.pop_front();
            evicted += 1;
        }

        self.touch(now);
        Ok(evicted)
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Whether no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Copy the history out in chronological order.
    #[must_use]
    pub fn entries(&self) -> Vec<ConversationEntry> {
        self.history.iter().cloned().collect()
    }
}
