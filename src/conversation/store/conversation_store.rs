//! In-memory, per-user conversation store.
//!
//! States live in a sharded [`DashMap`], so operations on different users
//! never contend on a single lock, while every read-modify-write on one
//! user runs under that key's shard guard. Expiry is evaluated lazily on
//! access; [`ConversationStore::sweep_expired`] only bounds memory held for
//! users who never come back.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info};

use crate::conversation::core::config::HistoryConfig;
use crate::conversation::core::entry::{ConversationEntry, ConversationState, Role};
use crate::conversation::core::errors::{ConversationError, ConversationResult};
use crate::conversation::core::ids::UserId;

/// Aggregate figures about the stored conversations.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ConversationStats {
    /// Users with a stored conversation.
    pub active_users: usize,
    /// Entries across all users.
    pub total_messages: usize,
    /// `total_messages / active_users`, zero when empty.
    pub average_messages_per_user: f64,
}

/// Process-wide owner of every user's conversation state.
pub struct ConversationStore {
    config: HistoryConfig,
    states: DashMap<UserId, ConversationState>,
}

impl ConversationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            config,
            states: DashMap::new(),
        }
    }

    /// Return the user's live state, replacing an expired one with a fresh
    /// empty state. Marks the user as active.
    #[must_use]
    pub fn get_or_create(&self, user_id: UserId) -> ConversationState {
        self.get_or_create_at(user_id, Utc::now())
    }

    /// Append a turn to the user's history.
    ///
    /// # Errors
    /// Returns [`ConversationError::InvalidRole`] unless `role` is user or
    /// assistant; nothing is stored in that case.
    pub fn append(
        &self,
        user_id: UserId,
        role: Role,
        text: impl Into<String>,
    ) -> ConversationResult<()> {
        self.append_at(user_id, role, text, Utc::now())
    }

    /// Forget everything about the user. Clearing an absent user is a no-op.
    pub fn clear(&self, user_id: UserId) {
        match self.states.remove(&user_id) {
            Some((_, state)) => info!(%user_id, entries = state.len(), "Cleared conversation"),
            None => debug!(%user_id, "Clear requested for user without conversation"),
        }
    }

    /// Copy of the user's history, oldest first. Does not mark the user as
    /// active; an expired conversation reads as empty.
    #[must_use]
    pub fn snapshot(&self, user_id: UserId) -> Vec<ConversationEntry> {
        self.snapshot_at(user_id, Utc::now())
    }

    /// Remove every conversation idle past the timeout.
    ///
    /// Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now())
    }

    /// Number of stored conversations, expired ones included until swept.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether no conversation is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Aggregate counts over stored conversations.
    #[must_use]
    pub fn stats(&self) -> ConversationStats {
        let mut stats = ConversationStats::default();
        for state in self.states.iter() {
            stats.active_users += 1;
            stats.total_messages += state.len();
        }
        if stats.active_users > 0 {
            #[allow(clippy::cast_precision_loss)]
            {
                stats.average_messages_per_user =
                    stats.total_messages as f64 / stats.active_users as f64;
            }
        }
        stats
    }

    pub(crate) fn get_or_create_at(&self, user_id: UserId, now: DateTime<Utc>) -> ConversationState {
        let mut state = self.live_state(user_id, now);
        state.touch(now);
        state.value().clone()
    }

    pub(crate) fn append_at(
        &self,
        user_id: UserId,
        role: Role,
        text: impl Into<String>,
        now: DateTime<Utc>,
    ) -> ConversationResult<()> {
        if !role.is_history_role() {
            return Err(ConversationError::InvalidRole(role.as_str().to_string()));
        }

        let mut state = self.live_state(user_id, now);
        let evicted = state.push(role, text, now, self.config.max_history)?;
        if evicted > 0 {
            debug!(%user_id, evicted, "Evicted oldest history entries");
        }
        debug!(%user_id, %role, entries = state.len(), "Appended history entry");
        Ok(())
    }

    pub(crate) fn snapshot_at(&self, user_id: UserId, now: DateTime<Utc>) -> Vec<ConversationEntry> {
        self.states
            .get(&user_id)
            .filter(|state| !state.is_expired(now, self.config.timeout()))
            .map(|state| state.entries())
            .unwrap_or_default()
    }

    pub(crate) fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let timeout = self.config.timeout();
        let mut removed = 0;
        self.states.retain(|user_id, state| {
            let keep = !state.is_expired(now, timeout);
            if !keep {
                removed += 1;
                debug!(%user_id, "Swept expired conversation");
            }
            keep
        });
        removed
    }

    #[cfg(test)]
    pub(crate) fn set_last_active(&self, user_id: UserId, at: DateTime<Utc>) {
        if let Some(mut state) = self.states.get_mut(&user_id) {
            state.last_active = at;
        }
    }

    /// Entry guard for the user's non-expired state, created on demand.
    fn live_state(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> dashmap::mapref::one::RefMut<'_, UserId, ConversationState> {
        let mut state = self
            .states
            .entry(user_id)
            .or_insert_with(|| ConversationState::new(user_id, now));
        if state.is_expired(now, self.config.timeout()) {
            info!(%user_id, entries = state.len(), "Discarding expired conversation");
            *state = ConversationState::new(user_id, now);
        }
        state
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}
