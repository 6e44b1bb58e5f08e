//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::conversation::store::ConversationStore;
use crate::relay::Relay;

/// Shared application state.
pub struct AppState {
    /// Relay answering chat requests.
    pub relay: Arc<Relay>,
}

impl AppState {
    /// Wrap a relay for the router.
    #[must_use]
    pub fn new(relay: Arc<Relay>) -> Arc<Self> {
        Arc::new(Self { relay })
    }

    /// Conversation store behind the relay.
    #[must_use]
    pub fn store(&self) -> &ConversationStore {
        self.relay.store()
    }
}
