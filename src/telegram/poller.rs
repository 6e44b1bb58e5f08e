//! Long-polling loop feeding updates into the relay.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::conversation::core::ids::UserId;
use crate::relay::{Command, INTERNAL_ERROR_TEXT, Relay};
use crate::telegram::api::{TelegramApi, Update};

/// Telegram's per-message character limit.
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 4096;

/// Polling behaviour.
#[derive(Clone, Debug)]
pub struct PollerConfig {
    /// Long-poll timeout passed to `getUpdates`.
    pub poll_timeout: Duration,
    /// Pause after a failed poll.
    pub retry_delay: Duration,
    /// Outbound messages longer than this are split.
    pub max_message_length: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(30),
            retry_delay: Duration::from_secs(5),
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
        }
    }
}

/// Receives updates and answers each message through the relay.
pub struct TelegramPoller {
    api: TelegramApi,
    relay: Arc<Relay>,
    config: PollerConfig,
    shutdown: Arc<Notify>,
}

impl TelegramPoller {
    /// Create a poller.
    #[must_use]
    pub fn new(api: TelegramApi, relay: Arc<Relay>, config: PollerConfig) -> Self {
        Self {
            api,
            relay,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Handle used to stop [`TelegramPoller::run`].
    #[must_use]
    pub fn shutdown_notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Poll until shutdown is signalled, then wait for in-flight replies.
    ///
    /// Each update is handled on its own task so one slow generation never
    /// holds up other users.
    pub async fn run(self) {
        let mut offset = 0_i64;
        let mut in_flight = JoinSet::new();
        info!("Telegram poller started");

        loop {
            let polled = tokio::select! {
                () = self.shutdown.notified() => break,
                polled = self.api.get_updates(offset, self.config.poll_timeout) => polled,
            };

            let updates = match polled {
                Ok(updates) => updates,
                Err(e) => {
                    warn!(error = %e, "Telegram poll failed");
                    tokio::select! {
                        () = self.shutdown.notified() => break,
                        () = tokio::time::sleep(self.config.retry_delay) => continue,
                    }
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some(incoming) = Incoming::from_update(update) else {
                    continue;
                };
                let api = self.api.clone();
                let relay = Arc::clone(&self.relay);
                let max_len = self.config.max_message_length;
                in_flight.spawn(async move { handle(&api, &relay, incoming, max_len).await });
            }

            while in_flight.try_join_next().is_some() {}
        }

        info!(pending = in_flight.len(), "Telegram poller stopping");
        while in_flight.join_next().await.is_some() {}
    }
}

/// Text message extracted from an update.
#[derive(Debug, PartialEq, Eq)]
struct Incoming {
    user_id: UserId,
    chat_id: i64,
    text: String,
}

impl Incoming {
    fn from_update(update: Update) -> Option<Self> {
        let message = update.message?;
        let from = message.from?;
        if from.is_bot {
            return None;
        }
        Some(Self {
            user_id: UserId::new(from.id),
            chat_id: message.chat.id,
            text: message.text?,
        })
    }
}

async fn handle(api: &TelegramApi, relay: &Relay, incoming: Incoming, max_len: usize) {
    let Incoming {
        user_id,
        chat_id,
        text,
    } = incoming;

    if Command::parse(&text).is_none() {
        if let Err(e) = api.send_typing(chat_id).await {
            debug!(%user_id, error = %e, "Typing indicator failed");
        }
    }

    let reply = match relay.dispatch(user_id, &text).await {
        Ok(Some(reply)) => reply,
        Ok(None) => return,
        Err(e) => {
            warn!(%user_id, error = %e, "Message handling failed");
            INTERNAL_ERROR_TEXT.to_string()
        }
    };

    for chunk in split_message(&reply, max_len) {
        if let Err(e) = api.send_message(chat_id, &chunk).await {
            warn!(%user_id, error = %e, "Failed to send reply");
            return;
        }
    }
}

/// Split `message` into chunks of at most `max_len` characters.
///
/// Prefers paragraph, line, sentence and word boundaries, in that order.
#[must_use]
pub fn split_message(message: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let mut chunks = Vec::new();
    let mut remaining = message;

    loop {
        let Some((limit, _)) = remaining.char_indices().nth(max_len) else {
            if !remaining.is_empty() || chunks.is_empty() {
                chunks.push(remaining.to_string());
            }
            return chunks;
        };

        let window = &remaining[..limit];
        let split_at = window
            .rfind("\n\n")
            .or_else(|| window.rfind('\n'))
            .or_else(|| window.rfind(". ").map(|i| i + 1))
            .or_else(|| window.rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(limit);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(json: &str) -> Update {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_split_short_message() {
        assert_eq!(split_message("Hello, World!", 4096), ["Hello, World!"]);
        assert_eq!(split_message("", 4096), [""]);
    }

    #[test]
    fn test_split_long_message() {
        let msg = "x".repeat(5000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4096);
        assert_eq!(chunks[1].len(), 904);
    }

    #[test]
    fn test_split_prefers_boundaries() {
        let chunks = split_message("first line\nsecond line", 15);
        assert_eq!(chunks, ["first line", "second line"]);

        let chunks = split_message("One two. Three four", 12);
        assert_eq!(chunks, ["One two.", "Three four"]);
    }

    #[test]
    fn test_split_counts_chars_not_bytes() {
        let msg = "é".repeat(10);
        let chunks = split_message(&msg, 4);
        assert_eq!(chunks, ["éééé", "éééé", "éé"]);
    }

    #[test]
    fn test_incoming_from_text_message() {
        let incoming = Incoming::from_update(update(
            r#"{"update_id": 1, "message": {"message_id": 5, "from": {"id": 7}, "chat": {"id": -100}, "text": "hi"}}"#,
        ));
        assert_eq!(
            incoming,
            Some(Incoming {
                user_id: UserId::new(7),
                chat_id: -100,
                text: "hi".to_string(),
            })
        );
    }

    #[test]
    fn test_incoming_skips_non_text_and_bots() {
        assert!(Incoming::from_update(update(r#"{"update_id": 1}"#)).is_none());
        assert!(
            Incoming::from_update(update(
                r#"{"update_id": 2, "message": {"message_id": 5, "from": {"id": 7}, "chat": {"id": 7}}}"#,
            ))
            .is_none()
        );
        assert!(
            Incoming::from_update(update(
                r#"{"update_id": 3, "message": {"message_id": 5, "from": {"id": 8, "is_bot": true}, "chat": {"id": 8}, "text": "x"}}"#,
            ))
            .is_none()
        );
    }
}
