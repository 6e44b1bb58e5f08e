//! Per-message relay between a chat transport and a generator.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::conversation::core::config::ConversationConfig;
use crate::conversation::core::entry::Role;
use crate::conversation::core::errors::ConversationResult;
use crate::conversation::core::ids::UserId;
use crate::conversation::prompt::PromptAssembler;
use crate::conversation::store::ConversationStore;
use crate::llm::{GenerationError, GenerationParams, Generator};
use crate::relay::commands::{
    CLEARED_TEXT, Command, EMPTY_REPLY_TEXT, GENERATION_FAILED_TEXT, HELP_TEXT, START_TEXT,
};

/// Outcome of relaying one message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    /// Text produced by the model and stored as an assistant turn.
    Generated(String),
    /// Fallback text; nothing was stored for the assistant.
    Fallback(String),
}

impl Reply {
    /// Text to send back to the user.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Generated(text) | Self::Fallback(text) => text,
        }
    }

    /// Consume into the text to send back.
    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::Generated(text) | Self::Fallback(text) => text,
        }
    }

    /// Whether generation failed.
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

/// Generation settings reported for diagnostics.
#[derive(Clone, Debug, Serialize)]
pub struct ModelInfo {
    /// Backend model identifier.
    pub model_name: String,
    /// Maximum output tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Per-call deadline in seconds.
    pub timeout_seconds: u64,
}

/// Conversation-aware relay; one instance is shared by all handlers.
pub struct Relay {
    store: Arc<ConversationStore>,
    assembler: PromptAssembler,
    generator: Arc<dyn Generator>,
    params: GenerationParams,
    generation_timeout: Duration,
    turn_locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl Relay {
    /// Create a relay over an existing store and generator.
    #[must_use]
    pub fn new(
        store: Arc<ConversationStore>,
        generator: Arc<dyn Generator>,
        config: &ConversationConfig,
    ) -> Self {
        Self {
            store,
            assembler: PromptAssembler::from_config(&config.prompt),
            generator,
            params: GenerationParams::from(&config.generation),
            generation_timeout: config.generation.timeout(),
            turn_locks: DashMap::new(),
        }
    }

    /// The conversation store behind this relay.
    #[must_use]
    pub const fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Relay a freeform message and return the reply.
    ///
    /// Turns of one user run one at a time in lock order; other users are
    /// never blocked. The user's message is stored before the generation
    /// call and kept whatever the outcome; the reply is stored only on
    /// success.
    ///
    /// # Errors
    /// Returns an error only for store contract violations. Generation
    /// failures become [`Reply::Fallback`].
    pub async fn on_message(&self, user_id: UserId, text: &str) -> ConversationResult<Reply> {
        let _turn = self.lock_turn(user_id).await;
        self.run_turn(user_id, text).await
    }

    /// Forget the user's conversation and return the confirmation text.
    ///
    /// Waits for an in-flight turn of the same user to finish first.
    pub async fn on_command_clear(&self, user_id: UserId) -> &'static str {
        let _turn = self.lock_turn(user_id).await;
        self.store.clear(user_id);
        CLEARED_TEXT
    }

    /// Welcome text; the store is not touched.
    #[must_use]
    pub fn on_command_start(&self, user_id: UserId) -> &'static str {
        debug!(%user_id, "Start command");
        START_TEXT
    }

    /// Usage text; the store is not touched.
    #[must_use]
    pub fn on_command_help(&self, user_id: UserId) -> &'static str {
        debug!(%user_id, "Help command");
        HELP_TEXT
    }

    /// Route inbound text to a command or to [`Relay::on_message`].
    ///
    /// Returns `None` for unknown commands, which are ignored.
    ///
    /// # Errors
    /// Propagates errors from [`Relay::on_message`].
    pub async fn dispatch(&self, user_id: UserId, text: &str) -> ConversationResult<Option<String>> {
        match Command::parse(text) {
            Some(Command::Start) => Ok(Some(self.on_command_start(user_id).to_string())),
            Some(Command::Help) => Ok(Some(self.on_command_help(user_id).to_string())),
            Some(Command::Clear) => Ok(Some(self.on_command_clear(user_id).await.to_string())),
            Some(Command::Unknown(name)) => {
                debug!(%user_id, command = %name, "Ignoring unknown command");
                Ok(None)
            }
            None => Ok(Some(self.on_message(user_id, text).await?.into_text())),
        }
    }

    /// Generation settings in use.
    #[must_use]
    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            model_name: self.generator.model_name().to_string(),
            max_tokens: self.params.max_tokens,
            temperature: self.params.temperature,
            timeout_seconds: self.generation_timeout.as_secs(),
        }
    }

    async fn run_turn(&self, user_id: UserId, text: &str) -> ConversationResult<Reply> {
        let started = Instant::now();
        let history = self.store.get_or_create(user_id).entries();
        let turns = self.assembler.build(&history, text);
        self.store.append(user_id, Role::User, text)?;

        info!(
            %user_id,
            history = history.len(),
            context = turns.len().saturating_sub(2),
            chars = text.len(),
            "Relaying message"
        );
        debug!(%user_id, text, "Inbound message text");

        let outcome =
            tokio::time::timeout(self.generation_timeout, self.generator.generate(&turns, self.params))
                .await
                .unwrap_or_else(|_| Err(GenerationError::Timeout(self.generation_timeout)));

        #[allow(clippy::cast_possible_truncation)]
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(reply) => {
                self.store.append(user_id, Role::Assistant, reply.as_str())?;
                info!(%user_id, elapsed_ms, chars = reply.len(), "Generated reply");
                Ok(Reply::Generated(reply))
            }
            Err(err) => {
                warn!(
                    %user_id,
                    elapsed_ms,
                    retryable = err.is_retryable(),
                    error = %err,
                    "Generation failed; replying with fallback"
                );
                Ok(Reply::Fallback(fallback_text(&err).to_string()))
            }
        }
    }

    /// Wait for the user's turn. The returned guard releases it on drop,
    /// including when the caller's future is cancelled.
    async fn lock_turn(&self, user_id: UserId) -> TurnGuard<'_> {
        let mut turn = TurnGuard {
            locks: &self.turn_locks,
            user_id,
            held: None,
        };
        let lock = Arc::clone(self.turn_locks.entry(user_id).or_default().value());
        turn.held = Some(lock.lock_owned().await);
        turn
    }
}

/// Exclusive turn of one user; drops the map entry once no turn holds or
/// awaits it.
struct TurnGuard<'a> {
    locks: &'a DashMap<UserId, Arc<Mutex<()>>>,
    user_id: UserId,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        drop(self.held.take());
        self.locks
            .remove_if(&self.user_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

const fn fallback_text(err: &GenerationError) -> &'static str {
    match err {
        GenerationError::EmptyResponse => EMPTY_REPLY_TEXT,
        _ => GENERATION_FAILED_TEXT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::core::config::HistoryConfig;
    use crate::conversation::core::entry::ConversationEntry;
    use crate::llm::testing::{Script, ScriptedGenerator};

    fn relay_with(generator: ScriptedGenerator) -> (Relay, Arc<ScriptedGenerator>) {
        relay_with_config(generator, &ConversationConfig::default())
    }

    fn relay_with_config(
        generator: ScriptedGenerator,
        config: &ConversationConfig,
    ) -> (Relay, Arc<ScriptedGenerator>) {
        let generator = Arc::new(generator);
        let store = Arc::new(ConversationStore::new(config.history.clone()));
        let dyn_generator: Arc<dyn Generator> = generator.clone();
        (Relay::new(store, dyn_generator, config), generator)
    }

    fn roles_and_texts(entries: &[ConversationEntry]) -> Vec<(Role, &str)> {
        entries.iter().map(|e| (e.role, e.text.as_str())).collect()
    }

    #[tokio::test]
    async fn test_success_stores_both_turns() {
        let (relay, _) = relay_with(ScriptedGenerator::replying("pong"));
        let user = UserId::new(1);

        let reply = relay.on_message(user, "ping").await.unwrap();

        assert_eq!(reply, Reply::Generated("pong".to_string()));
        let history = relay.store().snapshot(user);
        assert_eq!(
            roles_and_texts(&history),
            [(Role::User, "ping"), (Role::Assistant, "pong")]
        );
    }

    #[tokio::test]
    async fn test_failure_keeps_only_user_turn() {
        let (relay, _) = relay_with(ScriptedGenerator::failing());
        let user = UserId::new(1);

        let reply = relay.on_message(user, "ping").await.unwrap();

        assert!(reply.is_fallback());
        assert_eq!(reply.text(), GENERATION_FAILED_TEXT);
        assert_eq!(
            roles_and_texts(&relay.store().snapshot(user)),
            [(Role::User, "ping")]
        );
    }

    #[tokio::test]
    async fn test_empty_response_has_own_fallback() {
        let (relay, _) = relay_with(ScriptedGenerator::new([Script::Empty]));
        let reply = relay.on_message(UserId::new(1), "hi").await.unwrap();
        assert_eq!(reply, Reply::Fallback(EMPTY_REPLY_TEXT.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_a_generation_failure() {
        let mut config = ConversationConfig::default();
        config.generation.timeout_seconds = 5;
        let (relay, _) = relay_with_config(
            ScriptedGenerator::new([Script::Delay(Duration::from_secs(30), "late".to_string())]),
            &config,
        );
        let user = UserId::new(1);

        let reply = relay.on_message(user, "slow?").await.unwrap();

        assert_eq!(reply, Reply::Fallback(GENERATION_FAILED_TEXT.to_string()));
        assert_eq!(
            roles_and_texts(&relay.store().snapshot(user)),
            [(Role::User, "slow?")]
        );
    }

    #[tokio::test]
    async fn test_retry_sees_previous_attempt_in_context() {
        let (relay, generator) = relay_with(ScriptedGenerator::new([
            Script::Fail,
            Script::Reply("finally".to_string()),
        ]));
        let user = UserId::new(1);

        relay.on_message(user, "ping").await.unwrap();
        relay.on_message(user, "ping").await.unwrap();

        let calls = generator.calls();
        assert_eq!(calls[0].len(), 2);
        assert_eq!(calls[1].len(), 3);
        assert_eq!(calls[1][1].role, Role::User);
        assert_eq!(calls[1][1].text, "ping");
        assert_eq!(relay.store().snapshot(user).len(), 3);
    }

    #[tokio::test]
    async fn test_prompt_respects_context_window() {
        let mut config = ConversationConfig::default();
        config.prompt.context_turns = 4;
        config.prompt.system_instruction = "sys".to_string();
        let (relay, generator) = relay_with_config(ScriptedGenerator::default(), &config);
        let user = UserId::new(3);

        for i in 0..6 {
            relay.on_message(user, &format!("q{i}")).await.unwrap();
        }

        let last = generator.calls().pop().unwrap();
        assert_eq!(last.len(), 6);
        assert_eq!(last[0].role, Role::System);
        assert_eq!(last[0].text, "sys");
        assert_eq!(last[5].text, "q5");
        assert_eq!(relay.store().snapshot(user).len(), 12);
    }

    #[tokio::test]
    async fn test_clear_resets_history() {
        let (relay, _) = relay_with(ScriptedGenerator::default());
        let user = UserId::new(1);
        relay.on_message(user, "hello").await.unwrap();

        assert_eq!(relay.on_command_clear(user).await, CLEARED_TEXT);
        assert!(relay.store().snapshot(user).is_empty());
        assert_eq!(relay.on_command_clear(user).await, CLEARED_TEXT);
    }

    #[tokio::test]
    async fn test_dispatch_routes_commands() {
        let (relay, generator) = relay_with(ScriptedGenerator::replying("answer"));
        let user = UserId::new(1);

        assert_eq!(
            relay.dispatch(user, "/start").await.unwrap().as_deref(),
            Some(START_TEXT)
        );
        assert_eq!(
            relay.dispatch(user, "/help").await.unwrap().as_deref(),
            Some(HELP_TEXT)
        );
        assert_eq!(relay.dispatch(user, "/unknown").await.unwrap(), None);
        assert!(relay.store().is_empty());
        assert!(generator.calls().is_empty());

        assert_eq!(
            relay.dispatch(user, "question").await.unwrap().as_deref(),
            Some("answer")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_user_does_not_block_others() {
        let (relay, _) = relay_with(ScriptedGenerator::new([
            Script::Delay(Duration::from_secs(40), "slow".to_string()),
            Script::Reply("fast".to_string()),
        ]));
        let relay = Arc::new(relay);

        let slow = {
            let relay = Arc::clone(&relay);
            tokio::spawn(async move { relay.on_message(UserId::new(1), "first").await })
        };
        tokio::task::yield_now().await;

        let fast = relay.on_message(UserId::new(2), "second").await.unwrap();
        assert_eq!(fast, Reply::Generated("fast".to_string()));
        assert_eq!(relay.store().snapshot(UserId::new(1)).len(), 1);

        let slow = slow.await.unwrap().unwrap();
        assert_eq!(slow, Reply::Generated("slow".to_string()));
    }

    #[tokio::test]
    async fn test_same_user_turns_are_serialised() {
        let (relay, _) = relay_with(ScriptedGenerator::new([
            Script::Delay(Duration::from_millis(30), "a1".to_string()),
            Script::Reply("a2".to_string()),
        ]));
        let relay = Arc::new(relay);
        let user = UserId::new(9);

        let first = {
            let relay = Arc::clone(&relay);
            tokio::spawn(async move { relay.on_message(user, "q1").await })
        };
        tokio::task::yield_now().await;
        relay.on_message(user, "q2").await.unwrap();
        first.await.unwrap().unwrap();

        assert_eq!(
            roles_and_texts(&relay.store().snapshot(user)),
            [
                (Role::User, "q1"),
                (Role::Assistant, "a1"),
                (Role::User, "q2"),
                (Role::Assistant, "a2"),
            ]
        );
        assert!(relay.turn_locks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_turn_releases_lock() {
        let (relay, _) = relay_with(ScriptedGenerator::new([Script::Delay(
            Duration::from_secs(30),
            "late".to_string(),
        )]));
        let user = UserId::new(4);

        let outcome =
            tokio::time::timeout(Duration::from_secs(1), relay.on_message(user, "hello")).await;

        assert!(outcome.is_err());
        assert!(relay.turn_locks.is_empty());
        assert_eq!(
            roles_and_texts(&relay.store().snapshot(user)),
            [(Role::User, "hello")]
        );
        let reply = relay.on_message(user, "again").await.unwrap();
        assert_eq!(reply, Reply::Generated("ok".to_string()));
    }

    #[tokio::test]
    async fn test_bounded_history_through_relay() {
        let mut config = ConversationConfig::default();
        config.history = HistoryConfig {
            max_history: 4,
            timeout_seconds: 3600,
        };
        let (relay, _) = relay_with_config(ScriptedGenerator::default(), &config);
        let user = UserId::new(1);
        for i in 0..5 {
            relay.on_message(user, &format!("q{i}")).await.unwrap();
        }
        let history = relay.store().snapshot(user);
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].text, "q3");
    }

    #[test]
    fn test_model_info() {
        let (relay, _) = relay_with(ScriptedGenerator::default());
        let info = relay.model_info();
        assert_eq!(info.model_name, "scripted");
        assert_eq!(info.max_tokens, 1000);
        assert_eq!(info.timeout_seconds, 60);
    }
}
