//! Startup helpers for the relay binaries.
//!
//! Both entry points load [`Settings`] from the environment and an optional
//! `.env` file, build the shared store and relay, start the expiry sweeper
//! and run until Ctrl+C.

use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::conversation::maintenance::ExpirySweeper;
use crate::conversation::store::ConversationStore;
use crate::llm::build_generator;
use crate::relay::Relay;
use crate::server::{self, AppState};
use crate::settings::{Settings, load_dotenv};
use crate::telegram::{TelegramApi, TelegramPoller, DEFAULT_API_URL};

/// Install the global subscriber. `RUST_LOG` wins over `log_level`.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Run the Telegram bot (used by the `chat-relay` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run_bot() -> ExitCode {
    let Some((settings, relay)) = prepare(true) else {
        return ExitCode::from(1);
    };
    let Some(token) = settings.telegram_token.as_deref() else {
        return ExitCode::from(1);
    };

    let poller_config = settings.poller_config();
    let api = match TelegramApi::new(token, DEFAULT_API_URL, poller_config.poll_timeout) {
        Ok(api) => api,
        Err(e) => {
            tracing::error!("Failed to create Telegram client: {e}");
            return ExitCode::from(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    rt.block_on(async move {
        let sweeper = ExpirySweeper::new(Arc::clone(relay.store()), settings.sweep_config());
        let stop_sweeper = sweeper.shutdown_notifier();
        let sweeper_task = sweeper.spawn();

        let poller = TelegramPoller::new(api, relay, poller_config);
        let stop_poller = poller.shutdown_notifier();
        let poller_task = tokio::spawn(poller.run());

        shutdown_signal().await;
        stop_poller.notify_one();
        stop_sweeper.notify_one();

        if let Err(e) = poller_task.await {
            tracing::error!("Telegram poller task failed: {e}");
        }
        if let Err(e) = sweeper_task.await {
            tracing::error!("Sweeper task failed: {e}");
        }
    });

    tracing::info!("Chat relay stopped");
    ExitCode::SUCCESS
}

/// Run the HTTP API (used by the `chat-relay-server` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run_server() -> ExitCode {
    let Some((settings, relay)) = prepare(false) else {
        return ExitCode::from(1);
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let result = rt.block_on(async move {
        let sweeper = ExpirySweeper::new(Arc::clone(relay.store()), settings.sweep_config());
        let stop_sweeper = sweeper.shutdown_notifier();
        let sweeper_task = sweeper.spawn();

        let result =
            server::run_server_with_shutdown(AppState::new(relay), settings.port, shutdown_signal())
                .await;

        stop_sweeper.notify_one();
        if let Err(e) = sweeper_task.await {
            tracing::error!("Sweeper task failed: {e}");
        }
        result
    });

    if let Err(e) = result {
        tracing::error!("Server error: {e}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Load settings, set up logging and build the relay.
fn prepare(require_token: bool) -> Option<(Settings, Arc<Relay>)> {
    let env_file = load_dotenv();
    let settings = Settings::from_env();
    init_tracing(&settings.log_level);

    tracing::info!("Starting chat relay v{}", env!("CARGO_PKG_VERSION"));
    match env_file {
        Ok(Some(path)) => tracing::info!(path = %path.display(), "Loaded .env file"),
        Ok(None) => {}
        Err(e) => tracing::warn!("Ignoring unreadable .env file: {e}"),
    }

    let report = settings.validate(require_token);
    for warning in &report.warnings {
        tracing::warn!("Configuration warning: {warning}");
    }
    if !report.is_ok() {
        for error in &report.errors {
            tracing::error!("Configuration error: {error}");
        }
        return None;
    }

    match serde_json::to_string(&settings.redacted()) {
        Ok(json) => tracing::info!(settings = %json, "Configuration loaded"),
        Err(e) => tracing::warn!("Failed to render configuration: {e}"),
    }

    let generator = match build_generator(&settings.backend_config()) {
        Ok(generator) => generator,
        Err(e) => {
            tracing::error!("Failed to create generation backend: {e}");
            return None;
        }
    };

    let store = Arc::new(ConversationStore::new(settings.conversation.history.clone()));
    let relay = Arc::new(Relay::new(store, generator, &settings.conversation));
    Some((settings, relay))
}

/// Resolve on Ctrl+C.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown requested"),
        Err(e) => {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    }
}
