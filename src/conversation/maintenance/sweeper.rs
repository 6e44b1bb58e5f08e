//! Background sweep of idle conversations.
//!
//! Lazy expiry already keeps every single conversation correct; the sweep
//! only releases memory held for users who never write again.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::conversation::store::ConversationStore;

/// Configuration for the expiry sweep.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Interval between sweeps (in seconds).
    pub interval_seconds: u64,
    /// Whether the sweep runs at all.
    pub enabled: bool,
}

impl SweepConfig {
    /// Config from an interval where `0` disables sweeping.
    #[must_use]
    pub const fn every(interval_seconds: u64) -> Self {
        Self {
            interval_seconds,
            enabled: interval_seconds > 0,
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self::every(300)
    }
}

/// Statistics from one sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepStats {
    /// Conversations removed.
    pub removed: usize,
    /// Conversations left in the store.
    pub remaining: usize,
    /// Sweep duration in milliseconds.
    pub duration_ms: u64,
}

/// Periodic task removing expired conversations from a store.
pub struct ExpirySweeper {
    store: Arc<ConversationStore>,
    config: SweepConfig,
    shutdown: Arc<Notify>,
}

impl ExpirySweeper {
    /// Create a sweeper for `store`.
    #[must_use]
    pub fn new(store: Arc<ConversationStore>, config: SweepConfig) -> Self {
        Self {
            store,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Handle used to stop the spawned task.
    #[must_use]
    pub fn shutdown_notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Spawn the sweep loop as a tokio task.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if !self.config.enabled {
            info!("Conversation sweep is disabled");
            return;
        }

        let interval = Duration::from_secs(self.config.interval_seconds);
        info!(?interval, "Starting conversation sweep worker");

        loop {
            tokio::select! {
                () = tokio::time::sleep(interval) => {
                    let stats = self.run_sweep();
                    if stats.removed > 0 {
                        info!(
                            removed = stats.removed,
                            remaining = stats.remaining,
                            duration_ms = stats.duration_ms,
                            "Sweep completed"
                        );
                    } else {
                        debug!(remaining = stats.remaining, "Sweep found nothing to remove");
                    }
                }
                () = self.shutdown.notified() => {
                    info!("Conversation sweep worker shutting down");
                    break;
                }
            }
        }
    }

    /// Run one sweep immediately.
    #[must_use]
    pub fn run_sweep(&self) -> SweepStats {
        let start = Instant::now();
        let removed = self.store.sweep_expired();

        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = start.elapsed().as_millis() as u64;

        SweepStats {
            removed,
            remaining: self.store.len(),
            duration_ms,
        }
    }
}
