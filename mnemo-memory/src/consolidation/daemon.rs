//! Background consolidation daemon
//!
//! Interval-driven loop with graceful shutdown: a `watch` channel signals
//! stop, and an in-flight pass completes (or hits its deadline) before the
//! task exits.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::ConsolidationEngine;

/// Deadline for one consolidation pass (15 minutes)
pub const PASS_DEADLINE: Duration = Duration::from_secs(15 * 60);

/// Periodic consolidation runner
pub struct ConsolidationDaemon {
    engine: Arc<ConsolidationEngine>,
    interval: Duration,
    shutdown_tx: watch::Sender<bool>,
}

impl ConsolidationDaemon {
    /// Create a daemon running `engine` every `interval`
    #[must_use]
    pub fn new(engine: Arc<ConsolidationEngine>, interval: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            engine,
            interval,
            shutdown_tx,
        }
    }

    /// Spawn the background loop
    pub fn start(&self) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let interval = self.interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so the daemon waits
            // one interval before its first pass.
            ticker.tick().await;

            info!(interval_secs = interval.as_secs(), "consolidation daemon started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let pass = tokio::time::timeout(PASS_DEADLINE, engine.consolidate(None));
                        match pass.await {
                            Ok(Ok(outcome)) => info!(
                                merged = outcome.merged,
                                decayed = outcome.decayed,
                                total_after = outcome.total_after,
                                "scheduled consolidation pass complete"
                            ),
                            Ok(Err(err)) => error!(error = %err, "consolidation pass failed"),
                            Err(_) => error!(
                                deadline_secs = PASS_DEADLINE.as_secs(),
                                "consolidation pass timed out"
                            ),
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("consolidation daemon stopped");
        })
    }

    /// Signal the loop to stop after any in-flight pass
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
