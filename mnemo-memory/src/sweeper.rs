//! RMT TTL sweeper
//!
//! Background purge of expired working-memory buffers, defaulting to a
//! ten-minute cadence. Same shutdown discipline as the consolidation
//! daemon.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use mnemo_core::{Clock, SystemClock, WorkingMemoryStore};

/// Default sweep cadence (10 minutes)
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

/// Periodic TTL purge for working memory
pub struct RmtTtlSweeper {
    store: Arc<dyn WorkingMemoryStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    shutdown_tx: watch::Sender<bool>,
}

impl RmtTtlSweeper {
    /// Sweeper over `store` at `interval`
    #[must_use]
    pub fn new(store: Arc<dyn WorkingMemoryStore>, interval: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            store,
            clock: Arc::new(SystemClock),
            interval,
            shutdown_tx,
        }
    }

    /// Override the clock (tests)
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Spawn the background loop
    pub fn start(&self) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let clock = Arc::clone(&self.clock);
        let interval = self.interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            info!(interval_secs = interval.as_secs(), "RMT TTL sweeper started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match store.purge_expired(clock.now()).await {
                            Ok(0) => debug!("TTL sweep found nothing to purge"),
                            Ok(purged) => info!(purged, "TTL sweep purged buffers"),
                            Err(err) => error!(error = %err, "TTL sweep failed"),
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("RMT TTL sweeper stopped");
        })
    }

    /// Signal the loop to stop
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
