// src/core/tasks/sync_scheduler.rs

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::core::engine::Engine;

/// A task that triggers a sync cycle once at startup and then on a fixed
/// period, independent of request traffic.
pub struct SyncScheduler {
    engine: Engine,
    period: Duration,
}

impl SyncScheduler {
    pub fn new(engine: Engine, period: Duration) -> Self {
        Self { engine, period }
    }

    /// Runs the main loop for the sync scheduler.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Sync scheduler started. Period: {:?}", self.period);
        // The first tick completes immediately, which gives the eager startup sync.
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let outcome = self.engine.run_sync_cycle().await;
                    debug!("Scheduled sync cycle finished: {}", outcome);
                }
                _ = shutdown_rx.recv() => {
                    info!("Sync scheduler shutting down.");
                    return;
                }
            }
        }
    }
}
