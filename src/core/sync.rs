// src/core/sync.rs

//! The sync engine: replaces the in-memory snapshot wholesale from a single
//! bulk read of the remote store.
//!
//! A cycle is skipped, never deferred, when another cycle is running or the
//! write queue is draining. A bulk read that overlapped with local mutations
//! is discarded instead of applied, so unflushed local writes always win over
//! a stale refresh.

use crate::core::MirrorError;
use crate::core::metrics;
use crate::core::model::SchemaRegistry;
use crate::core::queue::WriteQueue;
use crate::core::readiness::ReadinessGate;
use crate::core::remote::RemoteAdapter;
use crate::core::store::Store;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info};

enum Commit {
    Applied,
    QueueActive,
    LocalWrites,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadySyncing,
    QueueDraining,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// The snapshot replaced the store.
    Applied { records: usize },
    /// No remote call was issued.
    Skipped(SkipReason),
    /// The bulk read finished but local writes happened meanwhile.
    Discarded,
    /// The bulk read failed; the previous snapshot is retained.
    Failed(MirrorError),
}

impl SyncOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SyncOutcome::Applied { .. } => "applied",
            SyncOutcome::Skipped(_) => "skipped",
            SyncOutcome::Discarded => "discarded",
            SyncOutcome::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOutcome::Applied { records } => write!(f, "applied ({records} records)"),
            SyncOutcome::Skipped(reason) => write!(f, "skipped ({reason:?})"),
            SyncOutcome::Discarded => f.write_str("discarded"),
            SyncOutcome::Failed(e) => write!(f, "failed ({e})"),
        }
    }
}

/// Clears the syncing flag when a cycle ends, however it ends.
struct SyncingGuard<'a>(&'a watch::Sender<bool>);

impl<'a> SyncingGuard<'a> {
    fn acquire(flag: &'a watch::Sender<bool>) -> Option<Self> {
        let acquired = flag.send_if_modified(|syncing| {
            if *syncing {
                return false;
            }
            *syncing = true;
            true
        });
        acquired.then(|| SyncingGuard(flag))
    }
}

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

#[derive(Debug)]
pub struct SyncEngine {
    store: Arc<Store>,
    queue: Arc<WriteQueue>,
    adapter: Arc<RemoteAdapter>,
    schemas: Arc<SchemaRegistry>,
    gate: Arc<ReadinessGate>,
    /// `true` while a cycle holds the bulk read.
    syncing: watch::Sender<bool>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<Store>,
        queue: Arc<WriteQueue>,
        adapter: Arc<RemoteAdapter>,
        schemas: Arc<SchemaRegistry>,
        gate: Arc<ReadinessGate>,
    ) -> Self {
        Self {
            store,
            queue,
            adapter,
            schemas,
            gate,
            syncing: watch::channel(false).0,
        }
    }

    pub fn is_syncing(&self) -> bool {
        *self.syncing.borrow()
    }

    /// Resolves once no cycle is running.
    pub async fn wait_idle(&self) {
        let mut rx = self.syncing.subscribe();
        let _ = rx.wait_for(|syncing| !*syncing).await;
    }

    /// Runs one reconciliation cycle.
    pub async fn run_sync_cycle(&self) -> SyncOutcome {
        let outcome = self.cycle().await;
        metrics::SYNC_CYCLES_TOTAL
            .with_label_values(&[outcome.label()])
            .inc();
        outcome
    }

    /// Runs cycles until one reaches the remote store, or until some other
    /// cycle releases the readiness gate. A skipped or discarded cycle first
    /// waits for whatever blocked it to finish.
    pub async fn settle(&self) -> SyncOutcome {
        loop {
            let outcome = self.run_sync_cycle().await;
            match outcome {
                SyncOutcome::Skipped(SkipReason::AlreadySyncing) => self.wait_idle().await,
                SyncOutcome::Skipped(SkipReason::QueueDraining) | SyncOutcome::Discarded => {
                    self.queue.wait_idle().await
                }
                _ => return outcome,
            }
            if self.gate.is_released() {
                return outcome;
            }
        }
    }

    async fn cycle(&self) -> SyncOutcome {
        // Read under the queue lock so no mutation sits between the draining
        // check and the counter.
        let Some(started_at) = self
            .queue
            .while_locked(|draining| (!draining).then(|| self.store.mutations()))
        else {
            info!("Skipping sync: write queue is draining.");
            return SyncOutcome::Skipped(SkipReason::QueueDraining);
        };
        let Some(_guard) = SyncingGuard::acquire(&self.syncing) else {
            info!("Skipping sync: a sync is already in progress.");
            return SyncOutcome::Skipped(SkipReason::AlreadySyncing);
        };

        let timer = Instant::now();
        let result = self.adapter.bulk_read(&self.schemas.all()).await;
        metrics::SYNC_DURATION_SECONDS.observe(timer.elapsed().as_secs_f64());

        let outcome = match result {
            Ok(snapshot) => {
                let records = snapshot.record_count();
                let commit = self.queue.while_locked(|draining| {
                    if draining {
                        Commit::QueueActive
                    } else if self.store.replace_all_if_unchanged(snapshot, started_at) {
                        Commit::Applied
                    } else {
                        Commit::LocalWrites
                    }
                });
                match commit {
                    Commit::Applied => {
                        debug!("Sync complete: {} records.", records);
                        SyncOutcome::Applied { records }
                    }
                    Commit::QueueActive => {
                        info!("Discarding synced snapshot: write queue became active during the read.");
                        SyncOutcome::Discarded
                    }
                    Commit::LocalWrites => {
                        info!("Discarding synced snapshot: local writes happened during the read.");
                        SyncOutcome::Discarded
                    }
                }
            }
            Err(e) => {
                error!("Sync error: {}", e);
                SyncOutcome::Failed(e)
            }
        };

        self.gate.observe(&outcome);
        outcome
    }
}
