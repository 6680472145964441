// src/core/engine.rs

//! The engine service object: one constructible value owning the store, the
//! write queue, the sync engine and the readiness gate. No state is global,
//! so independent engines can run side by side.

use crate::config::{AbsentKeyWrites, EngineConfig};
use crate::core::MirrorError;
use crate::core::model::{CollectionSchema, Job, KeySelector, Record, SchemaRegistry};
use crate::core::queue::WriteQueue;
use crate::core::readiness::{GateState, ReadinessGate};
use crate::core::remote::{RemoteAdapter, SheetBackend};
use crate::core::store::Store;
use crate::core::sync::{SyncEngine, SyncOutcome};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Returned by every mutation once the in-memory update is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    /// The queued remote job, or `None` when an absent-key write was not queued.
    pub job_id: Option<Uuid>,
    /// In-memory records the mutation touched.
    pub matched: usize,
}

#[derive(Debug, Clone)]
pub struct Engine {
    store: Arc<Store>,
    queue: Arc<WriteQueue>,
    sync: Arc<SyncEngine>,
    gate: Arc<ReadinessGate>,
    schemas: Arc<SchemaRegistry>,
    absent_key_writes: AbsentKeyWrites,
}

impl Engine {
    pub fn new(
        config: &EngineConfig,
        schemas: Vec<CollectionSchema>,
        backend: Arc<dyn SheetBackend>,
    ) -> Self {
        let schemas = Arc::new(SchemaRegistry::new(schemas));
        let store = Arc::new(Store::new(schemas.names().map(str::to_string)));
        let adapter = Arc::new(RemoteAdapter::new(backend, config.metadata_retry_delay));
        let queue = Arc::new(WriteQueue::new(
            adapter.clone(),
            schemas.clone(),
            config.job_delay,
        ));
        let gate = Arc::new(ReadinessGate::new(config.readiness));
        let sync = Arc::new(SyncEngine::new(
            store.clone(),
            queue.clone(),
            adapter,
            schemas.clone(),
            gate.clone(),
        ));

        Self {
            store,
            queue,
            sync,
            gate,
            schemas,
            absent_key_writes: config.absent_key_writes,
        }
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    pub fn schema(&self, collection: &str) -> Result<&CollectionSchema, MirrorError> {
        self.schemas.get(collection)
    }

    // --- Reads ---

    pub fn list(&self, collection: &str) -> Result<Vec<Record>, MirrorError> {
        self.store.list(collection)
    }

    pub fn get(
        &self,
        collection: &str,
        key_field: &str,
        key_value: &str,
    ) -> Result<Option<Record>, MirrorError> {
        self.store
            .find(collection, &KeySelector::new(key_field, key_value))
    }

    pub fn record_counts(&self) -> Vec<(String, usize)> {
        self.store.sizes()
    }

    // --- Mutations ---
    //
    // Each one updates the store and enqueues the remote job under the queue
    // lock, so two concurrent writers reach memory and the remote store in
    // the same order.

    pub fn enqueue_add(
        &self,
        collection: &str,
        record: Record,
    ) -> Result<WriteReceipt, MirrorError> {
        self.schemas.get(collection)?;
        self.submit(|| {
            self.store.insert(collection, record.clone())?;
            Ok((Job::add(collection, record), 1))
        })
    }

    pub fn enqueue_update(
        &self,
        collection: &str,
        key_field: &str,
        key_value: &str,
        patch: Record,
    ) -> Result<WriteReceipt, MirrorError> {
        self.schemas.get(collection)?;
        let key = KeySelector::new(key_field, key_value);
        self.submit(|| {
            let matched = usize::from(self.store.patch(collection, &key, &patch)?);
            Ok((Job::update(collection, key, patch), matched))
        })
    }

    pub fn enqueue_delete(
        &self,
        collection: &str,
        key_field: &str,
        key_value: &str,
    ) -> Result<WriteReceipt, MirrorError> {
        self.schemas.get(collection)?;
        let key = KeySelector::new(key_field, key_value);
        self.submit(|| {
            let matched = self.store.remove(collection, &key)?;
            Ok((Job::delete(collection, key), matched))
        })
    }

    fn submit(
        &self,
        mutate: impl FnOnce() -> Result<(Job, usize), MirrorError>,
    ) -> Result<WriteReceipt, MirrorError> {
        let absent_key_writes = self.absent_key_writes;
        self.queue.submit_with(|| {
            let (job, matched) = mutate()?;
            if matched == 0 && absent_key_writes == AbsentKeyWrites::Skip {
                debug!(
                    "No in-memory match for {} on '{}'. Not queueing a remote job.",
                    job.kind(),
                    job.collection
                );
                let receipt = WriteReceipt {
                    job_id: None,
                    matched,
                };
                return Ok((receipt, None));
            }
            let receipt = WriteReceipt {
                job_id: Some(job.id),
                matched,
            };
            Ok((receipt, Some(job)))
        })
    }

    // --- Readiness and sync ---

    /// Waits for the first successful sync (or, fail-open, the first attempt).
    /// Starts a sync unless a waiter-driven one is already in flight; all
    /// concurrent waiters share it.
    pub async fn await_ready(&self) -> GateState {
        let state = self.gate.state();
        if state.is_released() {
            return state;
        }
        if self.gate.claim_trigger() {
            let sync = self.sync.clone();
            let gate = self.gate.clone();
            tokio::spawn(async move {
                let outcome = sync.settle().await;
                debug!("Readiness sync finished: {}", outcome);
                gate.release_trigger();
            });
        }
        self.gate.wait().await
    }

    pub fn readiness(&self) -> GateState {
        self.gate.state()
    }

    pub async fn run_sync_cycle(&self) -> SyncOutcome {
        self.sync.run_sync_cycle().await
    }

    pub fn is_syncing(&self) -> bool {
        self.sync.is_syncing()
    }

    // --- Write queue ---

    pub fn pending_jobs(&self) -> usize {
        self.queue.len()
    }

    pub fn is_draining(&self) -> bool {
        self.queue.is_draining()
    }

    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await
    }

    /// Waits up to `timeout` for the queue to drain. Returns whether it did.
    pub async fn flush(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.queue.wait_idle())
            .await
            .is_ok()
    }
}
