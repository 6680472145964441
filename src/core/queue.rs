// src/core/queue.rs

//! Implements the write-behind queue.
//!
//! Jobs are appended under a single mutex that also guards the draining flag.
//! Whoever finds the queue idle on enqueue flips the flag and spawns the one
//! worker; the worker clears it under the same lock at the moment it sees the
//! queue empty, so at most one worker exists on a multi-threaded runtime.
//!
//! Callers that mutate local state run the mutation inside `submit_with`,
//! under the same lock as the push. Local mutation order therefore always
//! equals replay order, and `while_locked` gives the sync engine a view in
//! which no mutation or enqueue can interleave.

use crate::core::MirrorError;
use crate::core::metrics;
use crate::core::model::{Job, SchemaRegistry};
use crate::core::remote::{ApplyOutcome, RemoteAdapter};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<Job>,
    draining: bool,
}

#[derive(Debug)]
pub struct WriteQueue {
    state: Mutex<QueueState>,
    /// Publishes `true` whenever the queue is idle.
    idle_tx: watch::Sender<bool>,
    adapter: Arc<RemoteAdapter>,
    schemas: Arc<SchemaRegistry>,
    /// Fixed pause after every job, as a courtesy to the remote store's rate limits.
    job_delay: Duration,
}

impl WriteQueue {
    pub fn new(
        adapter: Arc<RemoteAdapter>,
        schemas: Arc<SchemaRegistry>,
        job_delay: Duration,
    ) -> Self {
        let (idle_tx, _) = watch::channel(true);
        Self {
            state: Mutex::new(QueueState::default()),
            idle_tx,
            adapter,
            schemas,
            job_delay,
        }
    }

    /// Runs `mutate` with the queue locked and appends the job it returns, if
    /// any, before the lock is released. If no worker is draining, starts
    /// one. Returns without waiting for the job to reach the remote store.
    /// An error from `mutate` enqueues nothing. `mutate` must not touch the
    /// queue. Must be called from within a Tokio runtime.
    pub fn submit_with<T>(
        self: &Arc<Self>,
        mutate: impl FnOnce() -> Result<(T, Option<Job>), MirrorError>,
    ) -> Result<T, MirrorError> {
        let (output, start_worker) = {
            let mut state = self.state.lock();
            let (output, job) = mutate()?;
            let start_worker = match job {
                Some(job) => {
                    state.pending.push_back(job);
                    metrics::WRITE_QUEUE_DEPTH.set(state.pending.len() as f64);
                    if state.draining {
                        false
                    } else {
                        state.draining = true;
                        self.idle_tx.send_replace(false);
                        true
                    }
                }
                None => false,
            };
            (output, start_worker)
        };

        if start_worker {
            tokio::spawn(Arc::clone(self).drain());
        }
        Ok(output)
    }

    /// Runs `f` with the queue locked, passing whether a worker is draining.
    /// No `submit_with` mutation can run while `f` does.
    pub fn while_locked<R>(&self, f: impl FnOnce(bool) -> R) -> R {
        let state = self.state.lock();
        f(state.draining)
    }

    /// The worker loop: strictly FIFO, one remote operation at a time.
    async fn drain(self: Arc<Self>) {
        debug!("Write queue worker started.");
        loop {
            let job = {
                let mut state = self.state.lock();
                match state.pending.pop_front() {
                    Some(job) => {
                        metrics::WRITE_QUEUE_DEPTH.set(state.pending.len() as f64);
                        job
                    }
                    None => {
                        state.draining = false;
                        self.idle_tx.send_replace(true);
                        debug!("Write queue drained. Worker exiting.");
                        return;
                    }
                }
            };

            self.process(&job).await;
            tokio::time::sleep(self.job_delay).await;
        }
    }

    /// Replays one job. Failures are logged and absorbed; nothing is retried.
    async fn process(&self, job: &Job) {
        let kind = job.kind();
        let waited = job.queued_for().to_std().unwrap_or_default();
        metrics::JOB_QUEUE_WAIT_SECONDS.observe(waited.as_secs_f64());
        info!(
            "Writing: {} {} (job {}, queued {:?})",
            kind, job.collection, job.id, waited
        );

        let result = match self.schemas.get(&job.collection) {
            Ok(schema) => self.adapter.apply(job, schema).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(ApplyOutcome::Applied) => {
                metrics::JOBS_APPLIED_TOTAL
                    .with_label_values(&[kind.as_str()])
                    .inc();
            }
            Ok(ApplyOutcome::NoMatch) => {
                metrics::JOBS_NO_MATCH_TOTAL
                    .with_label_values(&[kind.as_str()])
                    .inc();
            }
            Err(e) => {
                error!(
                    "Write failed: {} {} (job {}): {}",
                    kind, job.collection, job.id, e
                );
                metrics::JOBS_FAILED_TOTAL
                    .with_label_values(&[kind.as_str()])
                    .inc();
            }
        }
    }

    /// True from the first enqueue on an idle queue until the worker exits.
    pub fn is_draining(&self) -> bool {
        self.state.lock().draining
    }

    /// Number of jobs waiting, not counting the one being processed.
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves once the worker has drained every job and exited.
    pub async fn wait_idle(&self) {
        let mut rx = self.idle_tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|idle| *idle).await;
    }
}
