// src/core/readiness.rs

//! A one-shot barrier that holds readers back until the store has been
//! populated by a bulk sync.

use crate::core::metrics;
use crate::core::sync::SyncOutcome;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::{info, warn};

/// What a failed first sync does to waiting readers.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ReadinessPolicy {
    /// Release waiters after a failed attempt; they see whatever the store holds.
    FailOpen,
    /// Keep waiters blocked until a sync succeeds.
    #[default]
    FailClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GateState {
    Pending,
    /// Released after a successful sync.
    Ready,
    /// Released by the fail-open policy without a successful sync yet.
    Degraded,
}

impl GateState {
    pub fn is_released(&self) -> bool {
        !matches!(self, GateState::Pending)
    }
}

#[derive(Debug)]
pub struct ReadinessGate {
    policy: ReadinessPolicy,
    /// Held while a waiter-driven sync is in flight.
    triggered: AtomicBool,
    state_tx: watch::Sender<GateState>,
}

impl ReadinessGate {
    pub fn new(policy: ReadinessPolicy) -> Self {
        let (state_tx, _) = watch::channel(GateState::Pending);
        Self {
            policy,
            triggered: AtomicBool::new(false),
            state_tx,
        }
    }

    pub fn policy(&self) -> ReadinessPolicy {
        self.policy
    }

    pub fn state(&self) -> GateState {
        *self.state_tx.borrow()
    }

    pub fn is_released(&self) -> bool {
        self.state().is_released()
    }

    /// Claims the right to drive a readiness sync. Returns true for exactly
    /// one caller until `release_trigger` is called.
    pub fn claim_trigger(&self) -> bool {
        self.triggered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Lets the next waiter drive a sync again.
    pub fn release_trigger(&self) {
        self.triggered.store(false, Ordering::SeqCst);
    }

    /// Feeds a finished sync cycle into the gate.
    pub fn observe(&self, outcome: &SyncOutcome) {
        match outcome {
            SyncOutcome::Applied { .. } => {
                let mut released = false;
                self.state_tx.send_if_modified(|state| {
                    if *state == GateState::Ready {
                        return false;
                    }
                    released = *state == GateState::Pending;
                    *state = GateState::Ready;
                    true
                });
                if released {
                    info!("Store populated by first sync. Serving reads.");
                }
                metrics::READY.set(1.0);
            }
            SyncOutcome::Failed(e) if self.policy == ReadinessPolicy::FailOpen => {
                let released = self.state_tx.send_if_modified(|state| {
                    if *state != GateState::Pending {
                        return false;
                    }
                    *state = GateState::Degraded;
                    true
                });
                if released {
                    warn!(
                        "First sync failed ({}). Releasing readers with an unsynced store.",
                        e
                    );
                }
            }
            _ => {}
        }
    }

    /// Waits until the gate is released.
    pub async fn wait(&self) -> GateState {
        let mut rx = self.state_tx.subscribe();
        match rx.wait_for(GateState::is_released).await {
            Ok(state) => *state,
            Err(_) => GateState::Pending,
        }
    }
}
