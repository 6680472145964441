// src/core/mod.rs

//! The central module containing the engine and its building blocks.

pub mod engine;
pub mod errors;
pub mod metrics;
pub mod model;
pub mod queue;
pub mod readiness;
pub mod remote;
pub mod store;
pub mod sync;
pub mod tasks;

pub use engine::{Engine, WriteReceipt};
pub use errors::MirrorError;
pub use model::{CollectionSchema, Record};
pub use readiness::{GateState, ReadinessPolicy};
pub use sync::SyncOutcome;
