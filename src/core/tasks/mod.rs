// src/core/tasks/mod.rs

//! Long-running background tasks that keep the engine in step with the
//! remote store.

pub mod sync_scheduler;
