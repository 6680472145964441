// src/core/remote/mod.rs

//! The remote store adapter and the backends it can drive.
//!
//! `RemoteAdapter` implements the collection-level operations (ensure, bulk
//! read, add, update, delete) once, on top of the small set of sheet
//! primitives every `SheetBackend` provides.

pub mod adapter;
pub mod grid;
pub mod memory;
pub mod sheets;

pub use adapter::{ApplyOutcome, RangeRequest, RemoteAdapter, SheetBackend, SheetRef};
pub use grid::Grid;
pub use memory::{MemoryBackend, RemoteCall, RemoteOp};
pub use sheets::SheetsBackend;
