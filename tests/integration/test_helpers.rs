// tests/integration/test_helpers.rs

//! Test helpers for integration tests
//! Provides an engine wired to an in-memory remote store, plus shortcuts for
//! seeding and inspecting the remote side.

#![allow(dead_code)]

use mirrorsync::config::EngineConfig;
use mirrorsync::core::model::{CollectionSchema, Record};
use mirrorsync::core::readiness::ReadinessPolicy;
use mirrorsync::core::remote::{MemoryBackend, SheetBackend};
use mirrorsync::core::Engine;
use std::sync::Arc;
use std::time::Duration;

pub const JOB_DELAY: Duration = Duration::from_millis(300);

pub fn tasks_schema() -> CollectionSchema {
    CollectionSchema::new("Tasks", "TaskID", &["TaskID", "Status", "AssignedTo"])
}

pub fn users_schema() -> CollectionSchema {
    CollectionSchema::new("Users", "UserID", &["UserID", "Name", "Role"])
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        job_delay: JOB_DELAY,
        metadata_retry_delay: Duration::from_millis(100),
        readiness: ReadinessPolicy::FailClosed,
        ..EngineConfig::default()
    }
}

/// Test context that holds an engine and the in-memory remote behind it.
pub struct TestContext {
    pub engine: Engine,
    pub remote: Arc<MemoryBackend>,
}

impl TestContext {
    /// Creates an engine over `Tasks` and `Users`, both present remotely
    /// with a header row and no data.
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let ctx = Self::bare(config);
        for schema in [tasks_schema(), users_schema()] {
            ctx.remote.seed(&schema.name, vec![schema.headers.clone()]);
        }
        ctx
    }

    /// Same collections, but nothing exists on the remote side yet.
    pub fn bare(config: EngineConfig) -> Self {
        let remote = Arc::new(MemoryBackend::new());
        let backend: Arc<dyn SheetBackend> = remote.clone();
        let engine = Engine::new(&config, vec![tasks_schema(), users_schema()], backend);
        Self { engine, remote }
    }

    /// Replaces a remote sheet with a header row plus `rows`.
    pub fn seed_remote(&self, title: &str, headers: &[&str], rows: &[&[&str]]) {
        let mut grid = vec![to_row(headers)];
        grid.extend(rows.iter().map(|r| to_row(r)));
        self.remote.seed(title, grid);
    }

    /// The remote sheet's data rows, without the header row.
    pub fn remote_rows(&self, title: &str) -> Vec<Vec<String>> {
        self.remote
            .grid(title)
            .map(|grid| grid.into_iter().skip(1).collect())
            .unwrap_or_default()
    }

    pub fn list(&self, collection: &str) -> Vec<Record> {
        self.engine.list(collection).unwrap()
    }

    /// The values of `field` across a collection, in order.
    pub fn column(&self, collection: &str, field: &str) -> Vec<String> {
        self.list(collection)
            .iter()
            .map(|r| r.get(field).cloned().unwrap_or_default())
            .collect()
    }
}

pub fn to_row(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}
