// src/core/remote/adapter.rs

//! Translates jobs and bulk-read requests into operations against the
//! external store.

use super::grid::{self, Grid};
use crate::core::MirrorError;
use crate::core::model::{CollectionSchema, Job, JobOp, KeySelector, Record, Snapshot};
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// A resolved remote collection representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRef {
    pub id: i64,
    pub title: String,
}

/// One range of a batched read: the sheet title and how many columns to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRequest {
    pub title: String,
    pub width: usize,
}

/// The primitive operations a remote store must offer. Row indices are
/// zero-based grid indices, so index 0 is the header row.
#[async_trait]
pub trait SheetBackend: Send + Sync + Debug {
    /// Lists every sheet currently known to the remote store.
    async fn list_sheets(&self) -> Result<Vec<SheetRef>, MirrorError>;

    /// Creates a sheet whose first row is `headers`.
    async fn add_sheet(&self, title: &str, headers: &[String]) -> Result<SheetRef, MirrorError>;

    /// Reads many ranges in a single round-trip. Grids come back in request order.
    async fn batch_get(&self, ranges: &[RangeRequest]) -> Result<Vec<Grid>, MirrorError>;

    async fn read_grid(&self, sheet: &SheetRef, width: usize) -> Result<Grid, MirrorError>;

    async fn append_row(&self, sheet: &SheetRef, row: Vec<String>) -> Result<(), MirrorError>;

    async fn write_row(
        &self,
        sheet: &SheetRef,
        row_index: usize,
        row: Vec<String>,
    ) -> Result<(), MirrorError>;

    async fn delete_row(&self, sheet: &SheetRef, row_index: usize) -> Result<(), MirrorError>;
}

/// What applying a job did to the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Update or delete found no row with the key. Not an error.
    NoMatch,
}

#[derive(Debug, Clone)]
pub struct RemoteAdapter {
    backend: Arc<dyn SheetBackend>,
    metadata_retry_delay: Duration,
}

impl RemoteAdapter {
    pub fn new(backend: Arc<dyn SheetBackend>, metadata_retry_delay: Duration) -> Self {
        Self {
            backend,
            metadata_retry_delay,
        }
    }

    pub fn backend(&self) -> &Arc<dyn SheetBackend> {
        &self.backend
    }

    /// Resolves the collection's remote sheet by case-insensitive title,
    /// creating it with the declared headers if it does not exist.
    /// A failed metadata load is retried once after `metadata_retry_delay`.
    pub async fn ensure_collection(
        &self,
        schema: &CollectionSchema,
    ) -> Result<SheetRef, MirrorError> {
        let sheets = match self.backend.list_sheets().await {
            Ok(sheets) => sheets,
            Err(e) => {
                warn!(
                    "Failed to load remote metadata: {}. Retrying in {:?}.",
                    e, self.metadata_retry_delay
                );
                tokio::time::sleep(self.metadata_retry_delay).await;
                self.backend.list_sheets().await?
            }
        };

        let wanted = schema.name.to_lowercase();
        if let Some(sheet) = sheets.into_iter().find(|s| s.title.to_lowercase() == wanted) {
            return Ok(sheet);
        }

        info!(
            "Remote collection '{}' not found. Creating it with {} headers.",
            schema.name,
            schema.headers.len()
        );
        self.backend
            .add_sheet(&schema.name, &schema.headers)
            .await
            .map_err(|e| {
                error!("Failed to create remote collection '{}': {}", schema.name, e);
                MirrorError::CollectionUnavailable(schema.name.clone())
            })
    }

    /// Reads every requested collection in one round-trip and converts each
    /// grid to records using the declared headers.
    pub async fn bulk_read(&self, schemas: &[CollectionSchema]) -> Result<Snapshot, MirrorError> {
        let ranges: Vec<RangeRequest> = schemas
            .iter()
            .map(|s| RangeRequest {
                title: s.name.clone(),
                width: s.headers.len(),
            })
            .collect();

        let grids = self.backend.batch_get(&ranges).await?;
        if grids.len() != schemas.len() {
            return Err(MirrorError::MalformedResponse(format!(
                "bulk read returned {} ranges for {} collections",
                grids.len(),
                schemas.len()
            )));
        }

        let mut snapshot = Snapshot::default();
        for (schema, grid) in schemas.iter().zip(grids) {
            snapshot.insert(
                schema.name.clone(),
                grid::grid_to_records(&grid, &schema.headers),
            );
        }
        Ok(snapshot)
    }

    /// Appends one row in the declared schema's field order.
    pub async fn apply_add(
        &self,
        sheet: &SheetRef,
        schema: &CollectionSchema,
        record: &Record,
    ) -> Result<ApplyOutcome, MirrorError> {
        let row = grid::record_to_row(&schema.headers, record);
        self.backend.append_row(sheet, row).await?;
        Ok(ApplyOutcome::Applied)
    }

    /// Merges `patch` into the first row whose key cell matches and writes it back.
    pub async fn apply_update(
        &self,
        sheet: &SheetRef,
        schema: &CollectionSchema,
        key: &KeySelector,
        patch: &Record,
    ) -> Result<ApplyOutcome, MirrorError> {
        let grid = self.backend.read_grid(sheet, schema.headers.len()).await?;
        let headers = grid::header_row(&grid, &schema.headers);
        let Some(index) = grid::find_key_row(&grid, &headers, key, false) else {
            debug!(
                "No row in '{}' with {} = '{}'. Update skipped.",
                sheet.title, key.field, key.value
            );
            return Ok(ApplyOutcome::NoMatch);
        };

        let mut row = grid[index].clone();
        let ignored = grid::merge_patch(&mut row, &headers, patch);
        if !ignored.is_empty() {
            warn!(
                "Ignoring fields {:?} not present in the header row of '{}'.",
                ignored, sheet.title
            );
        }
        self.backend.write_row(sheet, index, row).await?;
        Ok(ApplyOutcome::Applied)
    }

    /// Deletes the first row whose key cell matches. Empty cells never match.
    pub async fn apply_delete(
        &self,
        sheet: &SheetRef,
        schema: &CollectionSchema,
        key: &KeySelector,
    ) -> Result<ApplyOutcome, MirrorError> {
        let grid = self.backend.read_grid(sheet, schema.headers.len()).await?;
        let headers = grid::header_row(&grid, &schema.headers);
        match grid::find_key_row(&grid, &headers, key, true) {
            Some(index) => {
                self.backend.delete_row(sheet, index).await?;
                Ok(ApplyOutcome::Applied)
            }
            None => {
                debug!(
                    "No row in '{}' with {} = '{}'. Delete skipped.",
                    sheet.title, key.field, key.value
                );
                Ok(ApplyOutcome::NoMatch)
            }
        }
    }

    /// Ensures the job's collection exists remotely, then dispatches it.
    pub async fn apply(
        &self,
        job: &Job,
        schema: &CollectionSchema,
    ) -> Result<ApplyOutcome, MirrorError> {
        let sheet = self.ensure_collection(schema).await?;
        match &job.op {
            JobOp::Add { record } => self.apply_add(&sheet, schema, record).await,
            JobOp::Update { key, patch } => self.apply_update(&sheet, schema, key, patch).await,
            JobOp::Delete { key } => self.apply_delete(&sheet, schema, key).await,
        }
    }
}
