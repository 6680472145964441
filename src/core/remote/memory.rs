// src/core/remote/memory.rs

//! An in-process backend holding sheets as plain grids.
//!
//! It backs `remote.kind = "memory"` for local runs, and keeps a log of every
//! call so the ordering and pacing of remote traffic can be observed. Failures
//! and latency can be injected per operation.

use super::adapter::{RangeRequest, SheetBackend, SheetRef};
use super::grid::Grid;
use crate::core::MirrorError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    ListSheets,
    AddSheet,
    BatchGet,
    ReadGrid,
    AppendRow,
    WriteRow,
    DeleteRow,
}

impl RemoteOp {
    /// Whether the operation changes remote data.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            RemoteOp::AddSheet | RemoteOp::AppendRow | RemoteOp::WriteRow | RemoteOp::DeleteRow
        )
    }
}

/// One logged call, stamped when the call started.
#[derive(Debug, Clone)]
pub struct RemoteCall {
    pub op: RemoteOp,
    pub sheet: Option<String>,
    pub at: Instant,
}

#[derive(Debug)]
struct MemorySheet {
    id: i64,
    title: String,
    grid: Grid,
}

#[derive(Debug, Default)]
struct MemoryState {
    sheets: Vec<MemorySheet>,
    next_id: i64,
    calls: Vec<RemoteCall>,
    failures: HashMap<RemoteOp, usize>,
    latency: HashMap<RemoteOp, Duration>,
}

impl MemoryState {
    fn sheet_by_id(&mut self, id: i64) -> Result<&mut MemorySheet, MirrorError> {
        self.sheets
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| MirrorError::RemoteStatus {
                status: 404,
                body: format!("no sheet with id {id}"),
            })
    }
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces a sheet with the given grid, bypassing the call log.
    pub fn seed(&self, title: &str, grid: Grid) {
        let mut state = self.state.lock();
        if let Some(sheet) = state.sheets.iter_mut().find(|s| s.title == title) {
            sheet.grid = grid;
            return;
        }
        let id = state.next_id;
        state.next_id += 1;
        state.sheets.push(MemorySheet {
            id,
            title: title.to_string(),
            grid,
        });
    }

    /// A copy of the sheet's grid, looked up by exact title.
    pub fn grid(&self, title: &str) -> Option<Grid> {
        let state = self.state.lock();
        state
            .sheets
            .iter()
            .find(|s| s.title == title)
            .map(|s| s.grid.clone())
    }

    pub fn sheet_titles(&self) -> Vec<String> {
        self.state
            .lock()
            .sheets
            .iter()
            .map(|s| s.title.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, op: RemoteOp) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.op == op)
            .count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Makes the next `times` calls of `op` fail.
    pub fn fail_next(&self, op: RemoteOp, times: usize) {
        *self.state.lock().failures.entry(op).or_default() += times;
    }

    /// Delays every future call of `op` by `delay` before it takes effect.
    pub fn set_latency(&self, op: RemoteOp, delay: Duration) {
        self.state.lock().latency.insert(op, delay);
    }

    /// Logs the call, waits out any configured latency, then consumes an
    /// injected failure if one is pending.
    async fn enter(&self, op: RemoteOp, sheet: Option<&str>) -> Result<(), MirrorError> {
        let delay = {
            let mut state = self.state.lock();
            state.calls.push(RemoteCall {
                op,
                sheet: sheet.map(str::to_string),
                at: Instant::now(),
            });
            state.latency.get(&op).copied().unwrap_or_default()
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if let Some(remaining) = state.failures.get_mut(&op)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(MirrorError::HttpClientError(format!(
                "injected failure for {op:?}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SheetBackend for MemoryBackend {
    async fn list_sheets(&self) -> Result<Vec<SheetRef>, MirrorError> {
        self.enter(RemoteOp::ListSheets, None).await?;
        let state = self.state.lock();
        Ok(state
            .sheets
            .iter()
            .map(|s| SheetRef {
                id: s.id,
                title: s.title.clone(),
            })
            .collect())
    }

    async fn add_sheet(&self, title: &str, headers: &[String]) -> Result<SheetRef, MirrorError> {
        self.enter(RemoteOp::AddSheet, Some(title)).await?;
        let mut state = self.state.lock();
        if state
            .sheets
            .iter()
            .any(|s| s.title.to_lowercase() == title.to_lowercase())
        {
            return Err(MirrorError::RemoteStatus {
                status: 400,
                body: format!("a sheet with the name \"{title}\" already exists"),
            });
        }
        let id = state.next_id;
        state.next_id += 1;
        state.sheets.push(MemorySheet {
            id,
            title: title.to_string(),
            grid: vec![headers.to_vec()],
        });
        Ok(SheetRef {
            id,
            title: title.to_string(),
        })
    }

    async fn batch_get(&self, ranges: &[RangeRequest]) -> Result<Vec<Grid>, MirrorError> {
        self.enter(RemoteOp::BatchGet, None).await?;
        let state = self.state.lock();
        ranges
            .iter()
            .map(|range| {
                let wanted = range.title.to_lowercase();
                state
                    .sheets
                    .iter()
                    .find(|s| s.title.to_lowercase() == wanted)
                    .map(|s| s.grid.clone())
                    .ok_or_else(|| MirrorError::RemoteStatus {
                        status: 400,
                        body: format!("Unable to parse range: {}", range.title),
                    })
            })
            .collect()
    }

    async fn read_grid(&self, sheet: &SheetRef, _width: usize) -> Result<Grid, MirrorError> {
        self.enter(RemoteOp::ReadGrid, Some(&sheet.title)).await?;
        let mut state = self.state.lock();
        Ok(state.sheet_by_id(sheet.id)?.grid.clone())
    }

    async fn append_row(&self, sheet: &SheetRef, row: Vec<String>) -> Result<(), MirrorError> {
        self.enter(RemoteOp::AppendRow, Some(&sheet.title)).await?;
        let mut state = self.state.lock();
        state.sheet_by_id(sheet.id)?.grid.push(row);
        Ok(())
    }

    async fn write_row(
        &self,
        sheet: &SheetRef,
        row_index: usize,
        row: Vec<String>,
    ) -> Result<(), MirrorError> {
        self.enter(RemoteOp::WriteRow, Some(&sheet.title)).await?;
        let mut state = self.state.lock();
        let target = state.sheet_by_id(sheet.id)?;
        match target.grid.get_mut(row_index) {
            Some(existing) => {
                *existing = row;
                Ok(())
            }
            None => Err(MirrorError::InvalidRequest(format!(
                "row {row_index} is out of range for '{}'",
                target.title
            ))),
        }
    }

    async fn delete_row(&self, sheet: &SheetRef, row_index: usize) -> Result<(), MirrorError> {
        self.enter(RemoteOp::DeleteRow, Some(&sheet.title)).await?;
        let mut state = self.state.lock();
        let target = state.sheet_by_id(sheet.id)?;
        if row_index >= target.grid.len() {
            return Err(MirrorError::InvalidRequest(format!(
                "row {row_index} is out of range for '{}'",
                target.title
            )));
        }
        target.grid.remove(row_index);
        Ok(())
    }
}
