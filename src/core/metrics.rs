// src/core/metrics.rs

//! Defines and registers Prometheus metrics for engine monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Gauge, GaugeVec, Histogram, TextEncoder, register_counter_vec, register_gauge,
    register_gauge_vec, register_histogram,
};

lazy_static! {
    // --- Gauges ---
    /// Jobs waiting in the write queue.
    pub static ref WRITE_QUEUE_DEPTH: Gauge =
        register_gauge!("mirrorsync_write_queue_depth", "Number of jobs waiting in the write queue.").unwrap();
    /// 1 once the store has been populated by a successful sync.
    pub static ref READY: Gauge =
        register_gauge!("mirrorsync_ready", "Indicates if a sync has populated the store (1 for true, 0 for false).").unwrap();
    pub static ref COLLECTION_RECORDS: GaugeVec =
        register_gauge_vec!("mirrorsync_collection_records", "Number of records held in memory, labeled by collection.", &["collection"]).unwrap();

    // --- Counters ---
    pub static ref JOBS_APPLIED_TOTAL: CounterVec =
        register_counter_vec!("mirrorsync_jobs_applied_total", "Total number of jobs applied to the remote store, labeled by kind.", &["kind"]).unwrap();
    /// Update and delete jobs whose key had no remote row.
    pub static ref JOBS_NO_MATCH_TOTAL: CounterVec =
        register_counter_vec!("mirrorsync_jobs_no_match_total", "Total number of jobs that found no matching remote row, labeled by kind.", &["kind"]).unwrap();
    pub static ref JOBS_FAILED_TOTAL: CounterVec =
        register_counter_vec!("mirrorsync_jobs_failed_total", "Total number of jobs that failed and were discarded, labeled by kind.", &["kind"]).unwrap();
    pub static ref SYNC_CYCLES_TOTAL: CounterVec =
        register_counter_vec!("mirrorsync_sync_cycles_total", "Total number of sync cycles, labeled by outcome.", &["outcome"]).unwrap();

    // --- Histograms ---
    pub static ref SYNC_DURATION_SECONDS: Histogram =
        register_histogram!("mirrorsync_sync_duration_seconds", "Duration of the bulk read in a sync cycle, in seconds.").unwrap();
    /// Time a job spent waiting in the write queue before its replay started.
    pub static ref JOB_QUEUE_WAIT_SECONDS: Histogram =
        register_histogram!("mirrorsync_job_queue_wait_seconds", "Time jobs spent in the write queue before being replayed, in seconds.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
