// tests/integration/write_queue_test.rs

//! Write-behind queue: ordering, pacing, failure absorption and the single
//! worker guarantee.

use super::test_helpers::{JOB_DELAY, TestContext, test_config, to_row};
use chrono::TimeDelta;
use mirrorsync::config::EngineConfig;
use mirrorsync::core::metrics;
use mirrorsync::core::model::{Job, record};
use mirrorsync::core::remote::{RemoteCall, RemoteOp};
use std::time::Duration;

fn writes(calls: &[RemoteCall]) -> Vec<(RemoteOp, String)> {
    calls
        .iter()
        .filter(|c| c.op.is_write())
        .map(|c| (c.op, c.sheet.clone().unwrap_or_default()))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_jobs_apply_in_enqueue_order_across_collections() {
    let ctx = TestContext::new();
    let started = tokio::time::Instant::now();

    ctx.engine
        .enqueue_add("Tasks", record([("TaskID", "T1")]))
        .unwrap();
    ctx.engine
        .enqueue_add("Users", record([("UserID", "u1")]))
        .unwrap();
    ctx.engine
        .enqueue_add("Tasks", record([("TaskID", "T2")]))
        .unwrap();
    assert_eq!(ctx.engine.pending_jobs(), 3);

    ctx.engine.wait_idle().await;

    let calls = ctx.remote.calls();
    assert_eq!(
        writes(&calls),
        vec![
            (RemoteOp::AppendRow, "Tasks".to_string()),
            (RemoteOp::AppendRow, "Users".to_string()),
            (RemoteOp::AppendRow, "Tasks".to_string()),
        ]
    );

    // Each job's delay elapses before the next job touches the remote store.
    let appends: Vec<_> = calls
        .iter()
        .filter(|c| c.op == RemoteOp::AppendRow)
        .collect();
    for pair in appends.windows(2) {
        assert!(pair[1].at - pair[0].at >= JOB_DELAY);
    }
    assert!(started.elapsed() >= JOB_DELAY * 3);
    assert_eq!(ctx.engine.pending_jobs(), 0);
    assert!(!ctx.engine.is_draining());
}

#[tokio::test(start_paused = true)]
async fn test_add_update_delete_replay_in_order() {
    let ctx = TestContext::new();

    ctx.engine
        .enqueue_add("Tasks", record([("TaskID", "T1"), ("Status", "Pending")]))
        .unwrap();
    ctx.engine
        .enqueue_update("Tasks", "TaskID", "T1", record([("Status", "Completed")]))
        .unwrap();
    ctx.engine.enqueue_delete("Tasks", "TaskID", "T1").unwrap();
    assert!(ctx.list("Tasks").is_empty());

    ctx.engine.wait_idle().await;

    assert_eq!(
        writes(&ctx.remote.calls()),
        vec![
            (RemoteOp::AppendRow, "Tasks".to_string()),
            (RemoteOp::WriteRow, "Tasks".to_string()),
            (RemoteOp::DeleteRow, "Tasks".to_string()),
        ]
    );
    assert!(ctx.remote_rows("Tasks").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_update_merges_into_the_remote_row() {
    let ctx = TestContext::new();
    ctx.engine
        .enqueue_add("Tasks", record([("TaskID", "T1"), ("Status", "Pending")]))
        .unwrap();
    ctx.engine
        .enqueue_update("Tasks", "TaskID", "T1", record([("Status", "Completed")]))
        .unwrap();

    ctx.engine.wait_idle().await;
    assert_eq!(
        ctx.remote_rows("Tasks"),
        vec![to_row(&["T1", "Completed", ""])]
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_job_is_logged_and_the_worker_moves_on() {
    let ctx = TestContext::new();
    ctx.remote.fail_next(RemoteOp::AppendRow, 1);

    ctx.engine
        .enqueue_add("Tasks", record([("TaskID", "T1")]))
        .unwrap();
    ctx.engine
        .enqueue_add("Tasks", record([("TaskID", "T2")]))
        .unwrap();
    ctx.engine.wait_idle().await;

    // Memory keeps both; the remote store only got the second.
    assert_eq!(ctx.column("Tasks", "TaskID"), vec!["T1", "T2"]);
    assert_eq!(ctx.remote_rows("Tasks"), vec![to_row(&["T2", "", ""])]);

    // The delay still follows the failed job.
    let appends: Vec<_> = ctx
        .remote
        .calls()
        .into_iter()
        .filter(|c| c.op == RemoteOp::AppendRow)
        .collect();
    assert_eq!(appends.len(), 2);
    assert!(appends[1].at - appends[0].at >= JOB_DELAY);
}

#[tokio::test(start_paused = true)]
async fn test_missing_remote_collection_is_created_with_headers() {
    let ctx = TestContext::bare(test_config());

    ctx.engine
        .enqueue_add("Users", record([("UserID", "u1"), ("Name", "Ana")]))
        .unwrap();
    ctx.engine.wait_idle().await;

    assert_eq!(ctx.remote.count(RemoteOp::AddSheet), 1);
    assert_eq!(
        ctx.remote.grid("Users").unwrap(),
        vec![to_row(&["UserID", "Name", "Role"]), to_row(&["u1", "Ana", ""])]
    );
}

#[tokio::test(start_paused = true)]
async fn test_remote_collection_lookup_ignores_case() {
    let ctx = TestContext::bare(test_config());
    ctx.remote
        .seed("tasks", vec![to_row(&["TaskID", "Status", "AssignedTo"])]);

    ctx.engine
        .enqueue_add("Tasks", record([("TaskID", "T1")]))
        .unwrap();
    ctx.engine.wait_idle().await;

    assert_eq!(ctx.remote.count(RemoteOp::AddSheet), 0);
    assert_eq!(ctx.remote.sheet_titles(), vec!["tasks"]);
    assert_eq!(ctx.remote_rows("tasks"), vec![to_row(&["T1", "", ""])]);
}

#[tokio::test(start_paused = true)]
async fn test_worker_restarts_after_going_idle() {
    let ctx = TestContext::new();

    ctx.engine
        .enqueue_add("Tasks", record([("TaskID", "T1")]))
        .unwrap();
    ctx.engine.wait_idle().await;
    assert!(!ctx.engine.is_draining());

    ctx.engine
        .enqueue_add("Tasks", record([("TaskID", "T2")]))
        .unwrap();
    assert!(ctx.engine.is_draining());
    ctx.engine.wait_idle().await;

    assert_eq!(
        ctx.remote_rows("Tasks"),
        vec![to_row(&["T1", "", ""]), to_row(&["T2", "", ""])]
    );
}

#[tokio::test(start_paused = true)]
async fn test_flush_reports_whether_the_queue_drained() {
    let ctx = TestContext::new();
    for i in 0..5 {
        ctx.engine
            .enqueue_add("Tasks", record([("TaskID", format!("T{i}"))]))
            .unwrap();
    }

    assert!(!ctx.engine.flush(JOB_DELAY).await);
    assert!(ctx.engine.pending_jobs() > 0);
    assert!(ctx.engine.flush(Duration::from_secs(10)).await);
    assert_eq!(ctx.remote_rows("Tasks").len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_enqueues_share_one_worker() {
    let ctx = TestContext::with_config(EngineConfig {
        job_delay: Duration::ZERO,
        ..test_config()
    });
    let latency = Duration::from_millis(2);
    ctx.remote.set_latency(RemoteOp::AppendRow, latency);

    let mut handles = Vec::new();
    for t in 0..8 {
        let engine = ctx.engine.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..5 {
                engine
                    .enqueue_add("Tasks", record([("TaskID", format!("T{t}-{i}"))]))
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    ctx.engine.wait_idle().await;

    assert_eq!(ctx.list("Tasks").len(), 40);
    assert_eq!(ctx.remote_rows("Tasks").len(), 40);

    // With one worker, no append can start while another is still in flight.
    let appends: Vec<_> = ctx
        .remote
        .calls()
        .into_iter()
        .filter(|c| c.op == RemoteOp::AppendRow)
        .collect();
    assert_eq!(appends.len(), 40);
    for pair in appends.windows(2) {
        assert!(pair[1].at - pair[0].at >= latency);
    }
}

#[test]
fn test_queued_for_counts_from_enqueue() {
    let job = Job::add("Tasks", record([("TaskID", "T1")]));
    assert!(job.queued_for() >= TimeDelta::zero());
}

#[tokio::test(start_paused = true)]
async fn test_replayed_jobs_record_their_queue_wait() {
    let ctx = TestContext::new();

    ctx.engine
        .enqueue_add("Tasks", record([("TaskID", "T1")]))
        .unwrap();
    ctx.engine
        .enqueue_add("Tasks", record([("TaskID", "T2")]))
        .unwrap();
    ctx.engine.wait_idle().await;

    let text = metrics::gather_metrics();
    assert!(text.contains("mirrorsync_job_queue_wait_seconds_count"));
    assert!(text.contains("mirrorsync_job_queue_wait_seconds_bucket"));
}
