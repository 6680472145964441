// tests/integration/engine_test.rs

//! Engine-level behavior: read-your-writes, merge semantics, absent keys and
//! the readiness gate.

use super::test_helpers::{TestContext, test_config, to_row};
use mirrorsync::config::{AbsentKeyWrites, EngineConfig};
use mirrorsync::core::MirrorError;
use mirrorsync::core::model::record;
use mirrorsync::core::readiness::{GateState, ReadinessPolicy};
use mirrorsync::core::remote::RemoteOp;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_add_is_visible_before_any_remote_call() {
    let ctx = TestContext::new();

    let receipt = ctx
        .engine
        .enqueue_add("Tasks", record([("TaskID", "T1"), ("Status", "Pending")]))
        .unwrap();

    let tasks = ctx.list("Tasks");
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["TaskID"], "T1");
    assert_eq!(tasks[0]["Status"], "Pending");
    assert!(receipt.job_id.is_some());
    assert_eq!(receipt.matched, 1);
    // The worker has been spawned but has not run yet.
    assert!(ctx.remote.calls().is_empty());
    assert!(ctx.engine.is_draining());
}

#[tokio::test(start_paused = true)]
async fn test_update_and_delete_are_visible_immediately() {
    let ctx = TestContext::new();
    ctx.engine
        .enqueue_add("Users", record([("UserID", "u1"), ("Name", "Ana")]))
        .unwrap();

    ctx.engine
        .enqueue_update("Users", "UserID", "u1", record([("Role", "admin")]))
        .unwrap();
    let user = ctx.engine.get("Users", "UserID", "u1").unwrap().unwrap();
    assert_eq!(user["Name"], "Ana");
    assert_eq!(user["Role"], "admin");

    ctx.engine.enqueue_delete("Users", "UserID", "u1").unwrap();
    assert!(ctx.engine.get("Users", "UserID", "u1").unwrap().is_none());
    assert!(ctx.list("Users").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_last_write_wins_in_memory_and_remote() {
    let ctx = TestContext::new();
    ctx.engine
        .enqueue_add(
            "Tasks",
            record([("TaskID", "T1"), ("Status", "Pending"), ("AssignedTo", "u1")]),
        )
        .unwrap();
    ctx.engine
        .enqueue_update(
            "Tasks",
            "TaskID",
            "T1",
            record([("Status", "InProgress"), ("AssignedTo", "u2")]),
        )
        .unwrap();
    ctx.engine
        .enqueue_update("Tasks", "TaskID", "T1", record([("Status", "Completed")]))
        .unwrap();

    let task = ctx.engine.get("Tasks", "TaskID", "T1").unwrap().unwrap();
    assert_eq!(task["Status"], "Completed");
    assert_eq!(task["AssignedTo"], "u2");

    ctx.engine.wait_idle().await;
    assert_eq!(
        ctx.remote_rows("Tasks"),
        vec![to_row(&["T1", "Completed", "u2"])]
    );
}

#[tokio::test(start_paused = true)]
async fn test_delete_removes_every_local_match_but_first_remote_match() {
    let ctx = TestContext::new();
    ctx.engine
        .enqueue_add("Users", record([("UserID", "u1"), ("Name", "Ana")]))
        .unwrap();
    ctx.engine
        .enqueue_add("Users", record([("UserID", "u1"), ("Name", "Bo")]))
        .unwrap();

    let receipt = ctx.engine.enqueue_delete("Users", "UserID", "u1").unwrap();
    assert_eq!(receipt.matched, 2);
    assert!(ctx.list("Users").is_empty());

    ctx.engine.wait_idle().await;
    assert_eq!(ctx.remote_rows("Users"), vec![to_row(&["u1", "Bo", ""])]);
}

#[tokio::test(start_paused = true)]
async fn test_absent_key_update_still_enqueues_by_default() {
    let ctx = TestContext::new();

    let receipt = ctx
        .engine
        .enqueue_update("Tasks", "TaskID", "missing", record([("Status", "Done")]))
        .unwrap();
    assert_eq!(receipt.matched, 0);
    assert!(receipt.job_id.is_some());
    assert!(ctx.list("Tasks").is_empty());

    ctx.engine.wait_idle().await;
    assert_eq!(ctx.remote.count(RemoteOp::ReadGrid), 1);
    assert_eq!(ctx.remote.count(RemoteOp::WriteRow), 0);
    assert!(ctx.remote_rows("Tasks").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_absent_key_writes_can_be_skipped() {
    let ctx = TestContext::with_config(EngineConfig {
        absent_key_writes: AbsentKeyWrites::Skip,
        ..test_config()
    });

    let update = ctx
        .engine
        .enqueue_update("Tasks", "TaskID", "missing", record([("Status", "Done")]))
        .unwrap();
    let delete = ctx.engine.enqueue_delete("Tasks", "TaskID", "missing").unwrap();

    assert_eq!(update.job_id, None);
    assert_eq!(delete.job_id, None);
    assert!(!ctx.engine.is_draining());
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(ctx.remote.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_collection_is_rejected() {
    let ctx = TestContext::new();

    let err = ctx
        .engine
        .enqueue_add("Nope", record([("ID", "1")]))
        .unwrap_err();
    assert_eq!(err, MirrorError::UnknownCollection("Nope".to_string()));
    assert!(matches!(
        ctx.engine.list("Nope"),
        Err(MirrorError::UnknownCollection(_))
    ));
    assert!(matches!(
        ctx.engine.enqueue_delete("Nope", "ID", "1"),
        Err(MirrorError::UnknownCollection(_))
    ));
    assert!(!ctx.engine.is_draining());
}

#[tokio::test(start_paused = true)]
async fn test_await_ready_triggers_a_single_shared_sync() {
    let ctx = TestContext::new();
    ctx.seed_remote(
        "Tasks",
        &["TaskID", "Status", "AssignedTo"],
        &[&["T1", "Pending", "u1"]],
    );
    ctx.remote
        .set_latency(RemoteOp::BatchGet, Duration::from_millis(50));
    assert_eq!(ctx.engine.readiness(), GateState::Pending);

    let (a, b, c) = tokio::join!(
        ctx.engine.await_ready(),
        ctx.engine.await_ready(),
        ctx.engine.await_ready()
    );

    assert_eq!((a, b, c), (GateState::Ready, GateState::Ready, GateState::Ready));
    assert_eq!(ctx.remote.count(RemoteOp::BatchGet), 1);
    assert_eq!(ctx.column("Tasks", "TaskID"), vec!["T1"]);

    // Later callers pass straight through.
    assert_eq!(ctx.engine.await_ready().await, GateState::Ready);
    assert_eq!(ctx.remote.count(RemoteOp::BatchGet), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fail_closed_keeps_readers_waiting_until_a_sync_succeeds() {
    let ctx = TestContext::new();
    ctx.remote.fail_next(RemoteOp::BatchGet, 1);

    let waited = tokio::time::timeout(Duration::from_secs(5), ctx.engine.await_ready()).await;
    assert!(waited.is_err());
    assert_eq!(ctx.engine.readiness(), GateState::Pending);

    let waiter = {
        let engine = ctx.engine.clone();
        tokio::spawn(async move { engine.await_ready().await })
    };
    assert_eq!(waiter.await.unwrap(), GateState::Ready);
    assert_eq!(ctx.remote.count(RemoteOp::BatchGet), 2);
}

#[tokio::test(start_paused = true)]
async fn test_fail_open_releases_readers_after_a_failed_sync() {
    let ctx = TestContext::with_config(EngineConfig {
        readiness: ReadinessPolicy::FailOpen,
        ..test_config()
    });
    ctx.remote.fail_next(RemoteOp::BatchGet, 1);

    assert_eq!(ctx.engine.await_ready().await, GateState::Degraded);
    assert!(ctx.list("Tasks").is_empty());

    ctx.engine.run_sync_cycle().await;
    assert_eq!(ctx.engine.readiness(), GateState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_await_ready_waits_out_a_draining_queue() {
    let ctx = TestContext::new();
    ctx.engine
        .enqueue_add("Tasks", record([("TaskID", "T1"), ("Status", "Pending")]))
        .unwrap();

    // The first attempt is skipped while the add drains; the gate still opens.
    assert_eq!(ctx.engine.await_ready().await, GateState::Ready);
    assert!(!ctx.engine.is_draining());
    assert_eq!(ctx.column("Tasks", "TaskID"), vec!["T1"]);
    assert_eq!(ctx.remote.count(RemoteOp::BatchGet), 1);
}
