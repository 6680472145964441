// tests/property/consistency_test.rs

//! Property-based tests for data consistency
//! Tests that the in-memory store and the remote store converge once the
//! write queue drains.

use crate::test_helpers::{TestContext, tasks_schema, test_config};
use mirrorsync::config::EngineConfig;
use mirrorsync::core::model::record;
use mirrorsync::core::remote::grid::{column_letter, record_to_row};
use mirrorsync::core::sync::SyncOutcome;
use proptest::prelude::*;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Op {
    Add(usize, String),
    Update(usize, String),
    Delete(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let key = 0usize..4;
    let status = "[A-Za-z]{0,8}";
    prop_oneof![
        (key.clone(), status).prop_map(|(k, s)| Op::Add(k, s)),
        (key.clone(), status).prop_map(|(k, s)| Op::Update(k, s)),
        key.prop_map(Op::Delete),
    ]
}

fn fast_context() -> TestContext {
    TestContext::with_config(EngineConfig {
        job_delay: Duration::ZERO,
        ..test_config()
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 50, // Each case replays every job against the remote store
        max_shrink_iters: 500,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_memory_and_remote_converge_after_drain(
        ops in prop::collection::vec(op_strategy(), 1..=30)
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ctx = fast_context();
            let headers = tasks_schema().headers;
            // Reference rows in header order: TaskID, Status, AssignedTo.
            let mut model: Vec<Vec<String>> = Vec::new();

            for op in &ops {
                match op {
                    Op::Add(k, status) => {
                        let key = format!("T{k}");
                        // Keys stay unique so a delete means the same row on both sides.
                        if model.iter().any(|row| row[0] == key) {
                            continue;
                        }
                        ctx.engine
                            .enqueue_add("Tasks", record([("TaskID", key.clone()), ("Status", status.clone())]))
                            .unwrap();
                        model.push(vec![key, status.clone(), String::new()]);
                    }
                    Op::Update(k, status) => {
                        let key = format!("T{k}");
                        ctx.engine
                            .enqueue_update("Tasks", "TaskID", &key, record([("Status", status.clone())]))
                            .unwrap();
                        if let Some(row) = model.iter_mut().find(|row| row[0] == key) {
                            row[1] = status.clone();
                        }
                    }
                    Op::Delete(k) => {
                        let key = format!("T{k}");
                        ctx.engine.enqueue_delete("Tasks", "TaskID", &key).unwrap();
                        model.retain(|row| row[0] != key);
                    }
                }
            }

            let local: Vec<Vec<String>> = ctx
                .list("Tasks")
                .iter()
                .map(|r| record_to_row(&headers, r))
                .collect();
            assert_eq!(local, model);

            ctx.engine.wait_idle().await;
            assert_eq!(ctx.remote_rows("Tasks"), model);

            // A resync after the drain changes nothing.
            let outcome = ctx.engine.run_sync_cycle().await;
            assert_eq!(outcome, SyncOutcome::Applied { records: model.len() });
            let resynced: Vec<Vec<String>> = ctx
                .list("Tasks")
                .iter()
                .map(|r| record_to_row(&headers, r))
                .collect();
            assert_eq!(resynced, model);
        });
    }

    #[test]
    fn test_column_letters_are_ordered_and_distinct(a in 0usize..20_000, b in 0usize..20_000) {
        let (la, lb) = (column_letter(a), column_letter(b));
        prop_assert!(la.chars().all(|c| c.is_ascii_uppercase()));
        prop_assert_eq!(a == b, la == lb);
        // Shorter names come first, then plain lexicographic order.
        prop_assert_eq!(a.cmp(&b), (la.len(), &la).cmp(&(lb.len(), &lb)));
    }
}
