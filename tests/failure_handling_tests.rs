//! Executor faults, collaborator faults and persistence faults.

mod common;

use common::*;
use imagebatch_core::models::SubTaskErrorKind;
use imagebatch_core::persistence::OperationStore;
use imagebatch_core::state_machine::{OperationStatus, SubTaskStatus};
use std::sync::Arc;

#[tokio::test]
async fn test_executor_timeout_fails_only_that_image() {
    let mut config = test_config();
    config.engine.sub_task_timeout_seconds = 1;
    let executor = ScriptedExecutor::succeeding().with_script("slow", Script::Hang);
    let harness = TestHarness::with_config(executor, config).await;

    let created = harness.start(request(&["fast", "slow"])).await;
    let finished = harness.finish(created.id).await;

    assert_eq!(finished.status, OperationStatus::CompletedWithErrors);
    let slow = &finished.target_images[1];
    assert_eq!(slow.status, SubTaskStatus::Failed);
    assert_eq!(slow.error_kind, Some(SubTaskErrorKind::Timeout));
    assert!(slow.error_message.as_deref().unwrap().contains("timed out"));
    assert_eq!(finished.target_images[0].status, SubTaskStatus::Completed);
}

#[tokio::test]
async fn test_executor_panic_is_contained() {
    let executor = ScriptedExecutor::succeeding().with_script("B", Script::Panic);
    let harness = TestHarness::new(executor).await;

    let created = harness.start(request(&["A", "B", "C"])).await;
    let finished = harness.finish(created.id).await;

    assert_eq!(finished.status, OperationStatus::CompletedWithErrors);
    let b = &finished.target_images[1];
    assert_eq!(b.error_kind, Some(SubTaskErrorKind::Panicked));
    assert!(b.error_message.as_deref().unwrap().contains("scripted panic for B"));
    assert_eq!(finished.summary.successful_images, 2);
}

#[tokio::test]
async fn test_failing_audit_sink_does_not_fail_operation() {
    let harness = TestHarness::with_parts(
        ScriptedExecutor::succeeding(),
        Arc::new(imagebatch_core::InMemoryOperationStore::new()),
        test_config(),
        Arc::new(RecordingAuditSink::failing()),
    )
    .await;

    let created = harness.start(request(&["A"])).await;
    let finished = harness.finish(created.id).await;

    assert_eq!(finished.status, OperationStatus::Completed);
    assert!(!harness.audit.actions().is_empty());
}

#[tokio::test]
async fn test_stalled_audit_sink_is_bounded_by_timeout() {
    let harness = TestHarness::with_parts(
        ScriptedExecutor::succeeding(),
        Arc::new(imagebatch_core::InMemoryOperationStore::new()),
        test_config(),
        Arc::new(RecordingAuditSink::stalling()),
    )
    .await;

    // create + start each wait out one audit timeout
    let created = within(harness.engine.create(request(&["A"]).start_immediately()))
        .await
        .unwrap();
    let finished = harness.finish(created.id).await;
    assert_eq!(finished.status, OperationStatus::Completed);
}

#[tokio::test]
async fn test_snapshot_write_failures_are_tolerated_by_default() {
    let store = Arc::new(FlakyStore::new());
    let harness = TestHarness::with_store(
        ScriptedExecutor::gated(),
        store.clone(),
        test_config(),
    )
    .await;

    let created = harness.start(request(&["A", "B"])).await;
    harness.executor.wait_for_started(1).await;
    store.fail_saves(true);
    harness.executor.release(2);

    let finished = harness.finish(created.id).await;
    assert_eq!(finished.status, OperationStatus::Completed);
    assert!(store.failed_saves() > 0);

    // The last good write is what storage holds
    let stored = store.load(created.id).await.unwrap();
    assert!(!stored.is_terminal());
}

#[tokio::test]
async fn test_strict_persistence_fails_the_operation() {
    let mut config = test_config();
    config.engine.fail_on_persistence_error = true;
    let store = Arc::new(FlakyStore::new());
    let harness = TestHarness::with_store(ScriptedExecutor::gated(), store.clone(), config).await;

    let created = harness
        .start(request(&["A", "B", "C"]).with_max_parallel_operations(1))
        .await;
    harness.executor.wait_for_started(1).await;
    store.fail_saves(true);
    harness.executor.release(3);

    let finished = harness.finish(created.id).await;
    assert_eq!(finished.status, OperationStatus::Failed);
    assert!(finished
        .error_message
        .as_deref()
        .unwrap()
        .contains("disk full"));
    assert!(!harness.engine.is_active(created.id));
}
