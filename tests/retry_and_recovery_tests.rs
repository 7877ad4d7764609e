//! Retrying failed images, crash recovery and engine shutdown.

mod common;

use chrono::Utc;
use common::*;
use imagebatch_core::error::BatchError;
use imagebatch_core::models::OperationRecord;
use imagebatch_core::orchestration::ShutdownMode;
use imagebatch_core::persistence::{FileOperationStore, OperationStore};
use imagebatch_core::state_machine::{
    OperationEvent, OperationStateMachine, OperationStatus, SubTaskEvent, SubTaskStateMachine,
    SubTaskStatus,
};
use std::sync::Arc;

#[tokio::test]
async fn test_retry_reruns_only_failed_images() {
    let executor = ScriptedExecutor::succeeding().with_script("B", Script::Fail("locked".into()));
    let harness = TestHarness::new(executor).await;

    let created = harness
        .start(request(&["A", "B", "C"]).with_max_parallel_operations(2))
        .await;
    let first = harness.finish(created.id).await;
    assert_eq!(first.status, OperationStatus::CompletedWithErrors);

    let retried = harness.engine.retry_failed_images(created.id).await.unwrap();
    assert_eq!(retried.run_count, 2);
    let second = harness.finish(created.id).await;

    // The failure is deterministic, so the rerun fails the same way
    assert_eq!(second.status, OperationStatus::CompletedWithErrors);
    assert_eq!(second.target_images[0], first.target_images[0]);
    assert_eq!(second.target_images[2], first.target_images[2]);
    assert_eq!(second.target_images[1].attempts, 2);

    let b_runs = harness
        .executor
        .invocations()
        .iter()
        .filter(|path| path.as_str() == "B")
        .count();
    assert_eq!(b_runs, 2);
    assert_eq!(harness.executor.invocations().len(), 4);
}

#[tokio::test]
async fn test_retry_without_failures_is_rejected() {
    let harness = TestHarness::new(ScriptedExecutor::gated()).await;
    let created = harness
        .start(request(&["A", "B"]).with_max_parallel_operations(1))
        .await;
    harness.executor.wait_for_started(1).await;
    harness.engine.cancel(created.id).await.unwrap();
    let cancelled = harness.finish(created.id).await;
    assert_eq!(cancelled.status, OperationStatus::Cancelled);

    // Nothing failed, so there is nothing to retry
    assert!(matches!(
        harness.engine.retry_failed_images(created.id).await,
        Err(BatchError::Validation(_))
    ));
}

#[tokio::test]
async fn test_retry_rejects_active_and_pending_operations() {
    let harness = TestHarness::new(ScriptedExecutor::gated()).await;
    let pending = harness.engine.create(request(&["A"])).await.unwrap();
    assert!(matches!(
        harness.engine.retry_failed_images(pending.id).await,
        Err(BatchError::InvalidState {
            current: OperationStatus::Pending,
            ..
        })
    ));

    harness.engine.start(pending.id).await.unwrap();
    harness.executor.wait_for_started(1).await;
    assert!(matches!(
        harness.engine.retry_failed_images(pending.id).await,
        Err(BatchError::InvalidState {
            current: OperationStatus::Running,
            ..
        })
    ));
    harness.executor.release(1);
    harness.finish(pending.id).await;
}

#[tokio::test]
async fn test_retry_after_fail_fast_runs_failed_and_skipped_images_stay() {
    let executor = ScriptedExecutor::succeeding().with_script("B", Script::Fail("locked".into()));
    let harness = TestHarness::new(executor).await;

    let created = harness
        .start(
            request(&["A", "B", "C"])
                .with_max_parallel_operations(1)
                .with_continue_on_error(false),
        )
        .await;
    let failed = harness.finish(created.id).await;
    assert_eq!(failed.status, OperationStatus::Failed);

    harness.engine.retry_failed_images(created.id).await.unwrap();
    let second = harness.finish(created.id).await;

    assert_eq!(second.status, OperationStatus::Failed);
    assert_eq!(second.target_images[2].status, SubTaskStatus::Skipped);
    assert_eq!(harness.executor.invocations(), vec!["A", "B", "B"]);
}

#[tokio::test]
async fn test_rejected_retry_leaves_record_unchanged() {
    let executor = ScriptedExecutor::succeeding().with_script("B", Script::Fail("locked".into()));
    let harness = TestHarness::new(executor).await;

    let created = harness.start(request(&["A", "B", "C"])).await;
    let finished = harness.finish(created.id).await;
    assert_eq!(finished.status, OperationStatus::CompletedWithErrors);

    harness.engine.shutdown(ShutdownMode::Drain).await;
    assert!(matches!(
        harness.engine.retry_failed_images(created.id).await,
        Err(BatchError::ShuttingDown)
    ));

    let stored = harness.store.load(created.id).await.unwrap();
    assert_eq!(stored, finished);
    assert_eq!(stored.target_images[1].status, SubTaskStatus::Failed);
    assert_eq!(stored.target_images[1].error_message.as_deref(), Some("locked"));
    assert_eq!(stored.summary.failed_images, 1);
}

#[tokio::test]
async fn test_retry_without_registered_executor_leaves_record_unchanged() {
    let store: Arc<dyn OperationStore> = Arc::new(imagebatch_core::InMemoryOperationStore::new());
    let executor = ScriptedExecutor::succeeding().with_script("B", Script::Fail("locked".into()));
    let first = TestHarness::with_store(executor, Arc::clone(&store), test_config()).await;
    let created = first.start(request(&["A", "B"])).await;
    let finished = first.finish(created.id).await;

    // Same storage, but this engine has no executor for the operation type
    let engine = imagebatch_core::BatchEngine::builder(test_config())
        .with_store(Arc::clone(&store))
        .build()
        .await
        .unwrap();
    assert!(matches!(
        engine.retry_failed_images(created.id).await,
        Err(BatchError::Validation(_))
    ));
    assert_eq!(store.load(created.id).await.unwrap(), finished);
}

/// Record a previous process left mid-run: A done, B running, C pending
fn interrupted_record() -> OperationRecord {
    let mut record = OperationRecord::from_request(request(&["A", "B", "C"]), 2);
    let now = Utc::now();
    OperationStateMachine::transition(&mut record, OperationEvent::Enqueue, now).unwrap();
    OperationStateMachine::transition(&mut record, OperationEvent::BeginFanOut, now).unwrap();
    for index in [0, 1] {
        SubTaskStateMachine::transition(&mut record.target_images[index], SubTaskEvent::Start, now)
            .unwrap();
    }
    SubTaskStateMachine::transition(&mut record.target_images[0], SubTaskEvent::Complete, now)
        .unwrap();
    imagebatch_core::orchestration::aggregator::refresh_derived_fields(&mut record);
    record
}

#[tokio::test]
async fn test_recovery_resets_interrupted_operation() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileOperationStore::open(dir.path()).await.unwrap());
    let record = interrupted_record();
    store.create(&record).await.unwrap();

    let harness = TestHarness::with_store(
        ScriptedExecutor::succeeding(),
        store.clone(),
        test_config_in(dir.path()),
    )
    .await;
    let recovered = harness.engine.recover_interrupted_operations().await.unwrap();
    assert_eq!(recovered, vec![record.id]);

    let reset = harness.engine.get(record.id).await.unwrap();
    assert_eq!(reset.status, OperationStatus::Pending);
    assert_eq!(reset.target_images[0].status, SubTaskStatus::Completed);
    assert_eq!(reset.target_images[1].status, SubTaskStatus::Pending);
    assert_eq!(reset.target_images[1].attempts, 1);
    assert!(!harness.engine.is_active(record.id));

    harness.engine.start(record.id).await.unwrap();
    let finished = harness.finish(record.id).await;
    assert_eq!(finished.status, OperationStatus::Completed);
    assert_eq!(harness.executor.invocations(), vec!["B", "C"]);
}

#[tokio::test]
async fn test_recovery_can_restart_operations() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileOperationStore::open(dir.path()).await.unwrap());
    let record = interrupted_record();
    store.create(&record).await.unwrap();

    let mut config = test_config_in(dir.path());
    config.engine.resume_interrupted_on_startup = true;
    let harness = TestHarness::with_store(ScriptedExecutor::succeeding(), store, config).await;

    harness.engine.recover_interrupted_operations().await.unwrap();
    let finished = harness.finish(record.id).await;

    assert_eq!(finished.status, OperationStatus::Completed);
    assert_eq!(finished.run_count, 2);
}

#[tokio::test]
async fn test_recovery_finishes_pending_cancellation() {
    let store = Arc::new(imagebatch_core::InMemoryOperationStore::new());
    let mut record = interrupted_record();
    record.cancel_requested_at = Some(Utc::now());
    store.create(&record).await.unwrap();

    let harness =
        TestHarness::with_store(ScriptedExecutor::succeeding(), store, test_config()).await;
    harness.engine.recover_interrupted_operations().await.unwrap();

    let cancelled = harness.engine.get(record.id).await.unwrap();
    assert_eq!(cancelled.status, OperationStatus::Cancelled);
    assert_eq!(cancelled.target_images[0].status, SubTaskStatus::Completed);
    assert_eq!(cancelled.target_images[1].status, SubTaskStatus::Cancelled);
    assert_eq!(cancelled.target_images[2].status, SubTaskStatus::Cancelled);
    assert_eq!(harness.executor.started(), 0);
}

#[tokio::test]
async fn test_shutdown_drain_waits_for_operations() {
    let harness = TestHarness::new(
        ScriptedExecutor::succeeding().with_delay(std::time::Duration::from_millis(20)),
    )
    .await;
    let created = harness.start(request(&["A", "B", "C"])).await;

    within(harness.engine.shutdown(ShutdownMode::Drain)).await;

    let record = harness.engine.get(created.id).await.unwrap();
    assert_eq!(record.status, OperationStatus::Completed);
    assert!(harness.engine.is_shutting_down());
    assert!(matches!(
        harness.engine.create(request(&["D"]).start_immediately()).await,
        Err(BatchError::ShuttingDown)
    ));
}

#[tokio::test]
async fn test_shutdown_cancel_settles_operations() {
    let harness = TestHarness::new(ScriptedExecutor::gated()).await;
    let created = harness.start(request(&["A", "B", "C"]).with_max_parallel_operations(1)).await;
    harness.executor.wait_for_started(1).await;

    within(harness.engine.shutdown(ShutdownMode::Cancel)).await;

    let record = harness.engine.get(created.id).await.unwrap();
    assert_eq!(record.status, OperationStatus::Cancelled);
    assert!(harness.engine.list_active().is_empty());
}

#[tokio::test]
async fn test_abandoned_operation_is_recovered_by_next_engine() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn OperationStore> =
        Arc::new(FileOperationStore::open(dir.path()).await.unwrap());

    let first = TestHarness::with_store(
        ScriptedExecutor::gated(),
        Arc::clone(&store),
        test_config_in(dir.path()),
    )
    .await;
    let created = first.start(request(&["A", "B"]).with_max_parallel_operations(1)).await;
    first.executor.wait_for_started(1).await;
    first.engine.shutdown(ShutdownMode::Abandon).await;

    let left_behind = store.load(created.id).await.unwrap();
    assert_eq!(left_behind.status, OperationStatus::Running);

    let reopened = Arc::new(FileOperationStore::open(dir.path()).await.unwrap());
    let second = TestHarness::with_store(
        ScriptedExecutor::succeeding(),
        reopened,
        test_config_in(dir.path()),
    )
    .await;
    let recovered = second.engine.recover_interrupted_operations().await.unwrap();
    assert_eq!(recovered, vec![created.id]);

    second.engine.start(created.id).await.unwrap();
    let finished = second.finish(created.id).await;
    assert_eq!(finished.status, OperationStatus::Completed);
    assert_eq!(finished.summary.successful_images, 2);
}
