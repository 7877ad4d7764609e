//! Engine and request builders shared by the integration tests.

use super::{RecordingAuditSink, RecordingNotifier, ScriptedExecutor};
use imagebatch_core::config::EngineConfig;
use imagebatch_core::models::{CreateOperationRequest, OperationId, OperationRecord, OperationType};
use imagebatch_core::orchestration::BatchEngine;
use imagebatch_core::persistence::{InMemoryOperationStore, OperationStore};
use imagebatch_core::state_machine::OperationStatus;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const TEST_OPERATION_TYPE: OperationType = OperationType::Debloat;

/// Default config tightened for tests
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.engine.audit_timeout_ms = 200;
    config.engine.notification_timeout_ms = 200;
    config.engine.sub_task_timeout_seconds = 30;
    config
}

pub fn test_config_in(storage_dir: &Path) -> EngineConfig {
    let mut config = test_config();
    config.engine.storage_dir = storage_dir.to_path_buf();
    config
}

/// Engine plus the collaborators tests want to inspect
pub struct TestHarness {
    pub engine: BatchEngine,
    pub executor: Arc<ScriptedExecutor>,
    pub store: Arc<dyn OperationStore>,
    pub audit: Arc<RecordingAuditSink>,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestHarness {
    pub async fn new(executor: ScriptedExecutor) -> Self {
        Self::with_store(executor, Arc::new(InMemoryOperationStore::new()), test_config()).await
    }

    pub async fn with_config(executor: ScriptedExecutor, config: EngineConfig) -> Self {
        Self::with_store(executor, Arc::new(InMemoryOperationStore::new()), config).await
    }

    pub async fn with_store(
        executor: ScriptedExecutor,
        store: Arc<dyn OperationStore>,
        config: EngineConfig,
    ) -> Self {
        Self::with_parts(executor, store, config, Arc::new(RecordingAuditSink::new())).await
    }

    pub async fn with_parts(
        executor: ScriptedExecutor,
        store: Arc<dyn OperationStore>,
        config: EngineConfig,
        audit: Arc<RecordingAuditSink>,
    ) -> Self {
        let executor = executor.into_arc();
        let notifier = Arc::new(RecordingNotifier::new());
        let engine = BatchEngine::builder(config)
            .with_store(Arc::clone(&store))
            .with_executor(TEST_OPERATION_TYPE, executor.clone())
            .with_audit_sink(audit.clone())
            .with_notification_dispatcher(notifier.clone())
            .build()
            .await
            .expect("engine should build");

        Self {
            engine,
            executor,
            store,
            audit,
            notifier,
        }
    }

    /// Create and start an operation over `images`
    pub async fn start(&self, request: CreateOperationRequest) -> OperationRecord {
        self.engine
            .create(request.start_immediately())
            .await
            .expect("operation should start")
    }

    pub async fn finish(&self, id: OperationId) -> OperationRecord {
        within(self.engine.wait_for_completion(id))
            .await
            .expect("operation should reach a terminal status")
    }

    /// Poll until the operation reports `status`
    pub async fn wait_for_status(&self, id: OperationId, status: OperationStatus) -> OperationRecord {
        let mut receiver = self.engine.watch(id).await.expect("operation should exist");
        within(async {
            loop {
                if receiver.borrow_and_update().status == status {
                    return receiver.borrow().clone();
                }
                if receiver.changed().await.is_err() {
                    let record = self.engine.get(id).await.expect("operation should exist");
                    assert_eq!(record.status, status, "writer stopped before reaching {status}");
                    return record;
                }
            }
        })
        .await
    }
}

pub fn request(images: &[&str]) -> CreateOperationRequest {
    CreateOperationRequest::new("Test batch", TEST_OPERATION_TYPE, images.iter().copied())
}

/// Request over `count` generated image paths
pub fn request_with_images(count: usize) -> CreateOperationRequest {
    let images: Vec<String> = (0..count).map(|i| format!("D:/images/image-{i:03}.wim")).collect();
    CreateOperationRequest::new("Generated batch", TEST_OPERATION_TYPE, images)
}

/// Fail the test instead of hanging
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(10), future)
        .await
        .expect("test step timed out")
}

/// Poll `condition` until it holds
pub async fn eventually<F: FnMut() -> bool>(mut condition: F) {
    within(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}
