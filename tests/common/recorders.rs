//! Recording collaborators and a store with injectable write failures.

use async_trait::async_trait;
use imagebatch_core::events::{
    AuditEntry, AuditError, AuditSink, NotificationDispatcher, NotificationError,
    OperationNotification,
};
use imagebatch_core::models::{OperationId, OperationRecord};
use imagebatch_core::persistence::{
    InMemoryOperationStore, OperationStore, PersistenceError, PersistenceResult,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
    fail: AtomicBool,
    stall: AtomicBool,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every entry after recording it
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.fail.store(true, Ordering::SeqCst);
        sink
    }

    /// Never return
    pub fn stalling() -> Self {
        let sink = Self::default();
        sink.stall.store(true, Ordering::SeqCst);
        sink
    }

    pub fn actions(&self) -> Vec<String> {
        self.entries.lock().iter().map(|e| e.action.clone()).collect()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.entries.lock().push(entry);
        if self.stall.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(AuditError::Unavailable("audit database offline".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<OperationNotification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_names(&self) -> Vec<String> {
        self.notifications
            .lock()
            .iter()
            .map(|n| n.event_name.clone())
            .collect()
    }

    pub fn for_operation(&self, id: OperationId) -> Vec<OperationNotification> {
        self.notifications
            .lock()
            .iter()
            .filter(|n| n.operation_id == id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingNotifier {
    async fn dispatch(&self, notification: OperationNotification) -> Result<(), NotificationError> {
        self.notifications.lock().push(notification);
        Ok(())
    }
}

/// In-memory store whose snapshot writes can be switched to fail
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: InMemoryOperationStore,
    fail_saves: AtomicBool,
    failed_saves: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn failed_saves(&self) -> usize {
        self.failed_saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OperationStore for FlakyStore {
    async fn create(&self, record: &OperationRecord) -> PersistenceResult<()> {
        self.inner.create(record).await
    }

    async fn load(&self, id: OperationId) -> PersistenceResult<OperationRecord> {
        self.inner.load(id).await
    }

    async fn save_snapshot(&self, record: &OperationRecord) -> PersistenceResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            self.failed_saves.fetch_add(1, Ordering::SeqCst);
            return Err(PersistenceError::Unavailable("disk full".to_string()));
        }
        self.inner.save_snapshot(record).await
    }

    async fn list_all(&self) -> PersistenceResult<Vec<OperationRecord>> {
        self.inner.list_all().await
    }

    async fn delete(&self, id: OperationId) -> PersistenceResult<()> {
        self.inner.delete(id).await
    }
}
