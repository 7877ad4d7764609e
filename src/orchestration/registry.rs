//! # Active Registry
//!
//! Process-wide table of operations that are Queued, Running or Paused. Each
//! entry carries what control requests need to reach a live operation without
//! re-reading storage: the cancellation token, the writer handle and the
//! driver's join handle. Entries are inserted by `start` and removed by the
//! writer's terminal hook.

use crate::error::{BatchError, BatchResult};
use crate::models::{OperationId, OperationRecord};
use crate::orchestration::writer::OperationWriterHandle;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Live handles for one running operation
#[derive(Debug)]
pub struct ActiveOperation {
    pub operation_id: OperationId,
    pub cancellation: CancellationToken,
    pub writer: OperationWriterHandle,
    pub registered_at: DateTime<Utc>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl ActiveOperation {
    pub fn new(writer: OperationWriterHandle, cancellation: CancellationToken) -> Self {
        Self {
            operation_id: writer.operation_id(),
            cancellation,
            writer,
            registered_at: Utc::now(),
            driver: Mutex::new(None),
        }
    }

    pub fn snapshot(&self) -> OperationRecord {
        self.writer.snapshot()
    }

    pub fn attach_driver(&self, handle: JoinHandle<()>) {
        *self.driver.lock() = Some(handle);
    }

    /// Take the driver handle; only the first caller gets it
    pub fn take_driver(&self) -> Option<JoinHandle<()>> {
        self.driver.lock().take()
    }
}

#[derive(Debug, Default)]
pub struct ActiveRegistry {
    operations: DashMap<OperationId, Arc<ActiveOperation>>,
}

impl ActiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry; fails with Conflict if the id is already active
    pub fn register(&self, operation: ActiveOperation) -> BatchResult<Arc<ActiveOperation>> {
        match self.operations.entry(operation.operation_id) {
            Entry::Occupied(_) => Err(BatchError::Conflict(format!(
                "operation {} is already active",
                operation.operation_id
            ))),
            Entry::Vacant(slot) => {
                let operation = Arc::new(operation);
                slot.insert(Arc::clone(&operation));
                debug!(operation_id = %operation.operation_id, "Registered active operation");
                Ok(operation)
            }
        }
    }

    pub fn get(&self, id: OperationId) -> Option<Arc<ActiveOperation>> {
        self.operations.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, id: OperationId) -> bool {
        self.operations.contains_key(&id)
    }

    /// Remove the entry; `None` if it was already gone
    pub fn unregister(&self, id: OperationId) -> Option<Arc<ActiveOperation>> {
        let removed = self.operations.remove(&id).map(|(_, operation)| operation);
        if removed.is_some() {
            debug!(operation_id = %id, "Unregistered active operation");
        }
        removed
    }

    pub fn list_active(&self) -> Vec<OperationId> {
        let mut ids: Vec<OperationId> = self.operations.iter().map(|entry| *entry.key()).collect();
        ids.sort();
        ids
    }

    pub fn entries(&self) -> Vec<Arc<ActiveOperation>> {
        self.operations
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
