//! In-memory store for tests and embedders that do not need durability.

use super::{OperationStore, PersistenceError, PersistenceResult};
use crate::models::{OperationId, OperationRecord};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct InMemoryOperationStore {
    records: RwLock<HashMap<OperationId, OperationRecord>>,
}

impl InMemoryOperationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl OperationStore for InMemoryOperationStore {
    async fn create(&self, record: &OperationRecord) -> PersistenceResult<()> {
        let mut records = self.records.write();
        if records.contains_key(&record.id) {
            return Err(PersistenceError::AlreadyExists(record.id));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn load(&self, id: OperationId) -> PersistenceResult<OperationRecord> {
        self.records
            .read()
            .get(&id)
            .cloned()
            .ok_or(PersistenceError::NotFound(id))
    }

    async fn save_snapshot(&self, record: &OperationRecord) -> PersistenceResult<()> {
        self.records.write().insert(record.id, record.clone());
        Ok(())
    }

    async fn list_all(&self) -> PersistenceResult<Vec<OperationRecord>> {
        let mut records: Vec<OperationRecord> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    async fn delete(&self, id: OperationId) -> PersistenceResult<()> {
        self.records
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or(PersistenceError::NotFound(id))
    }
}
