//! # Operation Persistence
//!
//! Whole-document storage of [`OperationRecord`]s. Every save overwrites the
//! full record; there are no incremental deltas. Writes for one operation are
//! serialized by its writer actor, so stores only need to keep distinct
//! operations from corrupting each other.

pub mod errors;
pub mod file_store;
pub mod memory_store;

pub use errors::{PersistenceError, PersistenceResult};
pub use file_store::FileOperationStore;
pub use memory_store::InMemoryOperationStore;

use crate::models::{OperationId, OperationRecord};
use async_trait::async_trait;

/// Storage contract for operation records
#[async_trait]
pub trait OperationStore: Send + Sync + std::fmt::Debug {
    /// Persist a new record; fails with `AlreadyExists` if the id is taken
    async fn create(&self, record: &OperationRecord) -> PersistenceResult<()>;

    async fn load(&self, id: OperationId) -> PersistenceResult<OperationRecord>;

    /// Overwrite the stored record with this snapshot
    async fn save_snapshot(&self, record: &OperationRecord) -> PersistenceResult<()>;

    /// Every stored record, oldest first
    async fn list_all(&self) -> PersistenceResult<Vec<OperationRecord>>;

    /// Remove the record; the engine rejects deletion of active operations first
    async fn delete(&self, id: OperationId) -> PersistenceResult<()>;
}
