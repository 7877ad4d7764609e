//! # File Operation Store
//!
//! One JSON document per operation, named `{id}.json`, inside a single
//! directory. Snapshots are written to `{id}.json.tmp` and renamed over the
//! target so readers never observe a partially written record.

use super::{OperationStore, PersistenceError, PersistenceResult};
use crate::constants::system::{OPERATION_FILE_EXTENSION, SNAPSHOT_TEMP_SUFFIX};
use crate::models::{OperationId, OperationRecord};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct FileOperationStore {
    directory: PathBuf,
}

impl FileOperationStore {
    /// Open a store rooted at `directory`, creating it if needed
    pub async fn open(directory: impl Into<PathBuf>) -> PersistenceResult<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory)
            .await
            .map_err(|e| PersistenceError::io(directory.display(), e))?;

        debug!(directory = %directory.display(), "Opened file operation store");
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn path_for(&self, id: OperationId) -> PathBuf {
        self.directory
            .join(format!("{id}.{OPERATION_FILE_EXTENSION}"))
    }

    fn temp_path_for(&self, id: OperationId) -> PathBuf {
        self.directory.join(format!(
            "{id}.{OPERATION_FILE_EXTENSION}.{SNAPSHOT_TEMP_SUFFIX}"
        ))
    }

    fn encode(record: &OperationRecord) -> PersistenceResult<Vec<u8>> {
        serde_json::to_vec_pretty(record)
            .map_err(|e| PersistenceError::serialization(record.id, e))
    }

    async fn write_atomically(&self, record: &OperationRecord) -> PersistenceResult<()> {
        let bytes = Self::encode(record)?;
        let temp_path = self.temp_path_for(record.id);
        let final_path = self.path_for(record.id);

        fs::write(&temp_path, &bytes)
            .await
            .map_err(|e| PersistenceError::io(temp_path.display(), e))?;
        fs::rename(&temp_path, &final_path)
            .await
            .map_err(|e| PersistenceError::io(final_path.display(), e))?;
        Ok(())
    }

    async fn read_record(path: &Path) -> PersistenceResult<OperationRecord> {
        let bytes = fs::read(path)
            .await
            .map_err(|e| PersistenceError::io(path.display(), e))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| PersistenceError::serialization(path.display(), e))
    }
}

#[async_trait]
impl OperationStore for FileOperationStore {
    async fn create(&self, record: &OperationRecord) -> PersistenceResult<()> {
        let path = self.path_for(record.id);
        if fs::try_exists(&path)
            .await
            .map_err(|e| PersistenceError::io(path.display(), e))?
        {
            return Err(PersistenceError::AlreadyExists(record.id));
        }
        self.write_atomically(record).await
    }

    async fn load(&self, id: OperationId) -> PersistenceResult<OperationRecord> {
        let path = self.path_for(id);
        match Self::read_record(&path).await {
            Err(PersistenceError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                Err(PersistenceError::NotFound(id))
            }
            other => other,
        }
    }

    async fn save_snapshot(&self, record: &OperationRecord) -> PersistenceResult<()> {
        self.write_atomically(record).await
    }

    async fn list_all(&self) -> PersistenceResult<Vec<OperationRecord>> {
        let mut entries = fs::read_dir(&self.directory)
            .await
            .map_err(|e| PersistenceError::io(self.directory.display(), e))?;

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PersistenceError::io(self.directory.display(), e))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(OPERATION_FILE_EXTENSION) {
                continue;
            }

            // A corrupt document must not hide every other operation
            match Self::read_record(&path).await {
                Ok(record) => records.push(record),
                Err(error) => warn!(
                    path = %path.display(),
                    error = %error,
                    "Skipping unreadable operation record"
                ),
            }
        }

        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    async fn delete(&self, id: OperationId) -> PersistenceResult<()> {
        let path = self.path_for(id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(PersistenceError::NotFound(id)),
            Err(e) => Err(PersistenceError::io(path.display(), e)),
        }
    }
}
