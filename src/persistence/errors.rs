use crate::error::BatchError;
use crate::models::OperationId;
use thiserror::Error;

/// Errors raised by operation stores
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Operation {0} not found in store")]
    NotFound(OperationId),

    #[error("Operation {0} already exists in store")]
    AlreadyExists(OperationId),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to (de)serialize operation record {context}: {source}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl PersistenceError {
    pub fn io(path: impl std::fmt::Display, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_string(),
            source,
        }
    }

    pub fn serialization(context: impl std::fmt::Display, source: serde_json::Error) -> Self {
        Self::Serialization {
            context: context.to_string(),
            source,
        }
    }
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

impl From<PersistenceError> for BatchError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound(id) => BatchError::NotFound(id),
            PersistenceError::AlreadyExists(id) => {
                BatchError::Conflict(format!("operation {id} already exists"))
            }
            other => BatchError::Persistence(other.to_string()),
        }
    }
}
