//! Error types for the batch operation engine.
//!

use crate::config::ConfigurationError;
use crate::models::OperationId;
use crate::state_machine::OperationStatus;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BatchError {
    #[error("Operation {0} not found")]
    NotFound(OperationId),
    #[error("Operation {operation_id} cannot {action} while {current}")]
    InvalidState {
        operation_id: OperationId,
        current: OperationStatus,
        action: &'static str,
    },
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Orchestration error: {0}")]
    Orchestration(String),
    #[error("Timeout error: {0}")]
    Timeout(String),
    #[error("Engine is shutting down")]
    ShuttingDown,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BatchError {
    pub(crate) fn invalid_state(
        operation_id: OperationId,
        current: OperationStatus,
        action: &'static str,
    ) -> Self {
        BatchError::InvalidState {
            operation_id,
            current,
            action,
        }
    }

    /// True for errors produced by rejecting a caller request outright.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            BatchError::NotFound(_)
                | BatchError::InvalidState { .. }
                | BatchError::Conflict(_)
                | BatchError::Validation(_)
                | BatchError::ShuttingDown
        )
    }
}

impl From<serde_json::Error> for BatchError {
    fn from(error: serde_json::Error) -> Self {
        BatchError::Validation(format!("JSON serialization error: {error}"))
    }
}

impl From<ConfigurationError> for BatchError {
    fn from(error: ConfigurationError) -> Self {
        BatchError::Configuration(error.to_string())
    }
}

pub type BatchResult<T> = Result<T, BatchError>;
