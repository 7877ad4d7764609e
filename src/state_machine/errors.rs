use crate::error::BatchError;
use thiserror::Error;

/// Error types for state machine operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateMachineError {
    #[error("Invalid {entity} transition from {from} on event {event}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        event: &'static str,
    },

    #[error("Sub-task index {index} out of range for operation with {total} images")]
    UnknownSubTask { index: usize, total: usize },
}

/// Result type alias for state machine operations
pub type StateMachineResult<T> = Result<T, StateMachineError>;

impl From<StateMachineError> for BatchError {
    fn from(err: StateMachineError) -> Self {
        BatchError::Orchestration(format!("{err}"))
    }
}
