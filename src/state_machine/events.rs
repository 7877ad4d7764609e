use crate::models::SubTaskErrorKind;
use serde::{Deserialize, Serialize};

/// Events that can trigger operation state transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OperationEvent {
    /// Register the operation for execution
    Enqueue,
    /// The driver started launching sub-tasks
    BeginFanOut,
    /// Stop launching new sub-tasks
    Pause,
    /// Allow sub-task launches again
    Resume,
    /// Fan-out finished and every attempted sub-task succeeded
    Complete,
    /// Fan-out finished with at least one failed sub-task
    CompleteWithErrors,
    /// Fan-out aborted or orchestration failed, with the error message
    Fail(String),
    /// Cancellation was requested and the fan-out has drained
    Cancel,
    /// Return a terminal operation to Pending for a partial retry
    Reset,
    /// The process stopped while the operation was active
    Interrupt,
}

impl OperationEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Enqueue => "enqueue",
            Self::BeginFanOut => "begin_fan_out",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Complete => "complete",
            Self::CompleteWithErrors => "complete_with_errors",
            Self::Fail(_) => "fail",
            Self::Cancel => "cancel",
            Self::Reset => "reset",
            Self::Interrupt => "interrupt",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }

    /// Check if this event represents a terminal transition
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Complete | Self::CompleteWithErrors | Self::Fail(_) | Self::Cancel
        )
    }

    /// Create a failure event with the given error message
    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}

/// Events that can trigger sub-task state transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SubTaskEvent {
    /// A concurrency slot was acquired and the executor invoked
    Start,
    /// The executor reported success
    Complete,
    /// The executor failed, timed out, or panicked
    Fail {
        kind: SubTaskErrorKind,
        message: String,
    },
    /// The operation was cancelled before or during this sub-task
    Cancel,
    /// The fan-out was aborted before this sub-task was attempted
    Skip,
    /// Return a failed sub-task to Pending for retry
    Reset,
    /// The process stopped while this sub-task was running
    Interrupt,
}

impl SubTaskEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Fail { .. } => "fail",
            Self::Cancel => "cancel",
            Self::Skip => "skip",
            Self::Reset => "reset",
            Self::Interrupt => "interrupt",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Create a failure event with the given kind and message
    pub fn fail_with_error(kind: SubTaskErrorKind, message: impl Into<String>) -> Self {
        Self::Fail {
            kind,
            message: message.into(),
        }
    }
}
