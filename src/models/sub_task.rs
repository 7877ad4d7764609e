//! # Sub-task Model
//!
//! One sub-task per target image. The image path is opaque to the engine; it is
//! handed unchanged to the per-image executor.

use crate::state_machine::SubTaskStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classifies why a sub-task ended in `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubTaskErrorKind {
    /// The executor reported a failure
    ExecutorFailure,
    /// The executor did not finish within the per-image timeout
    Timeout,
    /// The executor panicked
    Panicked,
    /// The fan-out itself failed while this sub-task was in flight
    Orchestration,
}

impl fmt::Display for SubTaskErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExecutorFailure => write!(f, "executor_failure"),
            Self::Timeout => write!(f, "timeout"),
            Self::Panicked => write!(f, "panicked"),
            Self::Orchestration => write!(f, "orchestration"),
        }
    }
}

/// Per-image unit of work within an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTask {
    pub image_path: String,
    pub status: SubTaskStatus,
    /// 0-100, reported by the executor while running
    pub progress_percentage: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub error_message: Option<String>,
    pub error_kind: Option<SubTaskErrorKind>,
    /// Number of times the executor has been invoked for this image
    pub attempts: u32,
}

impl SubTask {
    pub fn new(image_path: impl Into<String>) -> Self {
        Self {
            image_path: image_path.into(),
            status: SubTaskStatus::Pending,
            progress_percentage: 0.0,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            error_message: None,
            error_kind: None,
            attempts: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Milliseconds between `started_at` and `at`; `None` when never started
    pub(crate) fn elapsed_ms(&self, at: DateTime<Utc>) -> Option<u64> {
        self.started_at
            .map(|started| (at - started).num_milliseconds().max(0) as u64)
    }
}
