//! # System Constants
//!
//! Event names, audit categories, and status groupings shared by the engine,
//! the audit sink, and the notification dispatcher.

pub use crate::state_machine::{OperationStatus, SubTaskStatus};

/// Lifecycle event names used for audit actions and notifications
pub mod events {
    pub const OPERATION_CREATED: &str = "operation.created";
    pub const OPERATION_STARTED: &str = "operation.started";
    pub const OPERATION_PAUSED: &str = "operation.paused";
    pub const OPERATION_RESUMED: &str = "operation.resumed";
    pub const OPERATION_CANCEL_REQUESTED: &str = "operation.cancel_requested";
    pub const OPERATION_CANCELLED: &str = "operation.cancelled";
    pub const OPERATION_COMPLETED: &str = "operation.completed";
    pub const OPERATION_COMPLETED_WITH_ERRORS: &str = "operation.completed_with_errors";
    pub const OPERATION_FAILED: &str = "operation.failed";
    pub const OPERATION_RETRY_REQUESTED: &str = "operation.retry_requested";
    pub const OPERATION_DELETED: &str = "operation.deleted";
    pub const OPERATION_RECOVERED: &str = "operation.recovered";
}

/// Audit categories
pub mod audit {
    pub const CATEGORY_BATCH_OPERATION: &str = "batch_operation";
    pub const RESOURCE_TYPE_OPERATION: &str = "operation";
}

/// System-wide constants
pub mod system {
    /// Version compatibility marker
    pub const IMAGEBATCH_CORE_VERSION: &str = "0.1.0";

    /// Extension of persisted operation documents
    pub const OPERATION_FILE_EXTENSION: &str = "json";

    /// Suffix used for in-flight snapshot writes before the atomic rename
    pub const SNAPSHOT_TEMP_SUFFIX: &str = "tmp";

    /// Upper bound on target images accepted in a single operation
    pub const MAX_TARGET_IMAGES: usize = 10_000;
}

/// Status groupings for validation and logic
pub mod status_groups {
    use super::{OperationStatus, SubTaskStatus};

    /// Operation statuses that have an Active Registry entry
    pub const OPERATION_ACTIVE_STATES: &[OperationStatus] = &[
        OperationStatus::Queued,
        OperationStatus::Running,
        OperationStatus::Paused,
    ];

    /// Operation statuses from which no further transition is possible
    pub const OPERATION_FINAL_STATES: &[OperationStatus] = &[
        OperationStatus::Completed,
        OperationStatus::CompletedWithErrors,
        OperationStatus::Failed,
        OperationStatus::Cancelled,
    ];

    /// Operation statuses accepted by `start`
    pub const OPERATION_STARTABLE_STATES: &[OperationStatus] =
        &[OperationStatus::Pending, OperationStatus::Paused];

    /// Sub-task statuses that count toward progress
    pub const SUB_TASK_FINAL_STATES: &[SubTaskStatus] = &[
        SubTaskStatus::Completed,
        SubTaskStatus::Failed,
        SubTaskStatus::Skipped,
        SubTaskStatus::Cancelled,
    ];
}
