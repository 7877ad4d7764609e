//! # Operation Data Model
//!
//! Persisted, serializable description of a batch operation and its per-image
//! sub-tasks. These types carry no behaviour beyond field-level helpers; status
//! changes go through [`crate::state_machine`] and derived fields are computed
//! by [`crate::orchestration::aggregator`].

pub mod operation;
pub mod sub_task;

pub use operation::{
    CreateOperationRequest, OperationId, OperationPriority, OperationRecord, OperationSummary,
    OperationType,
};
pub use sub_task::{SubTask, SubTaskErrorKind};
