// State machine module for batch operation orchestration
//
// Operation and sub-task lifecycles are modelled as pure transition tables:
// `(current state, event) -> target state`. Every status change on a record
// goes through these functions so that invalid transitions are rejected in
// exactly one place.

pub mod errors;
pub mod events;
pub mod operation_state_machine;
pub mod states;
pub mod sub_task_state_machine;

// Re-export main types for convenient access
pub use errors::{StateMachineError, StateMachineResult};
pub use events::{OperationEvent, SubTaskEvent};
pub use operation_state_machine::OperationStateMachine;
pub use states::{OperationStatus, SubTaskStatus};
pub use sub_task_state_machine::SubTaskStateMachine;
