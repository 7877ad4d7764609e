use super::{
    errors::{StateMachineError, StateMachineResult},
    events::OperationEvent,
    states::OperationStatus,
};
use crate::models::OperationRecord;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Operation lifecycle transitions
///
/// `Pending -> Queued -> Running <-> Paused -> {Completed, CompletedWithErrors,
/// Failed, Cancelled}`, plus `Reset` (terminal back to Pending for a partial
/// retry) and `Interrupt` (active back to Pending after a process restart).
pub struct OperationStateMachine;

impl OperationStateMachine {
    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        current_state: OperationStatus,
        event: &OperationEvent,
    ) -> StateMachineResult<OperationStatus> {
        use OperationEvent::*;
        use OperationStatus::*;

        let target = match (current_state, event) {
            (Pending, Enqueue) | (Paused, Enqueue) => Queued,

            (Queued, BeginFanOut) => Running,

            (Running, Pause) => Paused,
            (Paused, Resume) => Running,

            (Queued | Running | Paused, OperationEvent::Complete) => OperationStatus::Completed,
            (Queued | Running | Paused, OperationEvent::CompleteWithErrors) => {
                OperationStatus::CompletedWithErrors
            }
            (Queued | Running | Paused, Fail(_)) => Failed,

            // Cancellation from any non-terminal state
            (state, Cancel) if !state.is_terminal() => Cancelled,

            (state, Reset) if state.is_terminal() => Pending,
            (state, Interrupt) if state.is_active() => Pending,

            (from_state, _) => {
                return Err(StateMachineError::InvalidTransition {
                    entity: "operation",
                    from: from_state.to_string(),
                    event: event.event_type(),
                })
            }
        };

        Ok(target)
    }

    /// Apply an event to the record, stamping lifecycle timestamps
    pub fn transition(
        record: &mut OperationRecord,
        event: OperationEvent,
        at: DateTime<Utc>,
    ) -> StateMachineResult<OperationStatus> {
        let from_state = record.status;
        let target_state = Self::determine_target_state(from_state, &event)?;

        match &event {
            OperationEvent::Enqueue => {
                record.started_at = Some(at);
                record.completed_at = None;
                record.duration_ms = None;
                record.error_message = None;
                record.cancel_requested_at = None;
                record.run_count += 1;
            }
            OperationEvent::Fail(message) => {
                record.error_message = Some(message.clone());
            }
            OperationEvent::Reset => {
                record.started_at = None;
                record.completed_at = None;
                record.duration_ms = None;
                record.error_message = None;
                record.cancel_requested_at = None;
            }
            OperationEvent::Interrupt => {
                record.cancel_requested_at = None;
            }
            _ => {}
        }

        if event.is_terminal() {
            record.completed_at = Some(at);
            record.duration_ms = record
                .started_at
                .map(|started| (at - started).num_milliseconds().max(0) as u64);
        }

        record.status = target_state;

        debug!(
            operation_id = %record.id,
            from = %from_state,
            to = %target_state,
            event = event.event_type(),
            "Operation transition applied"
        );

        Ok(target_state)
    }
}
