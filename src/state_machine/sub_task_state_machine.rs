use super::{
    errors::{StateMachineError, StateMachineResult},
    events::SubTaskEvent,
    states::SubTaskStatus,
};
use crate::models::SubTask;
use chrono::{DateTime, Utc};

/// Sub-task lifecycle transitions
///
/// `Pending -> Running -> {Completed, Failed, Cancelled}`, `Pending -> {Skipped,
/// Cancelled}`, plus `Reset` (Failed back to Pending) and `Interrupt` (Running
/// back to Pending after a process restart).
pub struct SubTaskStateMachine;

impl SubTaskStateMachine {
    pub fn determine_target_state(
        current_state: SubTaskStatus,
        event: &SubTaskEvent,
    ) -> StateMachineResult<SubTaskStatus> {
        use SubTaskEvent::*;
        use SubTaskStatus::*;

        let target = match (current_state, event) {
            (Pending, Start) => Running,
            (Running, SubTaskEvent::Complete) => SubTaskStatus::Completed,
            (Running, Fail { .. }) => Failed,
            (Pending | Running, Cancel) => Cancelled,
            (Pending, Skip) => Skipped,
            (Failed, Reset) => Pending,
            (Running, Interrupt) => Pending,

            (from_state, _) => {
                return Err(StateMachineError::InvalidTransition {
                    entity: "sub-task",
                    from: from_state.to_string(),
                    event: event.event_type(),
                })
            }
        };

        Ok(target)
    }

    /// Apply an event to the sub-task, maintaining timing and error fields
    pub fn transition(
        sub_task: &mut SubTask,
        event: SubTaskEvent,
        at: DateTime<Utc>,
    ) -> StateMachineResult<SubTaskStatus> {
        let target_state = Self::determine_target_state(sub_task.status, &event)?;
        let was_running = sub_task.status == SubTaskStatus::Running;

        match event {
            SubTaskEvent::Start => {
                sub_task.started_at = Some(at);
                sub_task.completed_at = None;
                sub_task.duration_ms = None;
                sub_task.progress_percentage = 0.0;
                sub_task.attempts += 1;
            }
            SubTaskEvent::Complete => {
                sub_task.progress_percentage = 100.0;
                Self::stamp_completion(sub_task, at);
            }
            SubTaskEvent::Fail { kind, message } => {
                sub_task.error_kind = Some(kind);
                sub_task.error_message = Some(message);
                Self::stamp_completion(sub_task, at);
            }
            SubTaskEvent::Cancel => {
                // Never-started images stay without timing so they do not skew averages
                if was_running {
                    Self::stamp_completion(sub_task, at);
                }
            }
            SubTaskEvent::Skip => {}
            SubTaskEvent::Reset | SubTaskEvent::Interrupt => {
                sub_task.progress_percentage = 0.0;
                sub_task.started_at = None;
                sub_task.completed_at = None;
                sub_task.duration_ms = None;
                sub_task.error_message = None;
                sub_task.error_kind = None;
            }
        }

        sub_task.status = target_state;
        Ok(target_state)
    }

    fn stamp_completion(sub_task: &mut SubTask, at: DateTime<Utc>) {
        sub_task.completed_at = Some(at);
        sub_task.duration_ms = sub_task.elapsed_ms(at);
    }
}
