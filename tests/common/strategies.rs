//! Proptest strategies for sub-task populations.

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use imagebatch_core::models::{SubTask, SubTaskErrorKind};
use imagebatch_core::state_machine::SubTaskStatus;
use proptest::prelude::*;

pub fn sub_task_status() -> impl Strategy<Value = SubTaskStatus> {
    prop_oneof![
        Just(SubTaskStatus::Pending),
        Just(SubTaskStatus::Running),
        Just(SubTaskStatus::Completed),
        Just(SubTaskStatus::Failed),
        Just(SubTaskStatus::Skipped),
        Just(SubTaskStatus::Cancelled),
    ]
}

/// Sub-task whose fields are consistent with its status
pub fn sub_task(index: usize) -> impl Strategy<Value = SubTask> {
    (sub_task_status(), 0u64..600_000, 0.0f64..100.0).prop_map(move |(status, duration, progress)| {
        let mut sub_task = SubTask::new(format!("D:/images/{index}.wim"));
        let started = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        sub_task.status = status;
        match status {
            SubTaskStatus::Pending => {}
            SubTaskStatus::Running => {
                sub_task.started_at = Some(started);
                sub_task.progress_percentage = progress;
                sub_task.attempts = 1;
            }
            SubTaskStatus::Completed | SubTaskStatus::Failed | SubTaskStatus::Cancelled => {
                sub_task.started_at = Some(started);
                sub_task.completed_at = Some(started + ChronoDuration::milliseconds(duration as i64));
                sub_task.duration_ms = Some(duration);
                sub_task.attempts = 1;
                if status == SubTaskStatus::Completed {
                    sub_task.progress_percentage = 100.0;
                }
                if status == SubTaskStatus::Failed {
                    sub_task.error_kind = Some(SubTaskErrorKind::ExecutorFailure);
                    sub_task.error_message = Some("executor failed".to_string());
                }
            }
            SubTaskStatus::Skipped => {}
        }
        sub_task
    })
}

pub fn sub_tasks(max: usize) -> impl Strategy<Value = Vec<SubTask>> {
    (1..=max).prop_flat_map(|len| (0..len).map(sub_task).collect::<Vec<_>>())
}
