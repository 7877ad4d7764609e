//! # Progress Aggregator
//!
//! Derives operation-level progress, outcome summary and final status from the
//! sub-task list. Every function here is pure; the writer calls
//! [`refresh_derived_fields`] after each mutation so the persisted record never
//! carries a stale summary.

use crate::models::{OperationRecord, OperationSummary, SubTask};
use crate::state_machine::{OperationEvent, SubTaskStatus};

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Share of sub-tasks in a terminal status, as a percentage
///
/// Only Pending/Running to terminal transitions move this value, so it never
/// decreases while an operation runs.
pub fn progress_percentage(sub_tasks: &[SubTask]) -> f64 {
    if sub_tasks.is_empty() {
        return 0.0;
    }
    let finished = sub_tasks.iter().filter(|s| s.is_terminal()).count();
    round2(finished as f64 / sub_tasks.len() as f64 * 100.0)
}

/// Counts by terminal status, success rate and mean duration
pub fn summarize(sub_tasks: &[SubTask]) -> OperationSummary {
    let mut summary = OperationSummary {
        total_images: sub_tasks.len(),
        ..OperationSummary::default()
    };

    let mut duration_total: u64 = 0;
    let mut timed = 0usize;

    for sub_task in sub_tasks {
        match sub_task.status {
            SubTaskStatus::Completed => summary.successful_images += 1,
            SubTaskStatus::Failed => summary.failed_images += 1,
            SubTaskStatus::Skipped => summary.skipped_images += 1,
            SubTaskStatus::Cancelled => summary.cancelled_images += 1,
            SubTaskStatus::Pending | SubTaskStatus::Running => {}
        }

        if sub_task.completed_at.is_some() {
            duration_total += sub_task.duration_ms.unwrap_or(0);
            timed += 1;
        }
    }

    if summary.total_images > 0 {
        summary.success_rate = round2(
            summary.successful_images as f64 / summary.total_images as f64 * 100.0,
        );
    }
    if timed > 0 {
        summary.average_duration_ms = round2(duration_total as f64 / timed as f64);
    }

    summary
}

/// Recompute `progress_percentage` and `summary` in place
pub fn refresh_derived_fields(record: &mut OperationRecord) {
    record.progress_percentage = progress_percentage(&record.target_images);
    record.summary = summarize(&record.target_images);
}

/// Terminal event for a drained fan-out
///
/// Cancellation wins over everything else. Otherwise any failed sub-task yields
/// `CompleteWithErrors` when the operation tolerates failures and `Fail` with
/// the first failure's message when it does not.
pub fn final_event(record: &OperationRecord) -> OperationEvent {
    if record.cancel_requested_at.is_some() {
        return OperationEvent::Cancel;
    }

    match record.first_failure() {
        None => OperationEvent::Complete,
        Some(_) if record.continue_on_error => OperationEvent::CompleteWithErrors,
        Some(failure) => OperationEvent::fail_with_error(format!(
            "{}: {}",
            failure.image_path,
            failure
                .error_message
                .as_deref()
                .unwrap_or("image operation failed")
        )),
    }
}
