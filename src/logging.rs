//! # Structured Logging Module
//!
//! `tracing` subscriber setup plus helpers that give lifecycle, sub-task and
//! persistence records a uniform field layout.

use crate::config::{LogFormat, LoggingConfig};
use crate::models::{OperationId, SubTask};
use crate::state_machine::OperationStatus;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Install the global subscriber once per process
///
/// `RUST_LOG` overrides `config.level`. If another global subscriber is already
/// installed (an embedding host, a test harness) it is left in place.
pub fn init_structured_logging(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

        let layer = match config.format {
            LogFormat::Pretty => fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .boxed(),
            LogFormat::Json => fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_current_span(true)
                .boxed(),
        };

        let subscriber = tracing_subscriber::registry().with(layer.with_filter(filter));

        if subscriber.try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
            return;
        }

        tracing::info!(
            level = %config.level,
            format = ?config.format,
            version = crate::constants::system::IMAGEBATCH_CORE_VERSION,
            "Structured logging initialized"
        );
    });
}

/// Log an operation lifecycle step
pub fn log_operation_lifecycle(
    event_name: &str,
    operation_id: OperationId,
    status: OperationStatus,
    details: Option<&str>,
) {
    tracing::info!(
        event = %event_name,
        operation_id = %operation_id,
        status = %status,
        details = details,
        "OPERATION_LIFECYCLE"
    );
}

/// Log the terminal outcome of one sub-task
pub fn log_sub_task_outcome(operation_id: OperationId, index: usize, sub_task: &SubTask) {
    if sub_task.error_message.is_some() {
        tracing::warn!(
            operation_id = %operation_id,
            index = index,
            image_path = %sub_task.image_path,
            status = %sub_task.status,
            error_kind = ?sub_task.error_kind,
            error = sub_task.error_message.as_deref(),
            duration_ms = sub_task.duration_ms,
            "SUB_TASK_OUTCOME"
        );
    } else {
        tracing::info!(
            operation_id = %operation_id,
            index = index,
            image_path = %sub_task.image_path,
            status = %sub_task.status,
            duration_ms = sub_task.duration_ms,
            "SUB_TASK_OUTCOME"
        );
    }
}

/// Log a snapshot write that did not reach storage
pub fn log_persistence_failure(operation_id: OperationId, stage: &str, error: &str) {
    tracing::error!(
        operation_id = %operation_id,
        stage = %stage,
        error = %error,
        "PERSISTENCE_FAILURE: in-memory record remains authoritative"
    );
}
