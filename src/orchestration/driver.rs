//! # Operation Driver
//!
//! Background task that runs one operation's fan-out. It launches pending
//! sub-tasks in list order through the [`ConcurrencyController`], holds back
//! new launches while the operation is paused, stops launching on cancellation
//! or (with `continue_on_error = false`) on the first failure, drains the
//! workers already in flight, and asks the writer for the terminal transition.
//!
//! Driver-level errors and panics fail the whole operation; executor errors,
//! timeouts and panics only fail their own sub-task.

use crate::error::{BatchError, BatchResult};
use crate::logging::log_sub_task_outcome;
use crate::models::{OperationId, OperationRecord, OperationType, SubTaskErrorKind};
use crate::orchestration::concurrency::{ConcurrencyController, ConcurrencySlot};
use crate::orchestration::engine::EngineInner;
use crate::orchestration::executor::{
    ExecutionContext, ExecutorError, ImageOperationExecutor, ProgressReporter,
};
use crate::orchestration::writer::{OperationWriterHandle, SubTaskOutcome};
use crate::state_machine::OperationStatus;
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub(crate) struct OperationDriver {
    pub(crate) engine: Arc<EngineInner>,
    pub(crate) operation_id: OperationId,
    pub(crate) executor: Arc<dyn ImageOperationExecutor>,
    pub(crate) writer: OperationWriterHandle,
    pub(crate) cancellation: CancellationToken,
    /// Fired by the first failure when the operation does not continue on error
    pub(crate) abort: CancellationToken,
}

impl OperationDriver {
    pub(crate) async fn run(self) {
        let fan_out = AssertUnwindSafe(self.fan_out()).catch_unwind().await;

        let finished = match fan_out {
            Ok(Ok(())) => self.writer.finalize().await,
            Ok(Err(failure)) => {
                error!(operation_id = %self.operation_id, error = %failure, "Fan-out failed");
                self.writer.fail_orchestration(failure.to_string()).await
            }
            Err(panic) => {
                let message = format!("fan-out panicked: {}", panic_message(panic.as_ref()));
                error!(operation_id = %self.operation_id, error = %message, "Fan-out panicked");
                self.writer.fail_orchestration(message).await
            }
        };

        match finished {
            Ok(record) => self.engine.announce_terminal(&record).await,
            Err(failure) => {
                // The writer is gone; drop the registry entry so the id can be restarted
                error!(operation_id = %self.operation_id, error = %failure, "Operation could not be finalized");
                self.engine.registry.unregister(self.operation_id);
            }
        }
    }

    fn should_stop(&self) -> bool {
        self.cancellation.is_cancelled() || self.abort.is_cancelled()
    }

    async fn fan_out(&self) -> BatchResult<()> {
        let record = self.writer.begin_fan_out().await?;
        let controller = ConcurrencyController::new(record.max_parallel_operations);
        let configuration = Arc::new(record.configuration.clone());
        let timeout = self.engine.settings.sub_task_timeout();
        let mut snapshots = self.writer.subscribe();
        let mut workers = JoinSet::new();
        let mut first_error: Option<BatchError> = None;

        info!(
            operation_id = %self.operation_id,
            pending = record.pending_indices().len(),
            parallelism = controller.limit(),
            "Starting fan-out"
        );

        for index in record.pending_indices() {
            let Some(slot) = self.acquire_slot(&controller, &mut snapshots).await? else {
                break;
            };

            if let Err(failure) = self.writer.sub_task_started(index).await {
                first_error = Some(failure);
                self.abort.cancel();
                break;
            }

            let worker = SubTaskWorker {
                operation_id: self.operation_id,
                operation_type: record.operation_type,
                index,
                image_path: record.target_images[index].image_path.clone(),
                configuration: Arc::clone(&configuration),
                template_id: record.template_id.clone(),
                profile_id: record.profile_id.clone(),
                continue_on_error: record.continue_on_error,
                executor: Arc::clone(&self.executor),
                writer: self.writer.clone(),
                cancellation: self.cancellation.child_token(),
                abort: self.abort.clone(),
                timeout,
                slot,
            };
            workers.spawn(worker.run());

            while let Some(joined) = workers.try_join_next() {
                self.collect(joined, &mut first_error);
            }
        }

        while let Some(joined) = workers.join_next().await {
            self.collect(joined, &mut first_error);
        }

        debug!(
            operation_id = %self.operation_id,
            peak_concurrency = controller.peak(),
            cancelled = self.cancellation.is_cancelled(),
            aborted = self.abort.is_cancelled(),
            "Fan-out drained"
        );

        match first_error {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    /// Wait for a free slot while the operation is not paused
    ///
    /// `None` means the run stopped launching sub-tasks.
    async fn acquire_slot(
        &self,
        controller: &ConcurrencyController,
        snapshots: &mut watch::Receiver<OperationRecord>,
    ) -> BatchResult<Option<ConcurrencySlot>> {
        loop {
            if !self.wait_while_paused(snapshots).await {
                return Ok(None);
            }

            let acquired = tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => None,
                _ = self.abort.cancelled() => None,
                slot = controller.acquire() => Some(slot?),
            };
            let Some(slot) = acquired else {
                return Ok(None);
            };

            // Paused while waiting for the slot; give it back and wait again
            if snapshots.borrow().status == OperationStatus::Paused {
                drop(slot);
                continue;
            }
            if self.should_stop() {
                return Ok(None);
            }
            return Ok(Some(slot));
        }
    }

    /// Returns `false` when the run should stop launching
    async fn wait_while_paused(&self, snapshots: &mut watch::Receiver<OperationRecord>) -> bool {
        loop {
            if self.should_stop() {
                return false;
            }
            if snapshots.borrow_and_update().status != OperationStatus::Paused {
                return true;
            }

            tokio::select! {
                _ = self.cancellation.cancelled() => return false,
                _ = self.abort.cancelled() => return false,
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
            }
        }
    }

    fn collect(
        &self,
        joined: Result<BatchResult<()>, JoinError>,
        first_error: &mut Option<BatchError>,
    ) {
        let failure = match joined {
            Ok(Ok(())) => return,
            Ok(Err(failure)) => failure,
            Err(join_error) => {
                BatchError::Orchestration(format!("sub-task worker did not finish: {join_error}"))
            }
        };

        warn!(operation_id = %self.operation_id, error = %failure, "Sub-task worker failed");
        self.abort.cancel();
        first_error.get_or_insert(failure);
    }
}

/// Runs the executor for one image while holding a concurrency slot
struct SubTaskWorker {
    operation_id: OperationId,
    operation_type: OperationType,
    index: usize,
    image_path: String,
    configuration: Arc<Value>,
    template_id: Option<String>,
    profile_id: Option<String>,
    continue_on_error: bool,
    executor: Arc<dyn ImageOperationExecutor>,
    writer: OperationWriterHandle,
    cancellation: CancellationToken,
    abort: CancellationToken,
    timeout: Option<Duration>,
    slot: ConcurrencySlot,
}

impl SubTaskWorker {
    async fn run(self) -> BatchResult<()> {
        let _slot = self.slot;
        let context = ExecutionContext {
            operation_id: self.operation_id,
            operation_type: self.operation_type,
            image_path: self.image_path,
            configuration: self.configuration,
            template_id: self.template_id,
            profile_id: self.profile_id,
            cancellation: self.cancellation.clone(),
            progress: ProgressReporter::new(self.index, self.writer.clone()),
        };

        let outcome = invoke_executor(self.executor.as_ref(), context, self.timeout).await;
        if matches!(outcome, SubTaskOutcome::Failed { .. }) && !self.continue_on_error {
            self.abort.cancel();
        }
        // Stop a timed-out executor's spawned work, if it watches the token
        self.cancellation.cancel();

        let record = self.writer.sub_task_finished(self.index, outcome).await?;
        if let Ok(sub_task) = record.sub_task(self.index) {
            log_sub_task_outcome(record.id, self.index, sub_task);
        }
        Ok(())
    }
}

/// Run the executor with the per-image timeout and panic isolation
pub(crate) async fn invoke_executor(
    executor: &dyn ImageOperationExecutor,
    context: ExecutionContext,
    timeout: Option<Duration>,
) -> SubTaskOutcome {
    let execution = AssertUnwindSafe(executor.execute(context)).catch_unwind();

    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, execution).await {
            Ok(result) => result,
            Err(_) => {
                return SubTaskOutcome::Failed {
                    kind: SubTaskErrorKind::Timeout,
                    message: format!("image operation timed out after {limit:?}"),
                }
            }
        },
        None => execution.await,
    };

    match result {
        Ok(Ok(())) => SubTaskOutcome::Succeeded,
        Ok(Err(ExecutorError::Cancelled)) => SubTaskOutcome::Cancelled,
        Ok(Err(ExecutorError::Failed(message))) => SubTaskOutcome::Failed {
            kind: SubTaskErrorKind::ExecutorFailure,
            message,
        },
        Err(panic) => SubTaskOutcome::Failed {
            kind: SubTaskErrorKind::Panicked,
            message: format!("image operation panicked: {}", panic_message(panic.as_ref())),
        },
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
