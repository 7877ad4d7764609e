//! # Operation Writer
//!
//! Single-writer actor owning the authoritative in-memory copy of one active
//! operation. Sub-task workers, the driver and control requests never touch
//! the record directly; they send [`WriterCommand`]s and the actor applies
//! them one at a time. After each mutation it refreshes the derived fields,
//! writes a whole-document snapshot and publishes the record on a `watch`
//! channel, so concurrent sub-task completions can no longer overwrite each
//! other's updates.
//!
//! Snapshot write failures are logged and the in-memory record stays
//! authoritative. With `strict_persistence` the failure is also returned to the
//! sender, which lets the driver fail the operation instead.

use crate::error::{BatchError, BatchResult};
use crate::logging::log_persistence_failure;
use crate::models::{OperationId, OperationRecord, SubTaskErrorKind};
use crate::orchestration::aggregator;
use crate::persistence::OperationStore;
use crate::state_machine::{
    OperationEvent, OperationStateMachine, StateMachineError, SubTaskEvent, SubTaskStateMachine,
    SubTaskStatus,
};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

/// How a launched sub-task ended
#[derive(Debug, Clone, PartialEq)]
pub enum SubTaskOutcome {
    Succeeded,
    Failed {
        kind: SubTaskErrorKind,
        message: String,
    },
    Cancelled,
}

impl SubTaskOutcome {
    fn into_event(self) -> SubTaskEvent {
        match self {
            Self::Succeeded => SubTaskEvent::Complete,
            Self::Failed { kind, message } => SubTaskEvent::fail_with_error(kind, message),
            Self::Cancelled => SubTaskEvent::Cancel,
        }
    }
}

type Reply = oneshot::Sender<BatchResult<OperationRecord>>;

/// Runs once, after the terminal snapshot is persisted and before it is published
pub type TerminalHook = Box<dyn FnOnce(OperationId) + Send + 'static>;

#[derive(Debug)]
enum WriterCommand {
    BeginFanOut { reply: Reply },
    Pause { reply: Reply },
    Resume { reply: Reply },
    RequestCancel { reply: Reply },
    SubTaskStarted { index: usize, reply: Reply },
    SubTaskProgress { index: usize, percentage: f64 },
    SubTaskFinished {
        index: usize,
        outcome: SubTaskOutcome,
        reply: Reply,
    },
    Finalize { reply: Reply },
    FailOrchestration { message: String, reply: Reply },
}

#[derive(Debug, Clone)]
pub struct WriterOptions {
    pub channel_capacity: usize,
    pub strict_persistence: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            strict_persistence: false,
        }
    }
}

pub struct OperationWriter {
    record: OperationRecord,
    store: Arc<dyn OperationStore>,
    snapshots: watch::Sender<OperationRecord>,
    receiver: mpsc::Receiver<WriterCommand>,
    strict_persistence: bool,
    on_terminal: Option<TerminalHook>,
}

impl OperationWriter {
    /// Spawn the actor for `record` and return a handle to it
    pub fn spawn(
        record: OperationRecord,
        store: Arc<dyn OperationStore>,
        options: WriterOptions,
        on_terminal: TerminalHook,
    ) -> OperationWriterHandle {
        let operation_id = record.id;
        let (sender, receiver) = mpsc::channel(options.channel_capacity.max(1));
        let (snapshots, snapshot_rx) = watch::channel(record.clone());

        let writer = Self {
            record,
            store,
            snapshots,
            receiver,
            strict_persistence: options.strict_persistence,
            on_terminal: Some(on_terminal),
        };
        tokio::spawn(writer.run());

        OperationWriterHandle {
            operation_id,
            sender,
            snapshots: snapshot_rx,
        }
    }

    async fn run(mut self) {
        while let Some(command) = self.receiver.recv().await {
            let stop = matches!(
                command,
                WriterCommand::Finalize { .. } | WriterCommand::FailOrchestration { .. }
            );
            self.handle(command).await;
            if stop {
                break;
            }
        }
        debug!(operation_id = %self.record.id, status = %self.record.status, "Operation writer stopped");
    }

    async fn handle(&mut self, command: WriterCommand) {
        match command {
            WriterCommand::BeginFanOut { reply } => {
                let result = self
                    .apply_operation_event(OperationEvent::BeginFanOut, "begin fan-out")
                    .await;
                let _ = reply.send(result);
            }
            WriterCommand::Pause { reply } => {
                let result = self.apply_operation_event(OperationEvent::Pause, "pause").await;
                let _ = reply.send(result);
            }
            WriterCommand::Resume { reply } => {
                let result = self
                    .apply_operation_event(OperationEvent::Resume, "resume")
                    .await;
                let _ = reply.send(result);
            }
            WriterCommand::RequestCancel { reply } => {
                let result = self.request_cancel().await;
                let _ = reply.send(result);
            }
            WriterCommand::SubTaskStarted { index, reply } => {
                let result = self.apply_sub_task_event(index, SubTaskEvent::Start).await;
                let _ = reply.send(result);
            }
            WriterCommand::SubTaskProgress { index, percentage } => {
                self.update_progress(index, percentage).await;
            }
            WriterCommand::SubTaskFinished {
                index,
                outcome,
                reply,
            } => {
                let result = self.apply_sub_task_event(index, outcome.into_event()).await;
                let _ = reply.send(result);
            }
            WriterCommand::Finalize { reply } => {
                let record = self.finalize(None).await;
                let _ = reply.send(Ok(record));
            }
            WriterCommand::FailOrchestration { message, reply } => {
                let record = self.finalize(Some(message)).await;
                let _ = reply.send(Ok(record));
            }
        }
    }

    async fn apply_operation_event(
        &mut self,
        event: OperationEvent,
        action: &'static str,
    ) -> BatchResult<OperationRecord> {
        OperationStateMachine::transition(&mut self.record, event, Utc::now()).map_err(|err| {
            match err {
                StateMachineError::InvalidTransition { .. } => {
                    BatchError::invalid_state(self.record.id, self.record.status, action)
                }
                other => other.into(),
            }
        })?;
        self.commit().await?;
        Ok(self.record.clone())
    }

    async fn apply_sub_task_event(
        &mut self,
        index: usize,
        event: SubTaskEvent,
    ) -> BatchResult<OperationRecord> {
        if self.record.is_terminal() {
            return Err(BatchError::invalid_state(
                self.record.id,
                self.record.status,
                "update a sub-task",
            ));
        }

        let sub_task = self.record.sub_task_mut(index)?;
        SubTaskStateMachine::transition(sub_task, event, Utc::now())?;
        self.commit().await?;
        Ok(self.record.clone())
    }

    async fn request_cancel(&mut self) -> BatchResult<OperationRecord> {
        if self.record.is_terminal() {
            return Err(BatchError::invalid_state(
                self.record.id,
                self.record.status,
                "cancel",
            ));
        }
        if self.record.cancel_requested_at.is_none() {
            self.record.cancel_requested_at = Some(Utc::now());
            self.commit().await?;
        }
        Ok(self.record.clone())
    }

    async fn update_progress(&mut self, index: usize, percentage: f64) {
        let Ok(sub_task) = self.record.sub_task_mut(index) else {
            return;
        };
        if sub_task.status != SubTaskStatus::Running || !percentage.is_finite() {
            return;
        }

        let clamped = percentage.clamp(0.0, 100.0);
        if clamped <= sub_task.progress_percentage {
            return;
        }
        sub_task.progress_percentage = aggregator::round2(clamped);

        if let Err(error) = self.commit().await {
            debug!(operation_id = %self.record.id, error = %error, "Progress snapshot not persisted");
        }
    }

    /// Close out every unfinished sub-task and apply the terminal transition
    ///
    /// `failure` carries a driver-level error; without it the terminal status
    /// is derived from the sub-tasks.
    async fn finalize(&mut self, failure: Option<String>) -> OperationRecord {
        if self.record.is_terminal() {
            return self.record.clone();
        }

        let now = Utc::now();
        let cancelled = self.record.cancel_requested_at.is_some();

        // Sub-tasks the fan-out never reached
        let leftover = if cancelled && failure.is_none() {
            SubTaskEvent::Cancel
        } else {
            SubTaskEvent::Skip
        };
        for index in self.record.pending_indices() {
            if let Ok(sub_task) = self.record.sub_task_mut(index) {
                if let Err(error) = SubTaskStateMachine::transition(sub_task, leftover.clone(), now)
                {
                    warn!(operation_id = %self.record.id, index, error = %error, "Could not close out pending sub-task");
                }
            }
        }

        // Anything still running lost its worker
        let stranded = match &failure {
            Some(message) => SubTaskEvent::fail_with_error(
                SubTaskErrorKind::Orchestration,
                message.clone(),
            ),
            None => SubTaskEvent::Cancel,
        };
        for index in self.record.indices_with_status(SubTaskStatus::Running) {
            if let Ok(sub_task) = self.record.sub_task_mut(index) {
                if let Err(error) = SubTaskStateMachine::transition(sub_task, stranded.clone(), now)
                {
                    warn!(operation_id = %self.record.id, index, error = %error, "Could not close out running sub-task");
                }
            }
        }

        aggregator::refresh_derived_fields(&mut self.record);
        let event = match failure {
            Some(message) => OperationEvent::fail_with_error(message),
            None => aggregator::final_event(&self.record),
        };
        if let Err(error) = OperationStateMachine::transition(&mut self.record, event, now) {
            warn!(operation_id = %self.record.id, error = %error, "Terminal transition rejected");
        }

        if let Err(error) = self.store.save_snapshot(&self.record).await {
            log_persistence_failure(self.record.id, "finalize", &error.to_string());
        }

        if let Some(hook) = self.on_terminal.take() {
            hook(self.record.id);
        }
        self.snapshots.send_replace(self.record.clone());
        self.record.clone()
    }

    /// Refresh derived fields, persist and publish
    async fn commit(&mut self) -> BatchResult<()> {
        aggregator::refresh_derived_fields(&mut self.record);
        let persisted = self.store.save_snapshot(&self.record).await;
        self.snapshots.send_replace(self.record.clone());

        match persisted {
            Ok(()) => Ok(()),
            Err(error) => {
                log_persistence_failure(self.record.id, "snapshot", &error.to_string());
                if self.strict_persistence {
                    Err(error.into())
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Cloneable sender side of an [`OperationWriter`]
#[derive(Debug, Clone)]
pub struct OperationWriterHandle {
    operation_id: OperationId,
    sender: mpsc::Sender<WriterCommand>,
    snapshots: watch::Receiver<OperationRecord>,
}

impl OperationWriterHandle {
    pub fn operation_id(&self) -> OperationId {
        self.operation_id
    }

    /// Latest published record
    pub fn snapshot(&self) -> OperationRecord {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<OperationRecord> {
        self.snapshots.clone()
    }

    async fn request(
        &self,
        action: &'static str,
        command: impl FnOnce(Reply) -> WriterCommand,
    ) -> BatchResult<OperationRecord> {
        let (reply, response) = oneshot::channel();
        if self.sender.send(command(reply)).await.is_err() {
            return Err(self.writer_stopped(action));
        }
        response.await.map_err(|_| self.writer_stopped(action))?
    }

    fn writer_stopped(&self, action: &'static str) -> BatchError {
        let status = self.snapshots.borrow().status;
        if status.is_terminal() {
            BatchError::invalid_state(self.operation_id, status, action)
        } else {
            BatchError::Orchestration(format!(
                "writer for operation {} stopped",
                self.operation_id
            ))
        }
    }

    pub async fn begin_fan_out(&self) -> BatchResult<OperationRecord> {
        self.request("begin fan-out", |reply| WriterCommand::BeginFanOut { reply })
            .await
    }

    pub async fn pause(&self) -> BatchResult<OperationRecord> {
        self.request("pause", |reply| WriterCommand::Pause { reply })
            .await
    }

    pub async fn resume(&self) -> BatchResult<OperationRecord> {
        self.request("resume", |reply| WriterCommand::Resume { reply })
            .await
    }

    pub async fn request_cancel(&self) -> BatchResult<OperationRecord> {
        self.request("cancel", |reply| WriterCommand::RequestCancel { reply })
            .await
    }

    pub async fn sub_task_started(&self, index: usize) -> BatchResult<OperationRecord> {
        self.request("start a sub-task", |reply| WriterCommand::SubTaskStarted {
            index,
            reply,
        })
        .await
    }

    /// Best-effort; dropped silently once the writer has stopped
    pub async fn report_progress(&self, index: usize, percentage: f64) {
        let _ = self
            .sender
            .send(WriterCommand::SubTaskProgress { index, percentage })
            .await;
    }

    pub async fn sub_task_finished(
        &self,
        index: usize,
        outcome: SubTaskOutcome,
    ) -> BatchResult<OperationRecord> {
        self.request("finish a sub-task", |reply| WriterCommand::SubTaskFinished {
            index,
            outcome,
            reply,
        })
        .await
    }

    pub async fn finalize(&self) -> BatchResult<OperationRecord> {
        self.request("finalize", |reply| WriterCommand::Finalize { reply })
            .await
    }

    pub async fn fail_orchestration(
        &self,
        message: impl Into<String>,
    ) -> BatchResult<OperationRecord> {
        let message = message.into();
        self.request("fail", |reply| WriterCommand::FailOrchestration {
            message,
            reply,
        })
        .await
    }
}
