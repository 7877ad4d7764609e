//! # Batch Engine
//!
//! Public entry point for batch operations: create, start, pause, resume,
//! cancel, retry, delete, query and observe.
//!
//! ## Overview
//!
//! Control requests for one operation id are serialized by a per-id lifecycle
//! lock, so `start` racing `delete` or two concurrent `start`s cannot both win.
//! Operations that are Queued, Running or Paused live in the
//! [`ActiveRegistry`]; requests for them go to the operation's writer actor.
//! Everything else is read from and written to the [`OperationStore`].
//!
//! Each started operation gets a driver task (see `driver.rs`) whose join
//! handle is attached to its registry entry, so [`BatchEngine::shutdown`] can
//! wait for, cancel or abandon in-flight work explicitly.
//!
//! ## Example
//!
//! ```rust,no_run
//! use imagebatch_core::config::EngineConfig;
//! use imagebatch_core::models::{CreateOperationRequest, OperationType};
//! use imagebatch_core::orchestration::{BatchEngine, ImageOperationExecutor};
//! use std::sync::Arc;
//!
//! # async fn example(debloat: Arc<dyn ImageOperationExecutor>) -> Result<(), Box<dyn std::error::Error>> {
//! let engine = BatchEngine::builder(EngineConfig::default())
//!     .with_executor(OperationType::Debloat, debloat)
//!     .build()
//!     .await?;
//!
//! let request = CreateOperationRequest::new(
//!     "Quarterly debloat",
//!     OperationType::Debloat,
//!     ["D:/images/win11-pro.wim", "D:/images/win11-ent.wim"],
//! )
//! .with_max_parallel_operations(2)
//! .start_immediately();
//!
//! let record = engine.create(request).await?;
//! let finished = engine.wait_for_completion(record.id).await?;
//! println!("{} finished as {}", finished.name, finished.status);
//! # Ok(())
//! # }
//! ```

use crate::config::{EngineConfig, EngineSettings, QueryConfig};
use crate::constants::events;
use crate::error::{BatchError, BatchResult};
use crate::events::{
    AuditEntry, AuditSink, EventPublisher, NotificationDispatcher, OperationNotification,
    TracingAuditSink,
};
use crate::logging::log_operation_lifecycle;
use crate::models::{CreateOperationRequest, OperationId, OperationRecord, OperationType};
use crate::orchestration::aggregator;
use crate::orchestration::driver::OperationDriver;
use crate::orchestration::executor::{ExecutorRegistry, ImageOperationExecutor};
use crate::orchestration::registry::{ActiveOperation, ActiveRegistry};
use crate::orchestration::writer::{OperationWriter, WriterOptions};
use crate::persistence::{FileOperationStore, OperationStore};
use crate::query::{OperationPage, OperationQuery};
use crate::state_machine::{
    OperationEvent, OperationStateMachine, OperationStatus, SubTaskEvent, SubTaskStateMachine,
    SubTaskStatus,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// What [`BatchEngine::shutdown`] does with operations still in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Wait for every active operation to finish on its own
    Drain,
    /// Cancel every active operation, then wait for the drain
    Cancel,
    /// Stop driver tasks immediately; records stay active on disk and are
    /// picked up by [`BatchEngine::recover_interrupted_operations`]
    Abandon,
}

pub(crate) struct EngineInner {
    pub(crate) settings: EngineSettings,
    pub(crate) query_config: QueryConfig,
    pub(crate) store: Arc<dyn OperationStore>,
    pub(crate) executors: ExecutorRegistry,
    pub(crate) audit: Arc<dyn AuditSink>,
    pub(crate) notifier: Arc<dyn NotificationDispatcher>,
    pub(crate) registry: Arc<ActiveRegistry>,
    lifecycle_locks: DashMap<OperationId, Arc<Mutex<()>>>,
    shutting_down: AtomicBool,
}

/// Holds one operation's lifecycle lock; drops the map entry when nobody
/// else holds or waits for it
pub(crate) struct LifecycleGuard<'a> {
    locks: &'a DashMap<OperationId, Arc<Mutex<()>>>,
    operation_id: OperationId,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for LifecycleGuard<'_> {
    fn drop(&mut self) {
        // One reference in the map plus the one inside this guard
        self.locks
            .remove_if(&self.operation_id, |_, lock| Arc::strong_count(lock) == 2);
    }
}

impl EngineInner {
    async fn lock(&self, id: OperationId) -> LifecycleGuard<'_> {
        let lock = self
            .lifecycle_locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        LifecycleGuard {
            locks: &self.lifecycle_locks,
            operation_id: id,
            _guard: lock.lock_owned().await,
        }
    }

    /// Best-effort audit; failures and timeouts are only logged
    async fn audit(&self, action: &str, record: &OperationRecord, description: String) {
        let entry = AuditEntry::for_operation(action, record, description);
        match tokio::time::timeout(self.settings.audit_timeout(), self.audit.record(entry)).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                warn!(operation_id = %record.id, action, error = %error, "Audit sink rejected entry")
            }
            Err(_) => warn!(operation_id = %record.id, action, "Audit sink timed out"),
        }
    }

    /// Best-effort notification; failures and timeouts are only logged
    async fn notify(&self, event_name: &str, record: &OperationRecord) {
        let notification = OperationNotification::from_record(event_name, record);
        match tokio::time::timeout(
            self.settings.notification_timeout(),
            self.notifier.dispatch(notification),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                warn!(operation_id = %record.id, event_name, error = %error, "Notification dispatch failed")
            }
            Err(_) => warn!(operation_id = %record.id, event_name, "Notification dispatch timed out"),
        }
    }

    /// Log, audit and notify one lifecycle step
    async fn announce(&self, event_name: &str, record: &OperationRecord, description: String) {
        log_operation_lifecycle(event_name, record.id, record.status, Some(&description));
        self.audit(event_name, record, description).await;
        self.notify(event_name, record).await;
    }

    pub(crate) async fn announce_terminal(&self, record: &OperationRecord) {
        let event_name = terminal_event_name(record.status);
        let description = match &record.error_message {
            Some(error) => format!("Operation '{}' ended {}: {error}", record.name, record.status),
            None => format!(
                "Operation '{}' ended {}: {}/{} images succeeded",
                record.name,
                record.status,
                record.summary.successful_images,
                record.summary.total_images
            ),
        };
        self.announce(event_name, record, description).await;
    }
}

fn terminal_event_name(status: OperationStatus) -> &'static str {
    match status {
        OperationStatus::Completed => events::OPERATION_COMPLETED,
        OperationStatus::CompletedWithErrors => events::OPERATION_COMPLETED_WITH_ERRORS,
        OperationStatus::Failed => events::OPERATION_FAILED,
        _ => events::OPERATION_CANCELLED,
    }
}

/// Return an interrupted record to Pending so it can run again
///
/// Sub-tasks that were Running when the previous process stopped go back to
/// Pending; finished ones keep their outcome.
fn reset_interrupted(record: &mut OperationRecord, at: DateTime<Utc>) -> BatchResult<()> {
    for index in record.indices_with_status(SubTaskStatus::Running) {
        SubTaskStateMachine::transition(record.sub_task_mut(index)?, SubTaskEvent::Interrupt, at)?;
    }
    OperationStateMachine::transition(record, OperationEvent::Interrupt, at)?;
    aggregator::refresh_derived_fields(record);
    Ok(())
}

/// Cancel a record that has no live driver
fn cancel_inactive(record: &mut OperationRecord, at: DateTime<Utc>) -> BatchResult<()> {
    for index in 0..record.target_images.len() {
        let sub_task = record.sub_task_mut(index)?;
        if matches!(sub_task.status, SubTaskStatus::Pending | SubTaskStatus::Running) {
            SubTaskStateMachine::transition(sub_task, SubTaskEvent::Cancel, at)?;
        }
    }
    record.cancel_requested_at.get_or_insert(at);
    aggregator::refresh_derived_fields(record);
    OperationStateMachine::transition(record, OperationEvent::Cancel, at)?;
    Ok(())
}

/// Builder for [`BatchEngine`]
pub struct BatchEngineBuilder {
    config: EngineConfig,
    store: Option<Arc<dyn OperationStore>>,
    executors: ExecutorRegistry,
    audit: Option<Arc<dyn AuditSink>>,
    notifier: Option<Arc<dyn NotificationDispatcher>>,
}

impl BatchEngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            store: None,
            executors: ExecutorRegistry::new(),
            audit: None,
            notifier: None,
        }
    }

    /// Defaults to a [`FileOperationStore`] in `engine.storage_dir`
    pub fn with_store(mut self, store: Arc<dyn OperationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_executor(
        self,
        operation_type: OperationType,
        executor: Arc<dyn ImageOperationExecutor>,
    ) -> Self {
        self.executors.register(operation_type, executor);
        self
    }

    pub fn with_executor_registry(mut self, executors: ExecutorRegistry) -> Self {
        self.executors = executors;
        self
    }

    /// Defaults to [`TracingAuditSink`]
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Defaults to an [`EventPublisher`] nobody subscribes to
    pub fn with_notification_dispatcher(mut self, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Route notifications to `publisher`; keep a clone to subscribe
    pub fn with_event_publisher(self, publisher: EventPublisher) -> Self {
        self.with_notification_dispatcher(Arc::new(publisher))
    }

    pub async fn build(self) -> BatchResult<BatchEngine> {
        self.config.validate()?;
        let EngineConfig { engine, query, .. } = self.config;

        let store = match self.store {
            Some(store) => store,
            None => Arc::new(FileOperationStore::open(&engine.storage_dir).await?),
        };

        info!(
            registered_types = ?self.executors.registered_types(),
            default_parallelism = engine.default_max_parallel_operations,
            "Batch engine ready"
        );

        Ok(BatchEngine {
            inner: Arc::new(EngineInner {
                settings: engine,
                query_config: query,
                store,
                executors: self.executors,
                audit: self.audit.unwrap_or_else(|| Arc::new(TracingAuditSink)),
                notifier: self
                    .notifier
                    .unwrap_or_else(|| Arc::new(EventPublisher::default())),
                registry: Arc::new(ActiveRegistry::new()),
                lifecycle_locks: DashMap::new(),
                shutting_down: AtomicBool::new(false),
            }),
        })
    }
}

/// Batch operation engine; cheap to clone
#[derive(Clone)]
pub struct BatchEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for BatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchEngine")
            .field("store", &self.inner.store)
            .field("executors", &self.inner.executors)
            .field("active", &self.inner.registry.len())
            .finish()
    }
}

impl BatchEngine {
    pub fn builder(config: EngineConfig) -> BatchEngineBuilder {
        BatchEngineBuilder::new(config)
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    pub fn executors(&self) -> &ExecutorRegistry {
        &self.inner.executors
    }

    /// Validate and persist a new Pending operation, starting it if requested
    #[instrument(skip(self, request), fields(name = %request.name, operation_type = %request.operation_type))]
    pub async fn create(&self, request: CreateOperationRequest) -> BatchResult<OperationRecord> {
        let settings = &self.inner.settings;
        request.validate(settings.max_parallel_operations_limit)?;
        self.inner.executors.resolve(request.operation_type)?;
        if request.start_immediately && self.is_shutting_down() {
            return Err(BatchError::ShuttingDown);
        }

        let start_immediately = request.start_immediately;
        let record = OperationRecord::from_request(request, settings.default_max_parallel_operations);
        self.inner.store.create(&record).await?;

        self.inner
            .announce(
                events::OPERATION_CREATED,
                &record,
                format!(
                    "Created operation '{}' over {} images",
                    record.name, record.summary.total_images
                ),
            )
            .await;

        if start_immediately {
            return self.start(record.id).await;
        }
        Ok(record)
    }

    /// Start a Pending operation, or resume one that is Paused
    #[instrument(skip(self), fields(operation_id = %id))]
    pub async fn start(&self, id: OperationId) -> BatchResult<OperationRecord> {
        let _guard = self.inner.lock(id).await;
        self.start_locked(id).await
    }

    async fn start_locked(&self, id: OperationId) -> BatchResult<OperationRecord> {
        if self.is_shutting_down() {
            return Err(BatchError::ShuttingDown);
        }

        if let Some(active) = self.inner.registry.get(id) {
            let snapshot = active.snapshot();
            if snapshot.status == OperationStatus::Paused {
                return self.resume_active(&active).await;
            }
            return Err(BatchError::invalid_state(id, snapshot.status, "start"));
        }

        let mut record = self.inner.store.load(id).await?;

        // Left active by a process that stopped mid-run
        if record.status.is_active() {
            reset_interrupted(&mut record, Utc::now())?;
        }
        self.launch(record, None).await
    }

    /// Enqueue an inactive record and spawn its writer and driver
    ///
    /// Every check runs before the first write, so a rejected launch leaves
    /// the stored record untouched. `retried` carries the number of failed
    /// images a retry reset in memory.
    async fn launch(
        &self,
        mut record: OperationRecord,
        retried: Option<usize>,
    ) -> BatchResult<OperationRecord> {
        let id = record.id;
        if self.is_shutting_down() {
            return Err(BatchError::ShuttingDown);
        }
        if !record.status.is_startable() {
            return Err(BatchError::invalid_state(id, record.status, "start"));
        }
        let executor = self.inner.executors.resolve(record.operation_type)?;

        OperationStateMachine::transition(&mut record, OperationEvent::Enqueue, Utc::now())?;
        aggregator::refresh_derived_fields(&mut record);
        self.inner.store.save_snapshot(&record).await?;

        let registry = Arc::clone(&self.inner.registry);
        let writer = OperationWriter::spawn(
            record.clone(),
            Arc::clone(&self.inner.store),
            WriterOptions {
                channel_capacity: self.inner.settings.writer_channel_capacity,
                strict_persistence: self.inner.settings.fail_on_persistence_error,
            },
            Box::new(move |operation_id| {
                registry.unregister(operation_id);
            }),
        );
        let cancellation = CancellationToken::new();
        let active = self
            .inner
            .registry
            .register(ActiveOperation::new(writer.clone(), cancellation.clone()))?;

        let driver = OperationDriver {
            engine: Arc::clone(&self.inner),
            operation_id: id,
            executor,
            writer,
            cancellation,
            abort: CancellationToken::new(),
        };
        active.attach_driver(tokio::spawn(driver.run()));

        if let Some(failed) = retried {
            self.inner
                .announce(
                    events::OPERATION_RETRY_REQUESTED,
                    &record,
                    format!("Retrying {failed} failed images of '{}'", record.name),
                )
                .await;
        }
        self.inner
            .announce(
                events::OPERATION_STARTED,
                &record,
                format!(
                    "Started run {} of '{}' with {} pending images",
                    record.run_count,
                    record.name,
                    record.pending_indices().len()
                ),
            )
            .await;
        Ok(record)
    }

    /// Stop launching new sub-tasks; in-flight ones run to completion
    #[instrument(skip(self), fields(operation_id = %id))]
    pub async fn pause(&self, id: OperationId) -> BatchResult<OperationRecord> {
        let _guard = self.inner.lock(id).await;
        let active = self.require_active(id, "pause").await?;
        let record = active.writer.pause().await?;

        self.inner
            .announce(
                events::OPERATION_PAUSED,
                &record,
                format!("Paused '{}' at {}%", record.name, record.progress_percentage),
            )
            .await;
        Ok(record)
    }

    #[instrument(skip(self), fields(operation_id = %id))]
    pub async fn resume(&self, id: OperationId) -> BatchResult<OperationRecord> {
        let _guard = self.inner.lock(id).await;
        let active = self.require_active(id, "resume").await?;
        self.resume_active(&active).await
    }

    /// Registry entry for `id`; InvalidState with the stored status otherwise
    async fn require_active(
        &self,
        id: OperationId,
        action: &'static str,
    ) -> BatchResult<Arc<ActiveOperation>> {
        if let Some(active) = self.inner.registry.get(id) {
            return Ok(active);
        }
        let record = self.inner.store.load(id).await?;
        Err(BatchError::invalid_state(id, record.status, action))
    }

    async fn resume_active(&self, active: &ActiveOperation) -> BatchResult<OperationRecord> {
        let record = active.writer.resume().await?;
        self.inner
            .announce(
                events::OPERATION_RESUMED,
                &record,
                format!("Resumed '{}'", record.name),
            )
            .await;
        Ok(record)
    }

    /// Cancel a non-terminal operation
    ///
    /// Active operations stop launching sub-tasks, drain the in-flight ones and
    /// end Cancelled; the returned record carries `cancel_requested_at`. An
    /// inactive Pending operation is cancelled on the spot. Cancelling an
    /// already Cancelled operation is a no-op.
    #[instrument(skip(self), fields(operation_id = %id))]
    pub async fn cancel(&self, id: OperationId) -> BatchResult<OperationRecord> {
        let _guard = self.inner.lock(id).await;

        if let Some(active) = self.inner.registry.get(id) {
            let snapshot = active.snapshot();
            if snapshot.cancel_requested_at.is_some() {
                return Ok(snapshot);
            }

            let record = match active.writer.request_cancel().await {
                Ok(record) => record,
                Err(BatchError::InvalidState {
                    current: OperationStatus::Cancelled,
                    ..
                }) => return Ok(active.snapshot()),
                Err(error) => return Err(error),
            };
            active.cancellation.cancel();

            self.inner
                .announce(
                    events::OPERATION_CANCEL_REQUESTED,
                    &record,
                    format!("Cancellation requested for '{}'", record.name),
                )
                .await;
            return Ok(record);
        }

        let mut record = self.inner.store.load(id).await?;
        match record.status {
            OperationStatus::Cancelled => Ok(record),
            status if status.is_terminal() => Err(BatchError::invalid_state(id, status, "cancel")),
            _ => {
                cancel_inactive(&mut record, Utc::now())?;
                self.inner.store.save_snapshot(&record).await?;
                self.inner.announce_terminal(&record).await;
                Ok(record)
            }
        }
    }

    /// Re-run only the failed images of a terminal operation
    #[instrument(skip(self), fields(operation_id = %id))]
    pub async fn retry_failed_images(&self, id: OperationId) -> BatchResult<OperationRecord> {
        let _guard = self.inner.lock(id).await;

        if let Some(active) = self.inner.registry.get(id) {
            return Err(BatchError::invalid_state(
                id,
                active.snapshot().status,
                "retry failed images",
            ));
        }

        let mut record = self.inner.store.load(id).await?;
        if !record.is_terminal() {
            return Err(BatchError::invalid_state(
                id,
                record.status,
                "retry failed images",
            ));
        }

        let failed = record.indices_with_status(SubTaskStatus::Failed);
        if failed.is_empty() {
            return Err(BatchError::Validation(format!(
                "operation {id} has no failed images to retry"
            )));
        }

        let now = Utc::now();
        for &index in &failed {
            SubTaskStateMachine::transition(record.sub_task_mut(index)?, SubTaskEvent::Reset, now)?;
        }
        OperationStateMachine::transition(&mut record, OperationEvent::Reset, now)?;
        aggregator::refresh_derived_fields(&mut record);

        // The reset is persisted together with the enqueue, or not at all
        self.launch(record, Some(failed.len())).await
    }

    /// Delete a stored operation; active operations must be cancelled first
    #[instrument(skip(self), fields(operation_id = %id))]
    pub async fn delete(&self, id: OperationId) -> BatchResult<()> {
        let guard = self.inner.lock(id).await;

        if self.inner.registry.contains(id) {
            return Err(BatchError::Conflict(format!(
                "operation {id} is active; cancel it before deleting"
            )));
        }

        let record = self.inner.store.load(id).await?;
        self.inner.store.delete(id).await?;
        drop(guard);

        self.inner
            .announce(
                events::OPERATION_DELETED,
                &record,
                format!("Deleted operation '{}'", record.name),
            )
            .await;
        Ok(())
    }

    /// Current record: the live snapshot for active operations, else storage
    pub async fn get(&self, id: OperationId) -> BatchResult<OperationRecord> {
        match self.inner.registry.get(id) {
            Some(active) => Ok(active.snapshot()),
            None => Ok(self.inner.store.load(id).await?),
        }
    }

    /// Filtered, sorted page over all operations
    pub async fn list(&self, query: &OperationQuery) -> BatchResult<OperationPage> {
        let mut records = self.inner.store.list_all().await?;
        // Live snapshots are fresher than the last persisted write
        for record in records.iter_mut() {
            if let Some(active) = self.inner.registry.get(record.id) {
                *record = active.snapshot();
            }
        }
        Ok(query.apply(records, &self.inner.query_config))
    }

    /// Snapshots of every active operation, oldest first
    pub fn list_active(&self) -> Vec<OperationRecord> {
        let mut records: Vec<OperationRecord> = self
            .inner
            .registry
            .entries()
            .iter()
            .map(|active| active.snapshot())
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        records
    }

    pub fn active_operation_ids(&self) -> Vec<OperationId> {
        self.inner.registry.list_active()
    }

    pub fn is_active(&self, id: OperationId) -> bool {
        self.inner.registry.contains(id)
    }

    /// Record snapshots as they change
    ///
    /// For an inactive operation the receiver holds the stored record and
    /// never changes.
    pub async fn watch(&self, id: OperationId) -> BatchResult<watch::Receiver<OperationRecord>> {
        if let Some(active) = self.inner.registry.get(id) {
            return Ok(active.writer.subscribe());
        }
        let record = self.inner.store.load(id).await?;
        let (_sender, receiver) = watch::channel(record);
        Ok(receiver)
    }

    /// Resolve once the operation reaches a terminal status
    ///
    /// Fails with InvalidState for an operation that is not running and not
    /// terminal, since nothing would ever finish it.
    pub async fn wait_for_completion(&self, id: OperationId) -> BatchResult<OperationRecord> {
        let mut receiver = self.watch(id).await?;
        loop {
            let status = receiver.borrow_and_update().status;
            if status.is_terminal() {
                return Ok(receiver.borrow().clone());
            }
            if receiver.changed().await.is_err() {
                break;
            }
        }

        let record = self.get(id).await?;
        if record.is_terminal() {
            Ok(record)
        } else {
            Err(BatchError::invalid_state(
                id,
                record.status,
                "wait for completion",
            ))
        }
    }

    /// Reset operations a previous process left Queued, Running or Paused
    ///
    /// Interrupted sub-tasks go back to Pending and the operation to Pending;
    /// an operation that was draining a cancellation is finished as Cancelled.
    /// With `resume_interrupted_on_startup` the reset operations are restarted.
    #[instrument(skip(self))]
    pub async fn recover_interrupted_operations(&self) -> BatchResult<Vec<OperationId>> {
        let candidates: Vec<OperationId> = self
            .inner
            .store
            .list_all()
            .await?
            .into_iter()
            .filter(|record| record.status.is_active() && !self.inner.registry.contains(record.id))
            .map(|record| record.id)
            .collect();

        let mut recovered = Vec::with_capacity(candidates.len());
        for id in candidates {
            let _guard = self.inner.lock(id).await;
            if self.inner.registry.contains(id) {
                continue;
            }
            let mut record = self.inner.store.load(id).await?;
            if !record.status.is_active() {
                continue;
            }

            let now = Utc::now();
            if record.cancel_requested_at.is_some() {
                cancel_inactive(&mut record, now)?;
                self.inner.store.save_snapshot(&record).await?;
                self.inner.announce_terminal(&record).await;
                recovered.push(id);
                continue;
            }

            reset_interrupted(&mut record, now)?;
            self.inner.store.save_snapshot(&record).await?;
            self.inner
                .announce(
                    events::OPERATION_RECOVERED,
                    &record,
                    format!("Recovered interrupted operation '{}'", record.name),
                )
                .await;
            recovered.push(id);

            if self.inner.settings.resume_interrupted_on_startup {
                if let Err(error) = self.start_locked(id).await {
                    warn!(operation_id = %id, error = %error, "Could not restart recovered operation");
                }
            }
        }

        info!(count = recovered.len(), "Interrupted operation recovery finished");
        Ok(recovered)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    /// Stop accepting starts and settle every active operation per `mode`
    #[instrument(skip(self))]
    pub async fn shutdown(&self, mode: ShutdownMode) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        let active = self.inner.registry.entries();
        info!(?mode, active = active.len(), "Batch engine shutting down");

        match mode {
            ShutdownMode::Abandon => {
                for operation in &active {
                    if let Some(driver) = operation.take_driver() {
                        driver.abort();
                    }
                    self.inner.registry.unregister(operation.operation_id);
                }
                return;
            }
            ShutdownMode::Cancel => {
                for operation in &active {
                    if let Err(error) = self.cancel(operation.operation_id).await {
                        warn!(operation_id = %operation.operation_id, error = %error, "Cancel during shutdown failed");
                    }
                }
            }
            ShutdownMode::Drain => {}
        }

        for operation in active {
            if let Some(driver) = operation.take_driver() {
                if let Err(error) = driver.await {
                    warn!(operation_id = %operation.operation_id, error = %error, "Driver task ended abnormally");
                }
            }
        }
    }
}
