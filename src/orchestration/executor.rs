//! # Per-image Executors
//!
//! The engine never mutates images itself. Each [`OperationType`] maps to one
//! [`ImageOperationExecutor`] in the [`ExecutorRegistry`]; the executor is
//! resolved once when an operation run starts and then invoked once per
//! pending image.
//!
//! Executors are expected to watch `ExecutionContext::cancellation` and return
//! [`ExecutorError::Cancelled`] when it fires. The engine also enforces a
//! per-image timeout and catches panics, so a misbehaving executor costs one
//! sub-task, never the operation.

use crate::error::{BatchError, BatchResult};
use crate::models::{OperationId, OperationType};
use crate::orchestration::writer::OperationWriterHandle;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors an executor can report for one image
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutorError {
    #[error("{0}")]
    Failed(String),
    #[error("image operation cancelled")]
    Cancelled,
}

impl ExecutorError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl From<anyhow::Error> for ExecutorError {
    fn from(error: anyhow::Error) -> Self {
        Self::Failed(format!("{error:#}"))
    }
}

/// Reports fractional progress for the sub-task being executed
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    index: usize,
    writer: OperationWriterHandle,
}

impl ProgressReporter {
    pub(crate) fn new(index: usize, writer: OperationWriterHandle) -> Self {
        Self { index, writer }
    }

    /// Values outside 0-100 are clamped and decreases are ignored
    pub async fn report(&self, percentage: f64) {
        self.writer.report_progress(self.index, percentage).await;
    }
}

/// Everything an executor gets to know about one image
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub operation_id: OperationId,
    pub operation_type: OperationType,
    pub image_path: String,
    pub configuration: Arc<Value>,
    pub template_id: Option<String>,
    pub profile_id: Option<String>,
    pub cancellation: CancellationToken,
    pub progress: ProgressReporter,
}

/// The per-image operation collaborator
#[async_trait]
pub trait ImageOperationExecutor: Send + Sync {
    /// Mutate one image; `Ok(())` marks the sub-task Completed
    async fn execute(&self, context: ExecutionContext) -> Result<(), ExecutorError>;
}

/// Maps operation types to their executors
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: Arc<DashMap<OperationType, Arc<dyn ImageOperationExecutor>>>,
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("registered_types", &self.registered_types())
            .finish()
    }
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the executor for `operation_type`
    pub fn register(
        &self,
        operation_type: OperationType,
        executor: Arc<dyn ImageOperationExecutor>,
    ) {
        self.executors.insert(operation_type, executor);
    }

    pub fn resolve(&self, operation_type: OperationType) -> BatchResult<Arc<dyn ImageOperationExecutor>> {
        self.executors
            .get(&operation_type)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                BatchError::Validation(format!(
                    "no executor registered for operation type {operation_type}"
                ))
            })
    }

    pub fn contains(&self, operation_type: OperationType) -> bool {
        self.executors.contains_key(&operation_type)
    }

    pub fn registered_types(&self) -> Vec<OperationType> {
        self.executors.iter().map(|entry| *entry.key()).collect()
    }
}
