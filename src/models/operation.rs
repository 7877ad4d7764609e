//! # Operation Record
//!
//! The whole-document unit of persistence for a batch job.
//!
//! ## Overview
//!
//! An `OperationRecord` describes one batch operation: which per-image operation
//! it performs, the ordered list of target images (one [`SubTask`] each), the
//! opaque configuration forwarded to the executor, and the lifecycle state the
//! engine maintains while the operation runs.
//!
//! ## Derived fields
//!
//! `progress_percentage` and `summary` are pure functions of the sub-task list
//! and are recomputed after every mutation by
//! [`crate::orchestration::aggregator::refresh_derived_fields`]. They are stored
//! so that readers can render progress without inspecting sub-tasks.
//!
//! ## Persistence
//!
//! Records are serialized as JSON, one file per [`OperationId`]. Field order is
//! fixed by the struct definition and `configuration` is a `serde_json::Value`
//! (sorted map), so re-serializing a loaded record reproduces the same bytes.

use crate::constants::system::MAX_TARGET_IMAGES;
use crate::error::{BatchError, BatchResult};
use crate::models::SubTask;
use crate::orchestration::aggregator;
use crate::state_machine::{OperationStatus, StateMachineError, StateMachineResult, SubTaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

/// Unique identity of an operation, also its storage key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for OperationId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| format!("Invalid operation id {s}: {e}"))
    }
}

impl From<Uuid> for OperationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Which per-image operation a batch performs
///
/// Opaque to the engine beyond executor dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    ApplyTemplate,
    Debloat,
    InjectDrivers,
    ConvertFormat,
    ApplyUpdates,
    Cleanup,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApplyTemplate => write!(f, "apply_template"),
            Self::Debloat => write!(f, "debloat"),
            Self::InjectDrivers => write!(f, "inject_drivers"),
            Self::ConvertFormat => write!(f, "convert_format"),
            Self::ApplyUpdates => write!(f, "apply_updates"),
            Self::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// Advisory ordering hint for listings; never affects execution order
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum OperationPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// Aggregate outcome counts derived from the sub-tasks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationSummary {
    pub total_images: usize,
    pub successful_images: usize,
    pub failed_images: usize,
    pub skipped_images: usize,
    pub cancelled_images: usize,
    /// Percentage of successful images, two decimals
    pub success_rate: f64,
    /// Mean duration over sub-tasks that have a `completed_at`
    pub average_duration_ms: f64,
}

impl OperationSummary {
    /// Sub-tasks that reached a terminal status
    pub fn finished_images(&self) -> usize {
        self.successful_images + self.failed_images + self.skipped_images + self.cancelled_images
    }
}

/// Persisted state of one batch operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: OperationId,
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub operation_type: OperationType,
    /// Insertion order is the launch order, not a completion order
    pub target_images: Vec<SubTask>,
    /// Forwarded to the executor untouched
    pub configuration: serde_json::Value,
    pub template_id: Option<String>,
    pub profile_id: Option<String>,
    pub priority: OperationPriority,
    pub max_parallel_operations: usize,
    pub continue_on_error: bool,
    pub status: OperationStatus,
    pub progress_percentage: f64,
    pub summary: OperationSummary,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub error_message: Option<String>,
    /// Set while an active operation drains after `cancel`
    pub cancel_requested_at: Option<DateTime<Utc>>,
    /// Number of times the operation has been started
    pub run_count: u32,
}

impl OperationRecord {
    /// Build a Pending record from a validated creation request
    pub fn from_request(request: CreateOperationRequest, default_parallelism: usize) -> Self {
        let target_images: Vec<SubTask> =
            request.target_images.into_iter().map(SubTask::new).collect();

        let mut record = Self {
            id: OperationId::new(),
            name: request.name,
            description: request.description,
            tags: request.tags,
            operation_type: request.operation_type,
            target_images,
            configuration: request.configuration,
            template_id: request.template_id,
            profile_id: request.profile_id,
            priority: request.priority,
            max_parallel_operations: request
                .max_parallel_operations
                .unwrap_or(default_parallelism),
            continue_on_error: request.continue_on_error,
            status: OperationStatus::Pending,
            progress_percentage: 0.0,
            summary: OperationSummary::default(),
            created_by: request.created_by,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            duration_ms: None,
            error_message: None,
            cancel_requested_at: None,
            run_count: 0,
        };
        aggregator::refresh_derived_fields(&mut record);
        record
    }

    pub fn sub_task(&self, index: usize) -> StateMachineResult<&SubTask> {
        let total = self.target_images.len();
        self.target_images
            .get(index)
            .ok_or(StateMachineError::UnknownSubTask { index, total })
    }

    pub fn sub_task_mut(&mut self, index: usize) -> StateMachineResult<&mut SubTask> {
        let total = self.target_images.len();
        self.target_images
            .get_mut(index)
            .ok_or(StateMachineError::UnknownSubTask { index, total })
    }

    /// Indices of sub-tasks still waiting to be launched, in list order
    pub fn pending_indices(&self) -> Vec<usize> {
        self.indices_with_status(SubTaskStatus::Pending)
    }

    pub fn indices_with_status(&self, status: SubTaskStatus) -> Vec<usize> {
        self.target_images
            .iter()
            .enumerate()
            .filter(|(_, sub_task)| sub_task.status == status)
            .map(|(index, _)| index)
            .collect()
    }

    pub fn count_with_status(&self, status: SubTaskStatus) -> usize {
        self.target_images
            .iter()
            .filter(|sub_task| sub_task.status == status)
            .count()
    }

    /// First failed sub-task in list order
    pub fn first_failure(&self) -> Option<&SubTask> {
        self.target_images
            .iter()
            .find(|sub_task| sub_task.status == SubTaskStatus::Failed)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Caller-supplied description of a new operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOperationRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub operation_type: OperationType,
    pub target_images: Vec<String>,
    #[serde(default)]
    pub configuration: serde_json::Value,
    pub template_id: Option<String>,
    pub profile_id: Option<String>,
    #[serde(default)]
    pub priority: OperationPriority,
    /// Falls back to the engine default when absent
    pub max_parallel_operations: Option<usize>,
    #[serde(default = "default_continue_on_error")]
    pub continue_on_error: bool,
    pub created_by: Option<String>,
    /// Start right after creation
    #[serde(default)]
    pub start_immediately: bool,
}

fn default_continue_on_error() -> bool {
    true
}

impl CreateOperationRequest {
    /// Create a request with defaults for everything but the essentials
    pub fn new(
        name: impl Into<String>,
        operation_type: OperationType,
        target_images: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            tags: Vec::new(),
            operation_type,
            target_images: target_images.into_iter().map(Into::into).collect(),
            configuration: serde_json::Value::Null,
            template_id: None,
            profile_id: None,
            priority: OperationPriority::default(),
            max_parallel_operations: None,
            continue_on_error: default_continue_on_error(),
            created_by: None,
            start_immediately: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_configuration(mut self, configuration: serde_json::Value) -> Self {
        self.configuration = configuration;
        self
    }

    pub fn with_template(mut self, template_id: impl Into<String>) -> Self {
        self.template_id = Some(template_id.into());
        self
    }

    pub fn with_profile(mut self, profile_id: impl Into<String>) -> Self {
        self.profile_id = Some(profile_id.into());
        self
    }

    pub fn with_priority(mut self, priority: OperationPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_parallel_operations(mut self, max_parallel_operations: usize) -> Self {
        self.max_parallel_operations = Some(max_parallel_operations);
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    pub fn start_immediately(mut self) -> Self {
        self.start_immediately = true;
        self
    }

    /// Reject requests the engine cannot run
    pub fn validate(&self, max_parallel_limit: usize) -> BatchResult<()> {
        if self.name.trim().is_empty() {
            return Err(BatchError::Validation(
                "operation name must not be empty".to_string(),
            ));
        }

        if self.target_images.is_empty() {
            return Err(BatchError::Validation(
                "at least one target image is required".to_string(),
            ));
        }

        if self.target_images.len() > MAX_TARGET_IMAGES {
            return Err(BatchError::Validation(format!(
                "{} target images exceeds the maximum of {MAX_TARGET_IMAGES}",
                self.target_images.len()
            )));
        }

        let mut seen = HashSet::with_capacity(self.target_images.len());
        for image_path in &self.target_images {
            if image_path.trim().is_empty() {
                return Err(BatchError::Validation(
                    "target image paths must not be empty".to_string(),
                ));
            }
            if !seen.insert(image_path.as_str()) {
                return Err(BatchError::Validation(format!(
                    "duplicate target image: {image_path}"
                )));
            }
        }

        if let Some(parallelism) = self.max_parallel_operations {
            if parallelism == 0 || parallelism > max_parallel_limit {
                return Err(BatchError::Validation(format!(
                    "max_parallel_operations must be between 1 and {max_parallel_limit}, got {parallelism}"
                )));
            }
        }

        Ok(())
    }
}
