//! Audit trail for operation lifecycle actions.

use crate::constants::audit::{CATEGORY_BATCH_OPERATION, RESOURCE_TYPE_OPERATION};
use crate::models::OperationRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AuditError {
    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),
    #[error("Audit entry rejected: {0}")]
    Rejected(String),
}

/// One audited action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub category: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub description: String,
    pub duration_ms: Option<u64>,
    pub metadata: Value,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Entry describing `action` on an operation, with status and summary metadata
    pub fn for_operation(
        action: impl Into<String>,
        record: &OperationRecord,
        description: impl Into<String>,
    ) -> Self {
        Self {
            category: CATEGORY_BATCH_OPERATION.to_string(),
            action: action.into(),
            resource_type: RESOURCE_TYPE_OPERATION.to_string(),
            resource_id: record.id.to_string(),
            description: description.into(),
            duration_ms: record.duration_ms,
            metadata: json!({
                "name": record.name,
                "operation_type": record.operation_type,
                "status": record.status,
                "total_images": record.summary.total_images,
                "successful_images": record.summary.successful_images,
                "failed_images": record.summary.failed_images,
                "run_count": record.run_count,
            }),
            recorded_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError>;
}

/// Writes audit entries to the `imagebatch::audit` tracing target
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        info!(
            target: "imagebatch::audit",
            category = %entry.category,
            action = %entry.action,
            resource_type = %entry.resource_type,
            resource_id = %entry.resource_id,
            duration_ms = entry.duration_ms,
            metadata = %entry.metadata,
            "{}",
            entry.description
        );
        Ok(())
    }
}
