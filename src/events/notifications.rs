//! Notifications about operation lifecycle changes.

use crate::models::{OperationId, OperationRecord, OperationSummary};
use crate::state_machine::OperationStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NotificationError {
    #[error("Notification channel closed")]
    ChannelClosed,
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationNotification {
    /// One of the names in [`crate::constants::events`]
    pub event_name: String,
    pub operation_id: OperationId,
    pub operation_name: String,
    pub status: OperationStatus,
    pub progress_percentage: f64,
    pub summary: OperationSummary,
    pub error_message: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl OperationNotification {
    pub fn from_record(event_name: impl Into<String>, record: &OperationRecord) -> Self {
        Self {
            event_name: event_name.into(),
            operation_id: record.id,
            operation_name: record.name.clone(),
            status: record.status,
            progress_percentage: record.progress_percentage,
            summary: record.summary.clone(),
            error_message: record.error_message.clone(),
            occurred_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, notification: OperationNotification) -> Result<(), NotificationError>;
}
