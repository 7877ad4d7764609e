//! # Operation Queries
//!
//! Filtering, sorting and pagination over stored operation records. Holds no
//! state; the engine hands it the full record set. Page counts are computed
//! from the filtered set, never from the store size.

use crate::config::QueryConfig;
use crate::models::{OperationPriority, OperationRecord, OperationType};
use crate::state_machine::OperationStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Name,
    Status,
    Priority,
    #[default]
    CreatedAt,
    StartedAt,
    CompletedAt,
    ProgressPercentage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

/// Filter, sort and page selection; unset filters match everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationQuery {
    pub status: Option<OperationStatus>,
    pub operation_type: Option<OperationType>,
    pub created_by: Option<String>,
    pub tag: Option<String>,
    /// Case-insensitive substring of name or description
    pub search: Option<String>,
    pub priority: Option<OperationPriority>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub sort_by: SortField,
    pub sort_direction: SortDirection,
    /// 1-based
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

impl OperationQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: OperationStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_operation_type(mut self, operation_type: OperationType) -> Self {
        self.operation_type = Some(operation_type);
        self
    }

    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn created_between(
        mut self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Self {
        self.created_after = after;
        self.created_before = before;
        self
    }

    pub fn sorted_by(mut self, field: SortField, direction: SortDirection) -> Self {
        self.sort_by = field;
        self.sort_direction = direction;
        self
    }

    pub fn page(mut self, page: usize, page_size: usize) -> Self {
        self.page = Some(page);
        self.page_size = Some(page_size);
        self
    }

    pub fn matches(&self, record: &OperationRecord) -> bool {
        if self.status.is_some_and(|status| record.status != status) {
            return false;
        }
        if self
            .operation_type
            .is_some_and(|operation_type| record.operation_type != operation_type)
        {
            return false;
        }
        if self.priority.is_some_and(|priority| record.priority != priority) {
            return false;
        }
        if let Some(created_by) = &self.created_by {
            if record.created_by.as_deref() != Some(created_by.as_str()) {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !record.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let in_name = record.name.to_lowercase().contains(&needle);
            let in_description = record
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle));
            if !in_name && !in_description {
                return false;
            }
        }
        if self.created_after.is_some_and(|after| record.created_at < after) {
            return false;
        }
        if self.created_before.is_some_and(|before| record.created_at > before) {
            return false;
        }
        true
    }

    fn compare(&self, a: &OperationRecord, b: &OperationRecord) -> Ordering {
        let ordering = match self.sort_by {
            SortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortField::Status => a.status.to_string().cmp(&b.status.to_string()),
            SortField::Priority => a.priority.cmp(&b.priority),
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::StartedAt => a.started_at.cmp(&b.started_at),
            SortField::CompletedAt => a.completed_at.cmp(&b.completed_at),
            SortField::ProgressPercentage => a.progress_percentage.total_cmp(&b.progress_percentage),
        };
        // ties broken by id so pages are stable
        let ordering = ordering.then_with(|| a.id.cmp(&b.id));

        match self.sort_direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }

    /// Filter, sort and cut one page out of `records`
    pub fn apply(&self, records: Vec<OperationRecord>, config: &QueryConfig) -> OperationPage {
        let mut filtered: Vec<OperationRecord> =
            records.into_iter().filter(|r| self.matches(r)).collect();
        filtered.sort_by(|a, b| self.compare(a, b));

        let total_count = filtered.len();
        let page_size = self
            .page_size
            .unwrap_or(config.default_page_size)
            .clamp(1, config.max_page_size.max(1));
        let total_pages = total_count.div_ceil(page_size);
        let page = self.page.unwrap_or(1).clamp(1, total_pages.max(1));

        let items = filtered
            .into_iter()
            .skip((page - 1) * page_size)
            .take(page_size)
            .collect();

        OperationPage {
            items,
            total_count,
            page,
            page_size,
            total_pages,
            has_next_page: page < total_pages,
            has_previous_page: page > 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationPage {
    pub items: Vec<OperationRecord>,
    /// Number of records matching the filters
    pub total_count: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}
