use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Id, PostingType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Processing,
    Completed,
    Failed,
    RolledBack,
}

impl BatchStatus {
    /// Allowed transitions: processing -> {completed, failed};
    /// completed -> rolled_back. Everything else is rejected.
    pub fn can_transition_to(self, next: BatchStatus) -> bool {
        matches!(
            (self, next),
            (BatchStatus::Processing, BatchStatus::Completed)
                | (BatchStatus::Processing, BatchStatus::Failed)
                | (BatchStatus::Completed, BatchStatus::RolledBack)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BatchStatus::Processing => "processing",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
            BatchStatus::RolledBack => "rolled_back",
        }
    }
}

/// Snapshot of the inputs a batch was executed with, stored on the batch
/// record for auditing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchCriteria {
    pub number_of_postings: i32,
    pub posting_type: PostingType,
    pub priority_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub faculty_filter: Option<Id>,
}

/// One auditable, reversible execution of the assignment-and-commit
/// operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingBatch {
    pub id: Id,
    pub session_id: Id,
    pub criteria: BatchCriteria,
    pub status: BatchStatus,
    /// Engine assignments that entered the commit loop.
    pub assigned_count: i64,
    /// Assignments skipped at commit time (stale slot, stale capacity, ...).
    pub skipped_count: i64,
    /// Postings actually written, dependents included.
    pub posting_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl PostingBatch {
    pub fn new(session_id: Id, criteria: BatchCriteria, requested_by: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id,
            criteria,
            status: BatchStatus::Processing,
            assigned_count: 0,
            skipped_count: 0,
            posting_count: 0,
            error: None,
            requested_by,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Totals reported back into the batch record when a commit settles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchTotals {
    pub assigned_count: i64,
    pub skipped_count: i64,
    pub posting_count: i64,
}
