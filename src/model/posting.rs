use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Id, SlotKey};

/// Whether a school falls inside or outside the session's distance
/// threshold. Computed for every posting, including zero-allowance
/// dependents, so the UI can always label the location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationCategory {
    Inside,
    Outside,
}

/// The five-component monetary breakdown for one posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllowanceBreakdown {
    pub transport: f64,
    pub dsa: f64,
    pub dta: f64,
    pub local_running: f64,
    pub tetfund: f64,
    pub total: f64,
    pub location_category: LocationCategory,
}

impl AllowanceBreakdown {
    /// All components zero; used for dependent postings on merged groups.
    pub fn zero(location_category: LocationCategory) -> Self {
        Self {
            transport: 0.0,
            dsa: 0.0,
            dta: 0.0,
            local_running: 0.0,
            tetfund: 0.0,
            total: 0.0,
            location_category,
        }
    }

    pub fn component_sum(&self) -> f64 {
        self.transport + self.dsa + self.dta + self.local_running + self.tetfund
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostingStatus {
    Active,
    Cancelled,
}

/// A persisted posting row. Postings are only ever created by the commit
/// coordinator and only ever soft-cancelled, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub id: Id,
    pub session_id: Id,
    pub supervisor_id: Id,
    pub school_id: Id,
    pub group_number: i32,
    pub visit_number: i32,
    pub distance_km: f64,
    pub allowance: AllowanceBreakdown,
    pub status: PostingStatus,
    pub batch_id: Id,
    /// Set on dependent postings only: the primary posting this one was
    /// merged under.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_with_posting_id: Option<Id>,
    pub created_at: DateTime<Utc>,
}

impl Posting {
    pub fn slot_key(&self) -> SlotKey {
        SlotKey::new(
            self.school_id.clone(),
            self.group_number,
            self.visit_number,
        )
    }

    pub fn is_dependent(&self) -> bool {
        self.merged_with_posting_id.is_some()
    }
}

/// Insert payload handed to the store inside the commit transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPosting {
    pub session_id: Id,
    pub supervisor_id: Id,
    pub school_id: Id,
    pub group_number: i32,
    pub visit_number: i32,
    pub distance_km: f64,
    pub allowance: AllowanceBreakdown,
    pub batch_id: Id,
    pub merged_with_posting_id: Option<Id>,
}

impl NewPosting {
    pub fn slot_key(&self) -> SlotKey {
        SlotKey::new(
            self.school_id.clone(),
            self.group_number,
            self.visit_number,
        )
    }
}
