use serde::{Deserialize, Serialize};

use crate::model::Id;

/// Relation merging a secondary (school, group) under a primary one for a
/// session. While active, the secondary's slots are never independently
/// assigned; the commit coordinator gives them zero-allowance dependent
/// postings that follow the primary's supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedGroup {
    pub id: Id,
    pub session_id: Id,
    pub primary_school_id: Id,
    pub primary_group_number: i32,
    pub secondary_school_id: Id,
    pub secondary_group_number: i32,
    pub active: bool,
}

impl MergedGroup {
    pub fn primary_matches(&self, school_id: &str, group_number: i32) -> bool {
        self.primary_school_id == school_id && self.primary_group_number == group_number
    }

    pub fn secondary_matches(&self, school_id: &str, group_number: i32) -> bool {
        self.secondary_school_id == school_id && self.secondary_group_number == group_number
    }
}
