use serde::{Deserialize, Serialize};

use crate::model::Id;

/// Read-only snapshot of the policy settings for one academic session.
///
/// The engine consumes this as-is; it never writes session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPolicy {
    pub id: Id,
    pub institution_id: Id,
    pub name: String,
    /// Hard cap on non-cancelled primary postings per supervisor.
    /// When unset, the visit count doubles as the cap.
    pub max_posting_per_supervisor: Option<i32>,
    /// Number of supervision visits each school group receives.
    pub max_supervision_visits: i32,
    /// Distance at or under which a school counts as "inside" territory.
    pub inside_distance_threshold_km: f64,
    pub dsa_enabled: bool,
    pub dsa_min_distance_km: f64,
    pub dsa_max_distance_km: f64,
    /// Percentage of the DTA rate paid as DSA inside the distance band.
    pub dsa_percentage: f64,
    pub active: bool,
}

impl SessionPolicy {
    /// Effective per-supervisor posting cap: explicit cap, else the visit
    /// count, else 3.
    pub fn supervision_cap(&self) -> i64 {
        if let Some(cap) = self.max_posting_per_supervisor {
            return cap as i64;
        }
        if self.max_supervision_visits > 0 {
            return self.max_supervision_visits as i64;
        }
        3
    }
}
