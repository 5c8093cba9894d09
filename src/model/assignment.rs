use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{Id, SlotKey};

/// An unfilled placement slot together with the school attributes the
/// engine sorts on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotCandidate {
    pub key: SlotKey,
    pub distance_km: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lga: Option<String>,
}

/// Engine output: a (supervisor, slot) pairing not yet persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub supervisor_id: Id,
    pub slot: SlotCandidate,
}

/// Why the commit coordinator passed over one engine assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Supervisor record missing from the prefetched cache.
    MissingSupervisor,
    /// School record missing from the prefetched cache.
    MissingSchool,
    /// A slot with the same key was already written earlier in this batch.
    DuplicateInBatch,
    /// Another writer got a non-cancelled posting onto this slot first.
    SlotAlreadyFilled,
    /// The supervisor hit the session cap between engine time and commit
    /// time.
    CapacityReached,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            SkipReason::MissingSupervisor => "supervisor record missing",
            SkipReason::MissingSchool => "school record missing",
            SkipReason::DuplicateInBatch => "slot already used within this batch",
            SkipReason::SlotAlreadyFilled => "slot already has a non-cancelled posting",
            SkipReason::CapacityReached => "supervisor at session cap",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedAssignment {
    pub slot: SlotKey,
    pub supervisor_id: Id,
    pub reason: SkipReason,
}

/// Distribution statistics for one engine run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssignmentStats {
    pub total_slots: usize,
    pub assigned: usize,
    pub unassigned: usize,
    pub by_visit: BTreeMap<i32, usize>,
    pub by_supervisor: BTreeMap<Id, usize>,
    pub by_school: BTreeMap<Id, usize>,
    pub min_per_supervisor: usize,
    pub max_per_supervisor: usize,
    pub avg_per_supervisor: f64,
    pub supervisors_with_assignments: usize,
    pub supervisors_without_assignments: usize,
}

/// The complete, side-effect-free result of one engine invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRun {
    pub assignments: Vec<Assignment>,
    pub unassigned: Vec<SlotKey>,
    pub warnings: Vec<String>,
    pub stats: AssignmentStats,
}
