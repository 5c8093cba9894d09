use serde::{Deserialize, Serialize};

use crate::model::Id;

/// A practice site. Distance, route and LGA drive both the slot ordering
/// and the allowance category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct School {
    pub id: Id,
    pub institution_id: Id,
    pub name: String,
    pub distance_km: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lga: Option<String>,
}

/// A (school, group) pair with at least one approved student acceptance
/// for the session. The store derives these; the engine expands them into
/// per-visit slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchoolGroup {
    pub school_id: Id,
    pub group_number: i32,
}
