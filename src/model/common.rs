use serde::{Deserialize, Serialize};

pub type Id = String;

/// Composite identity of one unit of supervision demand.
///
/// A slot is never stored; it is derived fresh for every run from the
/// approved school groups and the configured number of visits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotKey {
    pub school_id: Id,
    pub group_number: i32,
    pub visit_number: i32,
}

impl SlotKey {
    pub fn new(school_id: impl Into<Id>, group_number: i32, visit_number: i32) -> Self {
        Self {
            school_id: school_id.into(),
            group_number,
            visit_number,
        }
    }
}

impl std::fmt::Display for SlotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/g{}/v{}",
            self.school_id, self.group_number, self.visit_number
        )
    }
}

/// How slots are grouped within a visit round. The primary sort key is
/// always the visit number; the posting type only breaks ties inside a
/// round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PostingType {
    #[default]
    Random,
    RouteBased,
    LgaBased,
}

/// Page envelope for list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total: i64, page: i64, per_page: i64) -> Self {
        Self {
            items,
            total,
            page,
            per_page,
        }
    }
}
