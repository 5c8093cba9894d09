use std::collections::{HashMap, HashSet};

use anyhow::Result;

use crate::model::{
    BatchStatus, BatchTotals, Id, MergedGroup, NewPosting, Posting, PostingBatch, School,
    SchoolGroup, SessionPolicy, SlotKey, Supervisor,
};

#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_session(&self, id: &Id) -> Result<Option<SessionPolicy>>;
    async fn list_sessions(&self, institution_id: Option<&Id>) -> Result<Vec<SessionPolicy>>;
}

#[async_trait::async_trait]
pub trait SupervisorStore: Send + Sync {
    async fn list_supervisors(&self, institution_id: &Id) -> Result<Vec<Supervisor>>;
    /// Parameterized batch fetch keyed by id; callers never build dynamic
    /// IN-clauses themselves.
    async fn get_supervisors(&self, ids: &[Id]) -> Result<HashMap<Id, Supervisor>>;
    /// Non-cancelled primary posting counts for a session, keyed by
    /// supervisor id. Supervisors with no postings are absent.
    async fn count_active_primary_postings(&self, session_id: &Id) -> Result<HashMap<Id, i64>>;
}

#[async_trait::async_trait]
pub trait SchoolStore: Send + Sync {
    async fn get_schools(&self, ids: &[Id]) -> Result<HashMap<Id, School>>;
    /// Distinct (school, group) pairs with at least one approved student
    /// acceptance for the session.
    async fn list_school_groups(&self, session_id: &Id) -> Result<Vec<SchoolGroup>>;
}

#[async_trait::async_trait]
pub trait MergeStore: Send + Sync {
    async fn list_active_merged_groups(&self, session_id: &Id) -> Result<Vec<MergedGroup>>;
}

#[async_trait::async_trait]
pub trait PostingStore: Send + Sync {
    /// Slot keys of every non-cancelled posting in the session.
    async fn list_active_slot_keys(&self, session_id: &Id) -> Result<HashSet<SlotKey>>;
    async fn list_postings_for_batch(&self, batch_id: &Id) -> Result<Vec<Posting>>;
    /// Cancel every non-cancelled posting tagged with the batch, primary
    /// and dependent alike, in one transaction. Returns the count.
    async fn cancel_postings_for_batch(&self, batch_id: &Id) -> Result<u64>;
}

#[async_trait::async_trait]
pub trait BatchStore: Send + Sync {
    async fn create_batch(&self, batch: PostingBatch) -> Result<()>;
    async fn get_batch(&self, id: &Id) -> Result<Option<PostingBatch>>;
    /// Apply a status transition plus settlement metadata. The storage
    /// layer re-checks the state machine so no caller can skip it.
    async fn update_batch_status(
        &self,
        id: &Id,
        status: BatchStatus,
        totals: Option<BatchTotals>,
        error: Option<String>,
    ) -> Result<()>;
    async fn list_batches(
        &self,
        session_id: &Id,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<PostingBatch>, i64)>;
}

/// One open transaction for a commit run. All reads observe writes already
/// buffered in the same unit, so the coordinator's commit-time guards see
/// a consistent picture; nothing is visible externally until `commit`.
#[async_trait::async_trait]
pub trait PostingUnitOfWork: Send {
    async fn find_active_posting(
        &mut self,
        session_id: &Id,
        key: &SlotKey,
    ) -> Result<Option<Posting>>;
    async fn count_active_primary(&mut self, session_id: &Id, supervisor_id: &Id) -> Result<i64>;
    async fn insert_posting(&mut self, posting: NewPosting) -> Result<Posting>;
    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;
}

#[async_trait::async_trait]
pub trait UnitOfWorkSource: Send + Sync {
    async fn begin_unit(&self) -> Result<Box<dyn PostingUnitOfWork + '_>>;
}

pub trait Store:
    SessionStore
    + SupervisorStore
    + SchoolStore
    + MergeStore
    + PostingStore
    + BatchStore
    + UnitOfWorkSource
    + Send
    + Sync
{
}
