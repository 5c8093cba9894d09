use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, Result};
use chrono::Utc;
use parking_lot::RwLock;

use crate::model::{
    BatchStatus, BatchTotals, Id, MergedGroup, NewPosting, Posting, PostingBatch, PostingStatus,
    School, SchoolGroup, SessionPolicy, SlotKey, Supervisor,
};
use crate::store::traits::{
    BatchStore, MergeStore, PostingStore, PostingUnitOfWork, SchoolStore, SessionStore, Store,
    SupervisorStore, UnitOfWorkSource,
};

#[derive(Default)]
struct Inner {
    sessions: HashMap<Id, SessionPolicy>,
    supervisors: HashMap<Id, Supervisor>,
    schools: HashMap<Id, School>,
    school_groups: HashMap<Id, Vec<SchoolGroup>>,
    merged_groups: Vec<MergedGroup>,
    postings: Vec<Posting>,
    batches: HashMap<Id, PostingBatch>,
    fail_next_insert: bool,
}

/// In-memory store for tests and demos. Mirrors the Postgres semantics
/// closely enough that the commit-time guards behave identically: the
/// unit-of-work's reads observe its own buffered writes.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_session(&self, session: SessionPolicy) {
        self.inner.write().sessions.insert(session.id.clone(), session);
    }

    pub fn add_supervisor(&self, supervisor: Supervisor) {
        self.inner
            .write()
            .supervisors
            .insert(supervisor.id.clone(), supervisor);
    }

    pub fn add_school(&self, school: School) {
        self.inner.write().schools.insert(school.id.clone(), school);
    }

    pub fn add_school_group(&self, session_id: impl Into<Id>, group: SchoolGroup) {
        self.inner
            .write()
            .school_groups
            .entry(session_id.into())
            .or_default()
            .push(group);
    }

    pub fn add_merged_group(&self, merged: MergedGroup) {
        self.inner.write().merged_groups.push(merged);
    }

    /// Seed a pre-existing posting, bypassing the commit coordinator.
    pub fn add_posting(&self, posting: Posting) {
        self.inner.write().postings.push(posting);
    }

    /// Make the next posting insert fail with a storage error; used to
    /// exercise the abort-and-rollback path.
    pub fn fail_next_insert(&self) {
        self.inner.write().fail_next_insert = true;
    }

    pub fn postings(&self) -> Vec<Posting> {
        self.inner.read().postings.clone()
    }
}

#[async_trait::async_trait]
impl SessionStore for MemoryStore {
    async fn get_session(&self, id: &Id) -> Result<Option<SessionPolicy>> {
        Ok(self.inner.read().sessions.get(id).cloned())
    }

    async fn list_sessions(&self, institution_id: Option<&Id>) -> Result<Vec<SessionPolicy>> {
        let inner = self.inner.read();
        let mut sessions: Vec<SessionPolicy> = inner
            .sessions
            .values()
            .filter(|s| institution_id.map_or(true, |inst| &s.institution_id == inst))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sessions)
    }
}

#[async_trait::async_trait]
impl SupervisorStore for MemoryStore {
    async fn list_supervisors(&self, institution_id: &Id) -> Result<Vec<Supervisor>> {
        let inner = self.inner.read();
        let mut supervisors: Vec<Supervisor> = inner
            .supervisors
            .values()
            .filter(|s| &s.institution_id == institution_id)
            .cloned()
            .collect();
        supervisors.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(supervisors)
    }

    async fn get_supervisors(&self, ids: &[Id]) -> Result<HashMap<Id, Supervisor>> {
        let inner = self.inner.read();
        Ok(ids
            .iter()
            .filter_map(|id| inner.supervisors.get(id).map(|s| (id.clone(), s.clone())))
            .collect())
    }

    async fn count_active_primary_postings(&self, session_id: &Id) -> Result<HashMap<Id, i64>> {
        let inner = self.inner.read();
        let mut counts: HashMap<Id, i64> = HashMap::new();
        for posting in inner
            .postings
            .iter()
            .filter(|p| &p.session_id == session_id)
            .filter(|p| p.status == PostingStatus::Active && !p.is_dependent())
        {
            *counts.entry(posting.supervisor_id.clone()).or_default() += 1;
        }
        Ok(counts)
    }
}

#[async_trait::async_trait]
impl SchoolStore for MemoryStore {
    async fn get_schools(&self, ids: &[Id]) -> Result<HashMap<Id, School>> {
        let inner = self.inner.read();
        Ok(ids
            .iter()
            .filter_map(|id| inner.schools.get(id).map(|s| (id.clone(), s.clone())))
            .collect())
    }

    async fn list_school_groups(&self, session_id: &Id) -> Result<Vec<SchoolGroup>> {
        let inner = self.inner.read();
        let mut groups = inner
            .school_groups
            .get(session_id)
            .cloned()
            .unwrap_or_default();
        groups.sort_by(|a, b| {
            a.school_id
                .cmp(&b.school_id)
                .then(a.group_number.cmp(&b.group_number))
        });
        groups.dedup();
        Ok(groups)
    }
}

#[async_trait::async_trait]
impl MergeStore for MemoryStore {
    async fn list_active_merged_groups(&self, session_id: &Id) -> Result<Vec<MergedGroup>> {
        let inner = self.inner.read();
        Ok(inner
            .merged_groups
            .iter()
            .filter(|m| &m.session_id == session_id && m.active)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl PostingStore for MemoryStore {
    async fn list_active_slot_keys(&self, session_id: &Id) -> Result<HashSet<SlotKey>> {
        let inner = self.inner.read();
        Ok(inner
            .postings
            .iter()
            .filter(|p| &p.session_id == session_id && p.status == PostingStatus::Active)
            .map(|p| p.slot_key())
            .collect())
    }

    async fn list_postings_for_batch(&self, batch_id: &Id) -> Result<Vec<Posting>> {
        let inner = self.inner.read();
        Ok(inner
            .postings
            .iter()
            .filter(|p| &p.batch_id == batch_id)
            .cloned()
            .collect())
    }

    async fn cancel_postings_for_batch(&self, batch_id: &Id) -> Result<u64> {
        let mut inner = self.inner.write();
        let mut cancelled = 0_u64;
        for posting in inner
            .postings
            .iter_mut()
            .filter(|p| &p.batch_id == batch_id && p.status == PostingStatus::Active)
        {
            posting.status = PostingStatus::Cancelled;
            cancelled += 1;
        }
        Ok(cancelled)
    }
}

#[async_trait::async_trait]
impl BatchStore for MemoryStore {
    async fn create_batch(&self, batch: PostingBatch) -> Result<()> {
        self.inner.write().batches.insert(batch.id.clone(), batch);
        Ok(())
    }

    async fn get_batch(&self, id: &Id) -> Result<Option<PostingBatch>> {
        Ok(self.inner.read().batches.get(id).cloned())
    }

    async fn update_batch_status(
        &self,
        id: &Id,
        status: BatchStatus,
        totals: Option<BatchTotals>,
        error: Option<String>,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        let batch = inner
            .batches
            .get_mut(id)
            .ok_or_else(|| anyhow!("Batch not found: {id}"))?;
        if !batch.status.can_transition_to(status) {
            return Err(anyhow!(
                "invalid batch status transition: {} -> {}",
                batch.status.as_str(),
                status.as_str()
            ));
        }
        batch.status = status;
        if let Some(totals) = totals {
            batch.assigned_count = totals.assigned_count;
            batch.skipped_count = totals.skipped_count;
            batch.posting_count = totals.posting_count;
        }
        batch.error = error;
        batch.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn list_batches(
        &self,
        session_id: &Id,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<PostingBatch>, i64)> {
        let inner = self.inner.read();
        let mut batches: Vec<PostingBatch> = inner
            .batches
            .values()
            .filter(|b| &b.session_id == session_id)
            .cloned()
            .collect();
        batches.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let total = batches.len() as i64;
        let offset = ((page - 1) * per_page) as usize;
        let items = batches
            .into_iter()
            .skip(offset)
            .take(per_page as usize)
            .collect();
        Ok((items, total))
    }
}

/// Buffered unit of work: reads consult the buffer before the base data,
/// nothing lands in the store until `commit`.
pub struct MemoryUnit<'a> {
    store: &'a MemoryStore,
    pending: Vec<Posting>,
}

#[async_trait::async_trait]
impl<'a> PostingUnitOfWork for MemoryUnit<'a> {
    async fn find_active_posting(
        &mut self,
        session_id: &Id,
        key: &SlotKey,
    ) -> Result<Option<Posting>> {
        if let Some(found) = self
            .pending
            .iter()
            .find(|p| &p.session_id == session_id && &p.slot_key() == key)
        {
            return Ok(Some(found.clone()));
        }
        let inner = self.store.inner.read();
        Ok(inner
            .postings
            .iter()
            .find(|p| {
                &p.session_id == session_id
                    && p.status == PostingStatus::Active
                    && &p.slot_key() == key
            })
            .cloned())
    }

    async fn count_active_primary(&mut self, session_id: &Id, supervisor_id: &Id) -> Result<i64> {
        let buffered = self
            .pending
            .iter()
            .filter(|p| {
                &p.session_id == session_id
                    && &p.supervisor_id == supervisor_id
                    && !p.is_dependent()
            })
            .count() as i64;
        let inner = self.store.inner.read();
        let base = inner
            .postings
            .iter()
            .filter(|p| {
                &p.session_id == session_id
                    && &p.supervisor_id == supervisor_id
                    && p.status == PostingStatus::Active
                    && !p.is_dependent()
            })
            .count() as i64;
        Ok(base + buffered)
    }

    async fn insert_posting(&mut self, posting: NewPosting) -> Result<Posting> {
        {
            let mut inner = self.store.inner.write();
            if inner.fail_next_insert {
                inner.fail_next_insert = false;
                return Err(anyhow!("injected storage fault"));
            }
        }
        let row = Posting {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: posting.session_id,
            supervisor_id: posting.supervisor_id,
            school_id: posting.school_id,
            group_number: posting.group_number,
            visit_number: posting.visit_number,
            distance_km: posting.distance_km,
            allowance: posting.allowance,
            status: PostingStatus::Active,
            batch_id: posting.batch_id,
            merged_with_posting_id: posting.merged_with_posting_id,
            created_at: Utc::now(),
        };
        self.pending.push(row.clone());
        Ok(row)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut inner = self.store.inner.write();
        inner.postings.extend(self.pending);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl UnitOfWorkSource for MemoryStore {
    async fn begin_unit(&self) -> Result<Box<dyn PostingUnitOfWork + '_>> {
        Ok(Box::new(MemoryUnit {
            store: self,
            pending: Vec::new(),
        }))
    }
}

impl Store for MemoryStore {}
