use serde::{Deserialize, Serialize};

use crate::error::{PostingError, Result};
use crate::logic::commit::CommitCoordinator;
use crate::logic::eligibility::resolve_eligible;
use crate::logic::engine::run_assignment;
use crate::logic::slots::derive_slots;
use crate::model::{
    Assignment, AssignmentRun, AssignmentStats, BatchCriteria, BatchStatus, EligibleSupervisor,
    Id, Paginated, Posting, PostingBatch, PostingType, SessionPolicy, SkippedAssignment,
    SlotCandidate, SlotKey,
};
use crate::store::Store;

use itertools::Itertools;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Run criteria shared by preview and execute.
#[derive(Debug, Clone, Deserialize)]
pub struct PostingRunRequest {
    /// Highest visit number to include in this run.
    pub number_of_postings: i32,
    #[serde(default)]
    pub posting_type: PostingType,
    #[serde(default)]
    pub priority_enabled: bool,
    #[serde(default)]
    pub faculty_filter: Option<Id>,
    #[serde(default)]
    pub requested_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewResponse {
    pub session_id: Id,
    pub assignments: Vec<Assignment>,
    pub unassigned: Vec<SlotKey>,
    pub warnings: Vec<String>,
    pub stats: AssignmentStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecuteResponse {
    pub batch_id: Id,
    pub postings: Vec<Posting>,
    pub skipped: Vec<SkippedAssignment>,
    pub dependents_created: usize,
    pub warnings: Vec<String>,
    pub stats: AssignmentStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct RollbackResponse {
    pub batch_id: Id,
    pub cancelled: u64,
}

/// Store-backed orchestration of the posting engine: the same pipeline
/// serves the HTTP handlers and the integration tests.
pub struct PostingPipeline<'a, S: Store> {
    store: &'a S,
}

impl<'a, S: Store> PostingPipeline<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Compute assignments without persisting anything. Safe to call
    /// concurrently with anything, including an in-flight execute.
    pub async fn preview(
        &self,
        session_id: &Id,
        request: &PostingRunRequest,
    ) -> Result<PreviewResponse> {
        let session = self.load_session(session_id).await?;
        let (_, run) = self.compute_run(&session, request).await?;
        Ok(PreviewResponse {
            session_id: session.id,
            assignments: run.assignments,
            unassigned: run.unassigned,
            warnings: run.warnings,
            stats: run.stats,
        })
    }

    /// Compute assignments and persist them under a fresh batch.
    pub async fn execute(
        &self,
        session_id: &Id,
        request: &PostingRunRequest,
    ) -> Result<ExecuteResponse> {
        let session = self.load_session(session_id).await?;
        let (_, run) = self.compute_run(&session, request).await?;

        let criteria = BatchCriteria {
            number_of_postings: request.number_of_postings,
            posting_type: request.posting_type,
            priority_enabled: request.priority_enabled,
            faculty_filter: request.faculty_filter.clone(),
        };
        let batch = PostingBatch::new(session.id.clone(), criteria, request.requested_by.clone());
        self.store.create_batch(batch.clone()).await?;
        log::info!(
            "batch {} started for session {} ({} assignments)",
            batch.id,
            session.id,
            run.assignments.len()
        );

        let outcome = CommitCoordinator::new(self.store)
            .execute(&session, &batch, &run)
            .await?;

        Ok(ExecuteResponse {
            batch_id: outcome.batch_id,
            postings: outcome.created,
            skipped: outcome.skipped,
            dependents_created: outcome.dependents_created,
            warnings: run.warnings,
            stats: run.stats,
        })
    }

    /// Paginated batch history for a session, newest first.
    pub async fn history(
        &self,
        session_id: &Id,
        page: Option<i64>,
        per_page: Option<i64>,
    ) -> Result<Paginated<PostingBatch>> {
        // Session existence check keeps 404 semantics consistent with the
        // run endpoints.
        self.load_session(session_id).await?;

        let page = page.unwrap_or(1).max(1);
        let per_page = per_page
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let (items, total) = self.store.list_batches(session_id, page, per_page).await?;
        Ok(Paginated::new(items, total, page, per_page))
    }

    /// Cancel every non-cancelled posting in a completed batch and mark
    /// the batch rolled back. Rejected for any other batch status.
    pub async fn rollback(&self, batch_id: &Id) -> Result<RollbackResponse> {
        let batch = self
            .store
            .get_batch(batch_id)
            .await?
            .ok_or_else(|| PostingError::BatchNotFound(batch_id.clone()))?;

        if batch.status != BatchStatus::Completed {
            return Err(PostingError::BatchNotRollbackable {
                batch_id: batch.id,
                status: batch.status,
            });
        }

        let cancelled = self.store.cancel_postings_for_batch(&batch.id).await?;
        self.store
            .update_batch_status(&batch.id, BatchStatus::RolledBack, None, None)
            .await?;
        log::info!("batch {} rolled back: {cancelled} postings cancelled", batch.id);

        Ok(RollbackResponse {
            batch_id: batch.id,
            cancelled,
        })
    }

    /// Read-only view of the current eligibility pool.
    pub async fn eligible(
        &self,
        session_id: &Id,
        priority_enabled: bool,
        faculty_filter: Option<&Id>,
    ) -> Result<Vec<EligibleSupervisor>> {
        let session = self.load_session(session_id).await?;
        let supervisors = self
            .store
            .list_supervisors(&session.institution_id)
            .await?;
        let counts = self
            .store
            .count_active_primary_postings(&session.id)
            .await?;
        Ok(resolve_eligible(
            &session,
            supervisors,
            &counts,
            priority_enabled,
            faculty_filter,
        ))
    }

    /// Read-only view of the unfilled slots a run would see.
    pub async fn open_slots(&self, session_id: &Id) -> Result<Vec<SlotCandidate>> {
        let session = self.load_session(session_id).await?;
        self.derive_session_slots(&session).await
    }

    async fn load_session(&self, session_id: &Id) -> Result<SessionPolicy> {
        self.store
            .get_session(session_id)
            .await?
            .ok_or_else(|| PostingError::SessionNotFound(session_id.clone()))
    }

    async fn compute_run(
        &self,
        session: &SessionPolicy,
        request: &PostingRunRequest,
    ) -> Result<(Vec<EligibleSupervisor>, AssignmentRun)> {
        // Reject before touching the roster or posting tables.
        if request.number_of_postings > session.max_supervision_visits {
            return Err(PostingError::InvalidVisitCount {
                requested: request.number_of_postings,
                max: session.max_supervision_visits,
            });
        }

        let supervisors = self
            .store
            .list_supervisors(&session.institution_id)
            .await?;
        let counts = self
            .store
            .count_active_primary_postings(&session.id)
            .await?;
        let pool = resolve_eligible(
            session,
            supervisors,
            &counts,
            request.priority_enabled,
            request.faculty_filter.as_ref(),
        );

        let slots = self.derive_session_slots(session).await?;
        let run = run_assignment(
            &pool,
            slots,
            request.number_of_postings,
            request.posting_type,
            request.priority_enabled,
        )?;
        Ok((pool, run))
    }

    async fn derive_session_slots(&self, session: &SessionPolicy) -> Result<Vec<SlotCandidate>> {
        let groups = self.store.list_school_groups(&session.id).await?;
        let school_ids: Vec<Id> = groups.iter().map(|g| g.school_id.clone()).unique().collect();
        let schools = self.store.get_schools(&school_ids).await?;
        let merged = self.store.list_active_merged_groups(&session.id).await?;
        let existing = self.store.list_active_slot_keys(&session.id).await?;
        Ok(derive_slots(session, groups, &schools, &merged, &existing))
    }
}
