use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use serde::Serialize;

use crate::error::{PostingError, Result};
use crate::logic::allowance::calculate_allowance;
use crate::model::{
    Assignment, AssignmentRun, BatchStatus, BatchTotals, Id, MergedGroup, NewPosting, Posting,
    PostingBatch, School, SessionPolicy, SkipReason, SkippedAssignment, SlotKey, Supervisor,
};
use crate::store::{PostingUnitOfWork, Store};

/// What one commit call produced.
#[derive(Debug, Clone, Serialize)]
pub struct CommitOutcome {
    pub batch_id: Id,
    /// Every posting written, dependents included.
    pub created: Vec<Posting>,
    pub skipped: Vec<SkippedAssignment>,
    pub dependents_created: usize,
}

/// Transactional persistence of an engine run.
///
/// Availability and capacity are re-validated per assignment at write time,
/// so two concurrent executes for the same session are tolerated without
/// locking: the later one skips whatever the earlier one claimed. Only a
/// storage-level fault aborts; validation skips are recorded and the batch
/// still completes.
pub struct CommitCoordinator<'a, S: Store> {
    store: &'a S,
}

impl<'a, S: Store> CommitCoordinator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub async fn execute(
        &self,
        session: &SessionPolicy,
        batch: &PostingBatch,
        run: &AssignmentRun,
    ) -> Result<CommitOutcome> {
        let merged = self.store.list_active_merged_groups(&session.id).await?;
        let (supervisors, schools) = self.prefetch(&run.assignments, &merged).await?;

        let mut unit = self.store.begin_unit().await?;
        let loop_result = commit_loop(
            &mut *unit,
            session,
            &batch.id,
            &run.assignments,
            &supervisors,
            &schools,
            &merged,
        )
        .await;

        match loop_result {
            Ok((created, skipped, dependents_created)) => {
                if let Err(commit_err) = unit.commit().await {
                    let err = PostingError::Storage(commit_err);
                    self.mark_failed(&batch.id, &err).await;
                    return Err(err);
                }

                let totals = BatchTotals {
                    assigned_count: run.assignments.len() as i64,
                    skipped_count: skipped.len() as i64,
                    posting_count: created.len() as i64,
                };
                // Outside the data transaction: the audit record settles
                // even if a later reader races us.
                self.store
                    .update_batch_status(&batch.id, BatchStatus::Completed, Some(totals), None)
                    .await?;

                log::info!(
                    "batch {} committed: {} postings ({} dependents), {} skipped",
                    batch.id,
                    created.len(),
                    dependents_created,
                    skipped.len()
                );
                Ok(CommitOutcome {
                    batch_id: batch.id.clone(),
                    created,
                    skipped,
                    dependents_created,
                })
            }
            Err(err) => {
                let _ = unit.rollback().await;
                self.mark_failed(&batch.id, &err).await;
                Err(err)
            }
        }
    }

    async fn mark_failed(&self, batch_id: &Id, err: &PostingError) {
        if let Err(status_err) = self
            .store
            .update_batch_status(batch_id, BatchStatus::Failed, None, Some(err.to_string()))
            .await
        {
            log::error!("batch {batch_id} failed and could not be marked: {status_err}");
        }
    }

    /// Fetch every supervisor and school the loop will touch, once, keyed
    /// by id. Schools on the secondary side of a merge are included so
    /// dependent postings get a real distance.
    async fn prefetch(
        &self,
        assignments: &[Assignment],
        merged: &[MergedGroup],
    ) -> Result<(HashMap<Id, Supervisor>, HashMap<Id, School>)> {
        let supervisor_ids: Vec<Id> = assignments
            .iter()
            .map(|a| a.supervisor_id.clone())
            .unique()
            .collect();
        let school_ids: Vec<Id> = assignments
            .iter()
            .map(|a| a.slot.key.school_id.clone())
            .chain(merged.iter().map(|m| m.secondary_school_id.clone()))
            .unique()
            .collect();

        let supervisors = self.store.get_supervisors(&supervisor_ids).await?;
        let schools = self.store.get_schools(&school_ids).await?;
        Ok((supervisors, schools))
    }
}

async fn commit_loop(
    unit: &mut (dyn PostingUnitOfWork + '_),
    session: &SessionPolicy,
    batch_id: &Id,
    assignments: &[Assignment],
    supervisors: &HashMap<Id, Supervisor>,
    schools: &HashMap<Id, School>,
    merged: &[MergedGroup],
) -> Result<(Vec<Posting>, Vec<SkippedAssignment>, usize)> {
    let cap = session.supervision_cap();
    let mut created: Vec<Posting> = Vec::new();
    let mut skipped: Vec<SkippedAssignment> = Vec::new();
    let mut used_keys: HashSet<SlotKey> = HashSet::new();
    let mut dependents_created = 0_usize;

    let skip = |list: &mut Vec<SkippedAssignment>, assignment: &Assignment, reason: SkipReason| {
        log::warn!(
            "skipping slot {} for {}: {}",
            assignment.slot.key,
            assignment.supervisor_id,
            reason
        );
        list.push(SkippedAssignment {
            slot: assignment.slot.key.clone(),
            supervisor_id: assignment.supervisor_id.clone(),
            reason,
        });
    };

    for assignment in assignments {
        let key = assignment.slot.key.clone();

        let Some(supervisor) = supervisors.get(&assignment.supervisor_id) else {
            skip(&mut skipped, assignment, SkipReason::MissingSupervisor);
            continue;
        };
        let Some(school) = schools.get(&key.school_id) else {
            skip(&mut skipped, assignment, SkipReason::MissingSchool);
            continue;
        };
        if used_keys.contains(&key) {
            skip(&mut skipped, assignment, SkipReason::DuplicateInBatch);
            continue;
        }
        // Guard against concurrent writers: the slot may have been filled
        // since the engine computed the run.
        if unit.find_active_posting(&session.id, &key).await?.is_some() {
            skip(&mut skipped, assignment, SkipReason::SlotAlreadyFilled);
            continue;
        }
        // Second capacity guard, closing the same race on the supervisor
        // side. Counts include primaries written earlier in this unit.
        let current = unit
            .count_active_primary(&session.id, &supervisor.id)
            .await?;
        if current >= cap {
            skip(&mut skipped, assignment, SkipReason::CapacityReached);
            continue;
        }

        let allowance =
            calculate_allowance(&supervisor.rates, assignment.slot.distance_km, session, false);
        let primary = unit
            .insert_posting(NewPosting {
                session_id: session.id.clone(),
                supervisor_id: supervisor.id.clone(),
                school_id: key.school_id.clone(),
                group_number: key.group_number,
                visit_number: key.visit_number,
                distance_km: assignment.slot.distance_km,
                allowance,
                batch_id: batch_id.clone(),
                merged_with_posting_id: None,
            })
            .await?;
        used_keys.insert(key.clone());
        let primary_id = primary.id.clone();
        created.push(primary);

        // Zero-allowance dependents for every active merge whose primary
        // side is this (school, group).
        for relation in merged
            .iter()
            .filter(|m| m.primary_matches(&school.id, key.group_number))
        {
            let secondary_key = SlotKey::new(
                relation.secondary_school_id.clone(),
                relation.secondary_group_number,
                key.visit_number,
            );
            if used_keys.contains(&secondary_key) {
                continue;
            }
            if unit
                .find_active_posting(&session.id, &secondary_key)
                .await?
                .is_some()
            {
                continue;
            }
            let Some(secondary_school) = schools.get(&relation.secondary_school_id) else {
                log::warn!(
                    "merge {} skipped: secondary school {} missing",
                    relation.id,
                    relation.secondary_school_id
                );
                continue;
            };

            let dependent_allowance = calculate_allowance(
                &supervisor.rates,
                secondary_school.distance_km,
                session,
                true,
            );
            let dependent = unit
                .insert_posting(NewPosting {
                    session_id: session.id.clone(),
                    supervisor_id: supervisor.id.clone(),
                    school_id: relation.secondary_school_id.clone(),
                    group_number: relation.secondary_group_number,
                    visit_number: key.visit_number,
                    distance_km: secondary_school.distance_km,
                    allowance: dependent_allowance,
                    batch_id: batch_id.clone(),
                    merged_with_posting_id: Some(primary_id.clone()),
                })
                .await?;
            used_keys.insert(secondary_key);
            dependents_created += 1;
            created.push(dependent);
        }
    }

    Ok((created, skipped, dependents_created))
}
