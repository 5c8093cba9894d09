use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::model::{
    AllowanceBreakdown, BatchCriteria, BatchStatus, BatchTotals, Id, LocationCategory,
    MergedGroup, NewPosting, Posting, PostingBatch, PostingStatus, School, SchoolGroup,
    SessionPolicy, SlotKey, Supervisor,
};
use crate::store::traits::{
    BatchStore, MergeStore, PostingStore, PostingUnitOfWork, SchoolStore, SessionStore, Store,
    SupervisorStore, UnitOfWorkSource,
};

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Run the SQL migrations shipped in ./migrations, when present.
    pub async fn migrate(&self) -> Result<()> {
        let dir = Path::new("./migrations");
        if !dir.exists() {
            log::warn!("no ./migrations directory found; assuming schema is managed externally");
            return Ok(());
        }
        let migrator = sqlx::migrate::Migrator::new(dir)
            .await
            .context("Failed to load migrations")?;
        migrator
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn parse_posting_status(raw: &str) -> PostingStatus {
    match raw {
        "cancelled" => PostingStatus::Cancelled,
        _ => PostingStatus::Active,
    }
}

fn posting_status_str(status: PostingStatus) -> &'static str {
    match status {
        PostingStatus::Active => "active",
        PostingStatus::Cancelled => "cancelled",
    }
}

fn parse_location_category(raw: &str) -> LocationCategory {
    match raw {
        "inside" => LocationCategory::Inside,
        _ => LocationCategory::Outside,
    }
}

fn location_category_str(category: LocationCategory) -> &'static str {
    match category {
        LocationCategory::Inside => "inside",
        LocationCategory::Outside => "outside",
    }
}

fn parse_batch_status(raw: &str) -> BatchStatus {
    match raw {
        "completed" => BatchStatus::Completed,
        "failed" => BatchStatus::Failed,
        "rolled_back" => BatchStatus::RolledBack,
        _ => BatchStatus::Processing,
    }
}

fn posting_from_row(row: &PgRow) -> Posting {
    let status: String = row.get("status");
    let location_category: String = row.get("location_category");
    Posting {
        id: row.get("id"),
        session_id: row.get("session_id"),
        supervisor_id: row.get("supervisor_id"),
        school_id: row.get("school_id"),
        group_number: row.get("group_number"),
        visit_number: row.get("visit_number"),
        distance_km: row.get("distance_km"),
        allowance: AllowanceBreakdown {
            transport: row.get("transport"),
            dsa: row.get("dsa"),
            dta: row.get("dta"),
            local_running: row.get("local_running"),
            tetfund: row.get("tetfund"),
            total: row.get("total"),
            location_category: parse_location_category(&location_category),
        },
        status: parse_posting_status(&status),
        batch_id: row.get("batch_id"),
        merged_with_posting_id: row.get("merged_with_posting_id"),
        created_at: row.get("created_at"),
    }
}

fn batch_from_row(row: &PgRow) -> Result<PostingBatch> {
    let status: String = row.get("status");
    let criteria: BatchCriteria = serde_json::from_value(row.get("criteria"))
        .context("Failed to deserialize batch criteria")?;
    Ok(PostingBatch {
        id: row.get("id"),
        session_id: row.get("session_id"),
        criteria,
        status: parse_batch_status(&status),
        assigned_count: row.get("assigned_count"),
        skipped_count: row.get("skipped_count"),
        posting_count: row.get("posting_count"),
        error: row.get("error"),
        requested_by: row.get("requested_by"),
        created_at: row.get("created_at"),
        completed_at: row.get("completed_at"),
    })
}

const POSTING_COLUMNS: &str = "id, session_id, supervisor_id, school_id, group_number, \
     visit_number, distance_km, transport, dsa, dta, local_running, tetfund, total, \
     location_category, status, batch_id, merged_with_posting_id, created_at";

#[async_trait::async_trait]
impl SessionStore for PostgresStore {
    async fn get_session(&self, id: &Id) -> Result<Option<SessionPolicy>> {
        let row = sqlx::query(
            "SELECT id, institution_id, name, max_posting_per_supervisor, max_supervision_visits, \
             inside_distance_threshold_km, dsa_enabled, dsa_min_distance_km, dsa_max_distance_km, \
             dsa_percentage, active \
             FROM sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch session")?;

        Ok(row.map(|row| SessionPolicy {
            id: row.get("id"),
            institution_id: row.get("institution_id"),
            name: row.get("name"),
            max_posting_per_supervisor: row.get("max_posting_per_supervisor"),
            max_supervision_visits: row.get("max_supervision_visits"),
            inside_distance_threshold_km: row.get("inside_distance_threshold_km"),
            dsa_enabled: row.get("dsa_enabled"),
            dsa_min_distance_km: row.get("dsa_min_distance_km"),
            dsa_max_distance_km: row.get("dsa_max_distance_km"),
            dsa_percentage: row.get("dsa_percentage"),
            active: row.get("active"),
        }))
    }

    async fn list_sessions(&self, institution_id: Option<&Id>) -> Result<Vec<SessionPolicy>> {
        let rows = sqlx::query(
            "SELECT id, institution_id, name, max_posting_per_supervisor, max_supervision_visits, \
             inside_distance_threshold_km, dsa_enabled, dsa_min_distance_km, dsa_max_distance_km, \
             dsa_percentage, active \
             FROM sessions WHERE ($1::text IS NULL OR institution_id = $1) ORDER BY name",
        )
        .bind(institution_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list sessions")?;

        Ok(rows
            .into_iter()
            .map(|row| SessionPolicy {
                id: row.get("id"),
                institution_id: row.get("institution_id"),
                name: row.get("name"),
                max_posting_per_supervisor: row.get("max_posting_per_supervisor"),
                max_supervision_visits: row.get("max_supervision_visits"),
                inside_distance_threshold_km: row.get("inside_distance_threshold_km"),
                dsa_enabled: row.get("dsa_enabled"),
                dsa_min_distance_km: row.get("dsa_min_distance_km"),
                dsa_max_distance_km: row.get("dsa_max_distance_km"),
                dsa_percentage: row.get("dsa_percentage"),
                active: row.get("active"),
            })
            .collect())
    }
}

fn supervisor_from_row(row: &PgRow) -> Supervisor {
    Supervisor {
        id: row.get("id"),
        institution_id: row.get("institution_id"),
        faculty_id: row.get("faculty_id"),
        name: row.get("name"),
        priority_number: row.get("priority_number"),
        active: row.get("active"),
        is_staff: row.get("is_staff"),
        rates: crate::model::AllowanceRates {
            transport_per_km: row.get("transport_per_km"),
            dta_rate: row.get("dta_rate"),
            tetfund_rate: row.get("tetfund_rate"),
            local_running_rate: row.get("local_running_rate"),
        },
    }
}

#[async_trait::async_trait]
impl SupervisorStore for PostgresStore {
    async fn list_supervisors(&self, institution_id: &Id) -> Result<Vec<Supervisor>> {
        let rows = sqlx::query(
            "SELECT id, institution_id, faculty_id, name, priority_number, active, is_staff, \
             transport_per_km, dta_rate, tetfund_rate, local_running_rate \
             FROM supervisors WHERE institution_id = $1 ORDER BY id",
        )
        .bind(institution_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list supervisors")?;

        Ok(rows.iter().map(supervisor_from_row).collect())
    }

    async fn get_supervisors(&self, ids: &[Id]) -> Result<HashMap<Id, Supervisor>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query(
            "SELECT id, institution_id, faculty_id, name, priority_number, active, is_staff, \
             transport_per_km, dta_rate, tetfund_rate, local_running_rate \
             FROM supervisors WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch supervisors")?;

        Ok(rows
            .iter()
            .map(|row| {
                let supervisor = supervisor_from_row(row);
                (supervisor.id.clone(), supervisor)
            })
            .collect())
    }

    async fn count_active_primary_postings(&self, session_id: &Id) -> Result<HashMap<Id, i64>> {
        let rows = sqlx::query(
            "SELECT supervisor_id, COUNT(*) AS posting_count FROM postings \
             WHERE session_id = $1 AND status = 'active' AND merged_with_posting_id IS NULL \
             GROUP BY supervisor_id",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to count active postings")?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get("supervisor_id"), row.get("posting_count")))
            .collect())
    }
}

#[async_trait::async_trait]
impl SchoolStore for PostgresStore {
    async fn get_schools(&self, ids: &[Id]) -> Result<HashMap<Id, School>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query(
            "SELECT id, institution_id, name, distance_km, route_id, lga \
             FROM schools WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch schools")?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let school = School {
                    id: row.get("id"),
                    institution_id: row.get("institution_id"),
                    name: row.get("name"),
                    distance_km: row.get("distance_km"),
                    route_id: row.get("route_id"),
                    lga: row.get("lga"),
                };
                (school.id.clone(), school)
            })
            .collect())
    }

    async fn list_school_groups(&self, session_id: &Id) -> Result<Vec<SchoolGroup>> {
        let rows = sqlx::query(
            "SELECT DISTINCT school_id, group_number FROM group_acceptances \
             WHERE session_id = $1 AND status = 'approved' \
             ORDER BY school_id, group_number",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list school groups")?;

        Ok(rows
            .into_iter()
            .map(|row| SchoolGroup {
                school_id: row.get("school_id"),
                group_number: row.get("group_number"),
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl MergeStore for PostgresStore {
    async fn list_active_merged_groups(&self, session_id: &Id) -> Result<Vec<MergedGroup>> {
        let rows = sqlx::query(
            "SELECT id, session_id, primary_school_id, primary_group_number, \
             secondary_school_id, secondary_group_number, active \
             FROM merged_groups WHERE session_id = $1 AND active = TRUE",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list merged groups")?;

        Ok(rows
            .into_iter()
            .map(|row| MergedGroup {
                id: row.get("id"),
                session_id: row.get("session_id"),
                primary_school_id: row.get("primary_school_id"),
                primary_group_number: row.get("primary_group_number"),
                secondary_school_id: row.get("secondary_school_id"),
                secondary_group_number: row.get("secondary_group_number"),
                active: row.get("active"),
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl PostingStore for PostgresStore {
    async fn list_active_slot_keys(&self, session_id: &Id) -> Result<HashSet<SlotKey>> {
        let rows = sqlx::query(
            "SELECT school_id, group_number, visit_number FROM postings \
             WHERE session_id = $1 AND status = 'active'",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list active slot keys")?;

        Ok(rows
            .into_iter()
            .map(|row| {
                SlotKey::new(
                    row.get::<String, _>("school_id"),
                    row.get("group_number"),
                    row.get("visit_number"),
                )
            })
            .collect())
    }

    async fn list_postings_for_batch(&self, batch_id: &Id) -> Result<Vec<Posting>> {
        let rows = sqlx::query(&format!(
            "SELECT {POSTING_COLUMNS} FROM postings WHERE batch_id = $1 ORDER BY created_at, id"
        ))
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list batch postings")?;

        Ok(rows.iter().map(posting_from_row).collect())
    }

    async fn cancel_postings_for_batch(&self, batch_id: &Id) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE postings SET status = 'cancelled' WHERE batch_id = $1 AND status = 'active'",
        )
        .bind(batch_id)
        .execute(&self.pool)
        .await
        .context("Failed to cancel batch postings")?;

        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl BatchStore for PostgresStore {
    async fn create_batch(&self, batch: PostingBatch) -> Result<()> {
        let criteria =
            serde_json::to_value(&batch.criteria).context("Failed to serialize batch criteria")?;
        sqlx::query(
            "INSERT INTO posting_batches (id, session_id, criteria, status, assigned_count, \
             skipped_count, posting_count, error, requested_by, created_at, completed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(&batch.id)
        .bind(&batch.session_id)
        .bind(criteria)
        .bind(batch.status.as_str())
        .bind(batch.assigned_count)
        .bind(batch.skipped_count)
        .bind(batch.posting_count)
        .bind(&batch.error)
        .bind(&batch.requested_by)
        .bind(batch.created_at)
        .bind(batch.completed_at)
        .execute(&self.pool)
        .await
        .context("Failed to create batch")?;

        Ok(())
    }

    async fn get_batch(&self, id: &Id) -> Result<Option<PostingBatch>> {
        let row = sqlx::query(
            "SELECT id, session_id, criteria, status, assigned_count, skipped_count, \
             posting_count, error, requested_by, created_at, completed_at \
             FROM posting_batches WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch batch")?;

        row.map(|row| batch_from_row(&row)).transpose()
    }

    async fn update_batch_status(
        &self,
        id: &Id,
        status: BatchStatus,
        totals: Option<BatchTotals>,
        error: Option<String>,
    ) -> Result<()> {
        let current = self
            .get_batch(id)
            .await?
            .ok_or_else(|| anyhow!("Batch not found: {id}"))?;
        if !current.status.can_transition_to(status) {
            return Err(anyhow!(
                "invalid batch status transition: {} -> {}",
                current.status.as_str(),
                status.as_str()
            ));
        }

        let totals = totals.unwrap_or(BatchTotals {
            assigned_count: current.assigned_count,
            skipped_count: current.skipped_count,
            posting_count: current.posting_count,
        });
        // Guarded on the previous status so a concurrent transition loses
        // cleanly instead of overwriting.
        let result = sqlx::query(
            "UPDATE posting_batches SET status = $2, assigned_count = $3, skipped_count = $4, \
             posting_count = $5, error = $6, completed_at = $7 \
             WHERE id = $1 AND status = $8",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(totals.assigned_count)
        .bind(totals.skipped_count)
        .bind(totals.posting_count)
        .bind(&error)
        .bind(Utc::now())
        .bind(current.status.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to update batch status")?;

        if result.rows_affected() == 0 {
            return Err(anyhow!("batch {id} status changed concurrently"));
        }
        Ok(())
    }

    async fn list_batches(
        &self,
        session_id: &Id,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<PostingBatch>, i64)> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM posting_batches WHERE session_id = $1")
                .bind(session_id)
                .fetch_one(&self.pool)
                .await
                .context("Failed to count batches")?;

        let rows = sqlx::query(
            "SELECT id, session_id, criteria, status, assigned_count, skipped_count, \
             posting_count, error, requested_by, created_at, completed_at \
             FROM posting_batches WHERE session_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
        )
        .bind(session_id)
        .bind(per_page)
        .bind((page - 1) * per_page)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list batches")?;

        let batches = rows
            .iter()
            .map(batch_from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok((batches, total))
    }
}

/// Unit of work backed by one Postgres transaction. Reads go through the
/// transaction, so earlier inserts in the same unit are visible to the
/// commit-time guards; nothing is visible externally until `commit`.
pub struct PgUnit {
    tx: Transaction<'static, Postgres>,
}

#[async_trait::async_trait]
impl PostingUnitOfWork for PgUnit {
    async fn find_active_posting(
        &mut self,
        session_id: &Id,
        key: &SlotKey,
    ) -> Result<Option<Posting>> {
        let row = sqlx::query(&format!(
            "SELECT {POSTING_COLUMNS} FROM postings \
             WHERE session_id = $1 AND school_id = $2 AND group_number = $3 \
             AND visit_number = $4 AND status = 'active' LIMIT 1"
        ))
        .bind(session_id)
        .bind(&key.school_id)
        .bind(key.group_number)
        .bind(key.visit_number)
        .fetch_optional(&mut *self.tx)
        .await
        .context("Failed to check slot for existing posting")?;

        Ok(row.as_ref().map(posting_from_row))
    }

    async fn count_active_primary(&mut self, session_id: &Id, supervisor_id: &Id) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM postings \
             WHERE session_id = $1 AND supervisor_id = $2 AND status = 'active' \
             AND merged_with_posting_id IS NULL",
        )
        .bind(session_id)
        .bind(supervisor_id)
        .fetch_one(&mut *self.tx)
        .await
        .context("Failed to count supervisor postings")?;

        Ok(count)
    }

    async fn insert_posting(&mut self, posting: NewPosting) -> Result<Posting> {
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

        sqlx::query(
            "INSERT INTO postings (id, session_id, supervisor_id, school_id, group_number, \
             visit_number, distance_km, transport, dsa, dta, local_running, tetfund, total, \
             location_category, status, batch_id, merged_with_posting_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)",
        )
        .bind(&row.id)
        .bind(&row.session_id)
        .bind(&row.supervisor_id)
        .bind(&row.school_id)
        .bind(row.group_number)
        .bind(row.visit_number)
        .bind(row.distance_km)
        .bind(row.allowance.transport)
        .bind(row.allowance.dsa)
        .bind(row.allowance.dta)
        .bind(row.allowance.local_running)
        .bind(row.allowance.tetfund)
        .bind(row.allowance.total)
        .bind(location_category_str(row.allowance.location_category))
        .bind(posting_status_str(row.status))
        .bind(&row.batch_id)
        .bind(&row.merged_with_posting_id)
        .bind(row.created_at)
        .execute(&mut *self.tx)
        .await
        .context("Failed to insert posting")?;

        Ok(row)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .commit()
            .await
            .context("Failed to commit posting transaction")
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx
            .rollback()
            .await
            .context("Failed to roll back posting transaction")
    }
}

#[async_trait::async_trait]
impl UnitOfWorkSource for PostgresStore {
    async fn begin_unit(&self) -> Result<Box<dyn PostingUnitOfWork + '_>> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin posting transaction")?;
        Ok(Box::new(PgUnit { tx }))
    }
}

impl Store for PostgresStore {}
