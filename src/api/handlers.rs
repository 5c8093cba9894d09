use axum::{
    extract::{Path, Query, State},
    response::Json,
    Json as RequestJson,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{PostingError, Result};
use crate::logic::pipeline::{
    ExecuteResponse, PostingPipeline, PostingRunRequest, PreviewResponse, RollbackResponse,
};
use crate::model::{
    EligibleSupervisor, Id, Paginated, Posting, PostingBatch, SessionPolicy, SlotCandidate,
};
use crate::store::Store;

pub type AppState<S> = Arc<S>;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Deserialize)]
pub struct SessionListQuery {
    pub institution: Option<Id>,
}

pub async fn list_sessions<S: Store>(
    State(store): State<AppState<S>>,
    Query(query): Query<SessionListQuery>,
) -> Result<Json<Vec<SessionPolicy>>> {
    let sessions = store.list_sessions(query.institution.as_ref()).await?;
    Ok(Json(sessions))
}

pub async fn get_session<S: Store>(
    State(store): State<AppState<S>>,
    Path(session_id): Path<Id>,
) -> Result<Json<SessionPolicy>> {
    let session = store
        .get_session(&session_id)
        .await?
        .ok_or(PostingError::SessionNotFound(session_id))?;
    Ok(Json(session))
}

#[derive(Debug, Deserialize)]
pub struct EligibleQuery {
    #[serde(default)]
    pub priority: bool,
    pub faculty: Option<Id>,
}

pub async fn eligible_supervisors<S: Store>(
    State(store): State<AppState<S>>,
    Path(session_id): Path<Id>,
    Query(query): Query<EligibleQuery>,
) -> Result<Json<Vec<EligibleSupervisor>>> {
    let pool = PostingPipeline::new(&*store)
        .eligible(&session_id, query.priority, query.faculty.as_ref())
        .await?;
    Ok(Json(pool))
}

pub async fn open_slots<S: Store>(
    State(store): State<AppState<S>>,
    Path(session_id): Path<Id>,
) -> Result<Json<Vec<SlotCandidate>>> {
    let slots = PostingPipeline::new(&*store).open_slots(&session_id).await?;
    Ok(Json(slots))
}

pub async fn preview_postings<S: Store>(
    State(store): State<AppState<S>>,
    Path(session_id): Path<Id>,
    RequestJson(request): RequestJson<PostingRunRequest>,
) -> Result<Json<PreviewResponse>> {
    let preview = PostingPipeline::new(&*store)
        .preview(&session_id, &request)
        .await?;
    Ok(Json(preview))
}

pub async fn execute_postings<S: Store>(
    State(store): State<AppState<S>>,
    Path(session_id): Path<Id>,
    RequestJson(request): RequestJson<PostingRunRequest>,
) -> Result<Json<ExecuteResponse>> {
    let outcome = PostingPipeline::new(&*store)
        .execute(&session_id, &request)
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

pub async fn list_batches<S: Store>(
    State(store): State<AppState<S>>,
    Path(session_id): Path<Id>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Paginated<PostingBatch>>> {
    let history = PostingPipeline::new(&*store)
        .history(&session_id, query.page, query.per_page)
        .await?;
    Ok(Json(history))
}

#[derive(Debug, Serialize)]
pub struct BatchDetailResponse {
    #[serde(flatten)]
    pub batch: PostingBatch,
    pub postings: Vec<Posting>,
}

pub async fn get_batch<S: Store>(
    State(store): State<AppState<S>>,
    Path(batch_id): Path<Id>,
) -> Result<Json<BatchDetailResponse>> {
    let batch = store
        .get_batch(&batch_id)
        .await?
        .ok_or(PostingError::BatchNotFound(batch_id))?;
    let postings = store.list_postings_for_batch(&batch.id).await?;
    Ok(Json(BatchDetailResponse { batch, postings }))
}

pub async fn rollback_batch<S: Store>(
    State(store): State<AppState<S>>,
    Path(batch_id): Path<Id>,
) -> Result<Json<RollbackResponse>> {
    let result = PostingPipeline::new(&*store).rollback(&batch_id).await?;
    Ok(Json(result))
}
