use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::api::handlers;
use crate::store::Store;

pub fn create_router<S: Store + 'static>() -> Router<Arc<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session snapshots (read-only; the surrounding system owns them)
        .route("/sessions", get(handlers::list_sessions::<S>))
        .route("/sessions/:session_id", get(handlers::get_session::<S>))
        // Read-only views of what a run would see
        .route(
            "/sessions/:session_id/postings/eligible",
            get(handlers::eligible_supervisors::<S>),
        )
        .route(
            "/sessions/:session_id/postings/slots",
            get(handlers::open_slots::<S>),
        )
        // Assignment runs
        .route(
            "/sessions/:session_id/postings/preview",
            post(handlers::preview_postings::<S>),
        )
        .route(
            "/sessions/:session_id/postings/execute",
            post(handlers::execute_postings::<S>),
        )
        // Batch history and rollback
        .route(
            "/sessions/:session_id/postings/batches",
            get(handlers::list_batches::<S>),
        )
        .route(
            "/postings/batches/:batch_id",
            get(handlers::get_batch::<S>),
        )
        .route(
            "/postings/batches/:batch_id/rollback",
            post(handlers::rollback_batch::<S>),
        )
}
