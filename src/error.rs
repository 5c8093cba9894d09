use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use thiserror::Error;

use crate::model::{BatchStatus, Id};

/// Domain errors surfaced by the posting pipeline.
///
/// Capacity exhaustion is deliberately absent: running out of supervisor
/// capacity is reported through run warnings, never as an error.
#[derive(Error, Debug)]
pub enum PostingError {
    #[error("Session not found: {0}")]
    SessionNotFound(Id),

    #[error("Batch not found: {0}")]
    BatchNotFound(Id),

    #[error("number_of_postings {requested} exceeds the session's {max} supervision visits")]
    InvalidVisitCount { requested: i32, max: i32 },

    #[error("Batch {batch_id} cannot be rolled back from status {status:?}")]
    BatchNotRollbackable { batch_id: Id, status: BatchStatus },

    /// Duplicate slot keys in engine output. Should never trigger; kept as
    /// a hard failure so a broken sort/cursor surfaces immediately.
    #[error("Assignment engine invariant violated: {0}")]
    EngineInvariant(String),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PostingError>;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
        }
    }
}

impl PostingError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PostingError::SessionNotFound(_) | PostingError::BatchNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            PostingError::InvalidVisitCount { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            PostingError::BatchNotRollbackable { .. } => StatusCode::CONFLICT,
            PostingError::EngineInvariant(_) | PostingError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for PostingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            log::error!("request failed: {self}");
        }
        (status, Json(ErrorResponse::new(&self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_422() {
        let err = PostingError::InvalidVisitCount {
            requested: 5,
            max: 3,
        };
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn rollback_precondition_maps_to_409() {
        let err = PostingError::BatchNotRollbackable {
            batch_id: "b-1".to_string(),
            status: BatchStatus::RolledBack,
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn not_found_maps_to_404() {
        let err = PostingError::SessionNotFound("sess-x".to_string());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
