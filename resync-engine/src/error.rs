//! Error types for resync-engine
//!
//! - [`SyncError`]: failures while submitting or processing a sync operation
//! - [`ApiError`]: HTTP-facing errors rendered as JSON

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::db::StoreError;

/// Sync processing error
///
/// The retry controller retries only the retryable kinds (see
/// [`SyncError::is_retryable`]); everything else fails the operation on the
/// first attempt.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Malformed operation-level input (per-entity problems never surface here)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Store failure (not found / conflict / infrastructure)
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Common library error
    #[error(transparent)]
    Common(#[from] resync_common::Error),

    /// Unrecognized or disabled conflict strategy
    #[error("Conflict resolution error: {0}")]
    ConflictResolution(String),

    /// Retry ceiling reached; the operation is failed and needs resubmission
    #[error("Operation {operation_id} failed after {attempts} attempts: {last_error}")]
    ExhaustedRetries {
        operation_id: Uuid,
        attempts: u32,
        last_error: String,
    },

    /// Payload did not decode into the operation type's shape
    #[error("Invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// Handler panicked mid-operation
    #[error("Handler panicked: {0}")]
    HandlerPanicked(String),
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Store(StoreError::from(err))
    }
}

impl SyncError {
    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Store(StoreError::Infrastructure(_)) => true,
            SyncError::Store(_) => false,
            SyncError::Common(resync_common::Error::Database(_))
            | SyncError::Common(resync_common::Error::Io(_)) => true,
            SyncError::Common(_) => false,
            SyncError::ConflictResolution(_) => true,
            SyncError::HandlerPanicked(_) => true,
            SyncError::Validation(_) | SyncError::Payload(_) => false,
            SyncError::ExhaustedRetries { .. } => false,
        }
    }

    /// SQLite writer contention; the whole transaction may be re-run
    pub fn is_lock_contention(&self) -> bool {
        match self {
            SyncError::Store(store_err) => store_err.is_lock_contention(),
            SyncError::Common(common_err) => common_err.is_lock_contention(),
            _ => false,
        }
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - e.g., resubmitting an operation that has not failed
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Validation(msg) => ApiError::BadRequest(msg),
            SyncError::Payload(e) => ApiError::BadRequest(format!("Invalid payload: {}", e)),
            SyncError::Common(resync_common::Error::InvalidInput(msg)) => ApiError::BadRequest(msg),
            SyncError::Store(StoreError::NotFound(msg)) => ApiError::NotFound(msg),
            SyncError::Store(StoreError::Conflict(msg)) => ApiError::Conflict(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(SyncError::ConflictResolution("mystery".into()).is_retryable());
        assert!(SyncError::Store(StoreError::Infrastructure(sqlx::Error::PoolTimedOut)).is_retryable());
        assert!(SyncError::HandlerPanicked("boom".into()).is_retryable());
        assert!(!SyncError::Validation("bad".into()).is_retryable());
        assert!(!SyncError::Store(StoreError::NotFound("x".into())).is_retryable());
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let api: ApiError = SyncError::Store(StoreError::NotFound("op".into())).into();
        assert!(matches!(api, ApiError::NotFound(_)));
        assert_eq!(api.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_validation_maps_to_400() {
        let api: ApiError = SyncError::Validation("user_id is required".into()).into();
        assert_eq!(api.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_conflict_maps_to_409() {
        let api: ApiError = SyncError::Store(StoreError::Conflict("not failed".into())).into();
        assert_eq!(api.into_response().status(), StatusCode::CONFLICT);
    }
}
