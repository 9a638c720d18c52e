//! Sync operation API handlers
//!
//! POST /sync/operations, GET /sync/operations/:id,
//! POST /sync/operations/:id/resubmit, GET /sync/users/:user_id/operations

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use resync_common::db::{OperationStatus, OperationType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::engine::OperationStatusReport;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// POST /sync/operations request
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub user_id: String,
    pub operation_type: String,
    #[serde(default)]
    pub payload: Value,
}

/// Response for accepted submissions
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub operation_id: Uuid,
    pub status: OperationStatus,
}

/// GET /sync/users/:user_id/operations query
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub user_id: String,
    pub operations: Vec<OperationStatusReport>,
}

/// POST /sync/operations
///
/// Enqueue an operation. Returns 202 Accepted; processing is asynchronous.
pub async fn submit_operation(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let operation_type = request
        .operation_type
        .parse::<OperationType>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let operation_id = state
        .engine
        .submit(&request.user_id, operation_type, request.payload)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            operation_id,
            status: OperationStatus::Pending,
        }),
    ))
}

/// GET /sync/operations/:id
pub async fn get_operation(
    State(state): State<AppState>,
    Path(operation_id): Path<Uuid>,
) -> ApiResult<Json<OperationStatusReport>> {
    Ok(Json(state.engine.status(operation_id).await?))
}

/// POST /sync/operations/:id/resubmit
///
/// 409 unless the operation is `failed`.
pub async fn resubmit_operation(
    State(state): State<AppState>,
    Path(operation_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let new_id = state.engine.resubmit(operation_id).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            operation_id: new_id,
            status: OperationStatus::Pending,
        }),
    ))
}

/// GET /sync/users/:user_id/operations?status=failed
pub async fn list_user_operations(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<ListResponse>> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<OperationStatus>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let operations = state
        .engine
        .list_for_user(&user_id, status, query.limit)
        .await?;

    Ok(Json(ListResponse { user_id, operations }))
}

/// Build sync operation routes
pub fn operation_routes() -> Router<AppState> {
    Router::new()
        .route("/sync/operations", post(submit_operation))
        .route("/sync/operations/:id", get(get_operation))
        .route("/sync/operations/:id/resubmit", post(resubmit_operation))
        .route("/sync/users/:user_id/operations", get(list_user_operations))
}
