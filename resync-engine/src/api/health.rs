//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use resync_common::db::OperationStatus;
use serde::Serialize;
use tracing::warn;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when the store cannot be queried
    pub status: String,
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    pub uptime_seconds: u64,
    /// Operations waiting to be claimed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_operations: Option<i64>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let pending_operations = match state.engine.queue().count_by_status(OperationStatus::Pending).await {
        Ok(count) => Some(count),
        Err(e) => {
            warn!(error = %e, "Health check could not query the sync queue");
            None
        }
    };

    Json(HealthResponse {
        status: (if pending_operations.is_some() { "ok" } else { "degraded" }).to_string(),
        module: "resync-engine".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        pending_operations,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
