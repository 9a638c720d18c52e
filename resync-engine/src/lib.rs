//! resync-engine library interface
//!
//! Offline sync reconciliation: clients enqueue operations captured while
//! disconnected, workers apply them to shared storage idempotently, and the
//! retry controller bounds how often a failing operation is re-attempted.

pub mod api;
pub mod conflict;
pub mod db;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod models;
pub mod retry;
pub mod utils;
pub mod worker;

pub use crate::engine::{OperationStatusReport, SyncEngine};
pub use crate::error::{ApiError, ApiResult, SyncError};

use axum::Router;
use chrono::{DateTime, Utc};
use resync_common::config::SyncSettings;
use resync_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tower_http::trace::TraceLayer;

use crate::conflict::ConflictResolver;
use crate::db::SyncQueue;
use crate::handlers::SyncHandlers;
use crate::retry::{RetryController, RetryPolicy};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: SyncEngine,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(engine: SyncEngine, event_bus: EventBus) -> Self {
        Self {
            engine,
            event_bus,
            startup_time: Utc::now(),
        }
    }
}

/// Submission and processing halves wired to one store and event bus
pub struct SyncServices {
    pub engine: SyncEngine,
    pub controller: Arc<RetryController>,
}

impl SyncServices {
    /// Build the engine and retry controller from `[sync]` settings
    pub fn build(
        pool: SqlitePool,
        settings: &SyncSettings,
        event_bus: EventBus,
    ) -> resync_common::Result<Self> {
        let resolver = Arc::new(ConflictResolver::from_settings(settings)?);
        let queue = SyncQueue::new(pool.clone());

        let handlers = SyncHandlers::new(pool, resolver, settings.max_lock_wait_ms);
        let policy = RetryPolicy::new(
            settings.max_retries,
            Duration::from_millis(settings.backoff_unit_ms),
        );
        let controller = Arc::new(
            RetryController::new(queue.clone(), Arc::new(handlers), policy, event_bus.clone())
                .with_lease(Duration::from_millis(settings.processing_lease_ms))
                .with_max_lock_wait_ms(settings.max_lock_wait_ms),
        );

        let engine = SyncEngine::new(queue, event_bus, Arc::new(Notify::new()));

        Ok(Self { engine, controller })
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::operation_routes())
        .route("/events", get(api::sync_event_stream))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
