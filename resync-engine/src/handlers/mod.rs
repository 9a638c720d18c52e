//! Operation handlers
//!
//! One handler per operation type. Each run executes inside a single store
//! transaction: either everything the handler wrote is committed, or
//! nothing is. Per-entity problems are recorded in the summary and never
//! abort the batch; only operation-level problems return an error.

pub mod baseline;
pub mod conversation;
pub mod emotion;
pub mod preference;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use resync_common::db::SyncOperation;
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::conflict::ConflictResolver;
use crate::error::SyncError;
use crate::models::{SyncPayload, SyncSummary};
use crate::utils::retry_on_lock;

pub use baseline::merge_session_count;

/// What a handler knows about the operation it is applying
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub operation_id: Uuid,
    pub user_id: String,
    /// Submission time; stands in for absent client timestamps
    pub submitted_at: DateTime<Utc>,
}

impl From<&SyncOperation> for OperationContext {
    fn from(operation: &SyncOperation) -> Self {
        Self {
            operation_id: operation.id,
            user_id: operation.user_id.clone(),
            submitted_at: operation.created_at,
        }
    }
}

/// Outcome of one handler run as seen by the retry controller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerReport {
    pub success: bool,
    pub summary: Option<Value>,
    pub error: Option<String>,
}

impl HandlerReport {
    pub fn succeeded(summary: Value) -> Self {
        Self {
            success: true,
            summary: Some(summary),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            summary: None,
            error: Some(error.into()),
        }
    }
}

/// Applies one claimed operation
///
/// The retry controller only depends on this trait, so tests can drive it
/// with executors that fail or panic on demand.
pub trait OperationExecutor: Send + Sync {
    fn execute<'a>(
        &'a self,
        operation: &'a SyncOperation,
    ) -> BoxFuture<'a, Result<HandlerReport, SyncError>>;
}

/// Store-backed executor dispatching to the per-type handlers
#[derive(Debug, Clone)]
pub struct SyncHandlers {
    pool: SqlitePool,
    resolver: Arc<ConflictResolver>,
    max_lock_wait_ms: u64,
}

impl SyncHandlers {
    pub fn new(pool: SqlitePool, resolver: Arc<ConflictResolver>, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            resolver,
            max_lock_wait_ms,
        }
    }

    /// Apply a decoded payload, re-running the transaction on lock contention
    pub async fn handle(
        &self,
        context: &OperationContext,
        payload: &SyncPayload,
    ) -> Result<SyncSummary, SyncError> {
        let operation_name = payload.operation_type().as_str();
        retry_on_lock(operation_name, self.max_lock_wait_ms, || {
            self.apply_once(context, payload)
        })
        .await
    }

    async fn apply_once(
        &self,
        context: &OperationContext,
        payload: &SyncPayload,
    ) -> Result<SyncSummary, SyncError> {
        let mut tx = self.pool.begin().await?;

        let summary = match payload {
            SyncPayload::Conversation(p) => conversation::apply(&mut tx, context, p).await?,
            SyncPayload::Emotion(p) => emotion::apply(&mut tx, context, p).await?,
            SyncPayload::Baseline(p) => baseline::apply(&mut tx, context, &self.resolver, p).await?,
            SyncPayload::Preference(p) => {
                preference::apply(&mut tx, context, &self.resolver, p).await?
            }
        };

        tx.commit().await?;

        debug!(
            operation_id = %context.operation_id,
            operation_type = %payload.operation_type(),
            "Handler transaction committed"
        );

        Ok(summary)
    }
}

impl OperationExecutor for SyncHandlers {
    fn execute<'a>(
        &'a self,
        operation: &'a SyncOperation,
    ) -> BoxFuture<'a, Result<HandlerReport, SyncError>> {
        Box::pin(async move {
            let payload = SyncPayload::decode(operation.operation_type, &operation.payload)?;
            let context = OperationContext::from(operation);
            let summary = self.handle(&context, &payload).await?;
            Ok(HandlerReport::succeeded(serde_json::to_value(&summary)?))
        })
    }
}

/// Rejection reason for an entry that did not decode
pub(crate) fn malformed_reason(raw: &Value) -> String {
    if raw.is_object() {
        "entry has fields of the wrong type".to_string()
    } else {
        "entry must be a JSON object".to_string()
    }
}
