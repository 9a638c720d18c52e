//! Sync engine facade
//!
//! Submission side of the queue: validates and enqueues operations, wakes
//! idle workers, and reports operation status.

use chrono::{DateTime, Utc};
use resync_common::db::{OperationStatus, OperationType, SyncOperation};
use resync_common::events::{EventBus, SyncEvent};
use resync_common::time::now;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;
use uuid::Uuid;

use crate::db::{SyncQueue, StoreError};
use crate::error::SyncError;
use crate::models::SyncPayload;

/// Default page size for per-user listings
pub const DEFAULT_LIST_LIMIT: u32 = 100;

/// Status of one operation as reported to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationStatusReport {
    pub operation_id: Uuid,
    pub user_id: String,
    pub operation_type: OperationType,
    pub status: OperationStatus,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resubmitted_from: Option<Uuid>,
}

impl From<SyncOperation> for OperationStatusReport {
    fn from(operation: SyncOperation) -> Self {
        Self {
            operation_id: operation.id,
            user_id: operation.user_id,
            operation_type: operation.operation_type,
            status: operation.status,
            retry_count: operation.retry_count,
            created_at: operation.created_at,
            processed_at: operation.processed_at,
            last_error: operation.last_error,
            summary: operation.summary,
            resubmitted_from: operation.resubmitted_from,
        }
    }
}

#[derive(Clone)]
pub struct SyncEngine {
    queue: SyncQueue,
    event_bus: EventBus,
    notify: Arc<Notify>,
}

impl SyncEngine {
    pub fn new(queue: SyncQueue, event_bus: EventBus, notify: Arc<Notify>) -> Self {
        Self {
            queue,
            event_bus,
            notify,
        }
    }

    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    /// Notification handle shared with the worker pool
    pub fn notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.notify)
    }

    /// Validate and enqueue an operation
    ///
    /// The payload must decode for its operation type; it is stored as
    /// submitted.
    pub async fn submit(
        &self,
        user_id: &str,
        operation_type: OperationType,
        payload: Value,
    ) -> Result<Uuid, SyncError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(SyncError::Validation("user_id is required".to_string()));
        }

        SyncPayload::decode(operation_type, &payload)?;

        let operation = self.queue.enqueue(user_id, operation_type, &payload, None).await?;
        self.announce(&operation);

        Ok(operation.id)
    }

    /// Current status of an operation
    pub async fn status(&self, operation_id: Uuid) -> Result<OperationStatusReport, SyncError> {
        Ok(self.queue.get(operation_id).await?.into())
    }

    /// Operations of a user, newest first
    pub async fn list_for_user(
        &self,
        user_id: &str,
        status: Option<OperationStatus>,
        limit: Option<u32>,
    ) -> Result<Vec<OperationStatusReport>, SyncError> {
        let operations = self
            .queue
            .list_for_user(user_id, status, limit.unwrap_or(DEFAULT_LIST_LIMIT))
            .await?;
        Ok(operations.into_iter().map(Into::into).collect())
    }

    /// Re-enqueue a failed operation as a new operation
    ///
    /// The failed entry stays in place as the audit record; the new entry
    /// starts with a fresh retry budget.
    pub async fn resubmit(&self, operation_id: Uuid) -> Result<Uuid, SyncError> {
        let failed = self.queue.get(operation_id).await?;

        if failed.status != OperationStatus::Failed {
            return Err(SyncError::Store(StoreError::Conflict(format!(
                "operation {} is {}, only failed operations can be resubmitted",
                operation_id, failed.status
            ))));
        }

        let operation = self
            .queue
            .enqueue(
                &failed.user_id,
                failed.operation_type,
                &failed.payload,
                Some(failed.id),
            )
            .await?;

        info!(
            operation_id = %operation.id,
            resubmitted_from = %failed.id,
            "Failed operation resubmitted"
        );
        self.announce(&operation);

        Ok(operation.id)
    }

    fn announce(&self, operation: &SyncOperation) {
        info!(
            operation_id = %operation.id,
            user_id = %operation.user_id,
            operation_type = %operation.operation_type,
            "Sync operation submitted"
        );

        self.event_bus.emit_lossy(SyncEvent::OperationSubmitted {
            operation_id: operation.id,
            user_id: operation.user_id.clone(),
            operation_type: operation.operation_type,
            timestamp: now(),
        });

        self.notify.notify_one();
    }
}
