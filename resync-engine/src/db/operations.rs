//! Sync queue persistence
//!
//! `sync_operations` is both the durable queue and the audit log: rows are
//! never deleted. Every status change is a single guarded UPDATE, so an
//! operation is always in exactly one state.

use resync_common::db::{OperationStatus, OperationType, SyncOperation};
use resync_common::time::{now, to_db_string};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use super::{decode_error, parse_json_text, parse_timestamp, parse_uuid, StoreError, StoreResult};

const OPERATION_COLUMNS: &str = "id, user_id, operation_type, payload, status, retry_count, \
     created_at, processed_at, available_at_ms, last_error, summary, resubmitted_from";

/// Durable queue of sync operations
#[derive(Debug, Clone)]
pub struct SyncQueue {
    pool: SqlitePool,
}

impl SyncQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a new `pending` operation, immediately claimable
    pub async fn enqueue(
        &self,
        user_id: &str,
        operation_type: OperationType,
        payload: &serde_json::Value,
        resubmitted_from: Option<Uuid>,
    ) -> StoreResult<SyncOperation> {
        let created_at = now();
        let operation = SyncOperation {
            id: resync_common::uuid_utils::generate(),
            user_id: user_id.to_string(),
            operation_type,
            payload: payload.clone(),
            status: OperationStatus::Pending,
            retry_count: 0,
            created_at,
            processed_at: None,
            available_at_ms: created_at.timestamp_millis(),
            last_error: None,
            summary: None,
            resubmitted_from,
        };

        sqlx::query(
            r#"
            INSERT INTO sync_operations (
                id, user_id, operation_type, payload, status, retry_count,
                created_at, available_at_ms, resubmitted_from
            ) VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?)
            "#,
        )
        .bind(operation.id.to_string())
        .bind(&operation.user_id)
        .bind(operation.operation_type.as_str())
        .bind(operation.payload.to_string())
        .bind(operation.status.as_str())
        .bind(to_db_string(&operation.created_at))
        .bind(operation.available_at_ms)
        .bind(resubmitted_from.map(|id| id.to_string()))
        .execute(&self.pool)
        .await?;

        debug!(operation_id = %operation.id, user_id, %operation_type, "Operation enqueued");

        Ok(operation)
    }

    /// Load one operation
    pub async fn get(&self, id: Uuid) -> StoreResult<SyncOperation> {
        let sql = format!("SELECT {} FROM sync_operations WHERE id = ?", OPERATION_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => operation_from_row(&row),
            None => Err(StoreError::NotFound(format!("sync operation {}", id))),
        }
    }

    /// Operations of one user, newest first, optionally filtered by status
    pub async fn list_for_user(
        &self,
        user_id: &str,
        status: Option<OperationStatus>,
        limit: u32,
    ) -> StoreResult<Vec<SyncOperation>> {
        let sql = format!(
            r#"
            SELECT {} FROM sync_operations
            WHERE user_id = ? AND (? IS NULL OR status = ?)
            ORDER BY created_at DESC
            LIMIT ?
            "#,
            OPERATION_COLUMNS
        );
        let status = status.map(|s| s.as_str());
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(status)
            .bind(status)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(operation_from_row).collect()
    }

    /// Claim the next due operation: `pending → processing`
    ///
    /// One UPDATE statement selects and claims the row, so two workers can
    /// never claim the same operation. A claim holds a lease of `lease_ms`:
    /// `available_at_ms` moves to the lease expiry, and a `processing` row
    /// whose lease has expired is claimable again with its retry count
    /// unchanged.
    pub async fn claim_next(&self, now_ms: i64, lease_ms: i64) -> StoreResult<Option<SyncOperation>> {
        let sql = format!(
            r#"
            UPDATE sync_operations
            SET status = 'processing', processed_at = ?, available_at_ms = ?
            WHERE id = (
                SELECT id FROM sync_operations
                WHERE status IN ('pending', 'processing') AND available_at_ms <= ?
                ORDER BY available_at_ms, created_at
                LIMIT 1
            )
            AND status IN ('pending', 'processing')
            AND available_at_ms <= ?
            RETURNING {}
            "#,
            OPERATION_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(to_db_string(&now()))
            .bind(now_ms.saturating_add(lease_ms))
            .bind(now_ms)
            .bind(now_ms)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(operation_from_row).transpose()
    }

    /// `processing → completed`
    pub async fn mark_completed(&self, id: Uuid, summary: Option<&serde_json::Value>) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sync_operations
            SET status = 'completed', processed_at = ?, summary = ?, last_error = NULL
            WHERE id = ? AND status = 'processing'
            "#,
        )
        .bind(to_db_string(&now()))
        .bind(summary.map(|s| s.to_string()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        require_processing(result.rows_affected(), id)
    }

    /// `processing → pending`, claimable again at `available_at_ms`
    pub async fn reschedule(
        &self,
        id: Uuid,
        retry_count: u32,
        available_at_ms: i64,
        error: &str,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sync_operations
            SET status = 'pending', retry_count = ?, available_at_ms = ?, last_error = ?
            WHERE id = ? AND status = 'processing' AND retry_count <= ?
            "#,
        )
        .bind(i64::from(retry_count))
        .bind(available_at_ms)
        .bind(error)
        .bind(id.to_string())
        .bind(i64::from(retry_count))
        .execute(&self.pool)
        .await?;

        require_processing(result.rows_affected(), id)
    }

    /// `processing → failed` (terminal)
    pub async fn mark_failed(&self, id: Uuid, retry_count: u32, error: &str) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sync_operations
            SET status = 'failed', retry_count = ?, processed_at = ?, last_error = ?
            WHERE id = ? AND status = 'processing' AND retry_count <= ?
            "#,
        )
        .bind(i64::from(retry_count))
        .bind(to_db_string(&now()))
        .bind(error)
        .bind(id.to_string())
        .bind(i64::from(retry_count))
        .execute(&self.pool)
        .await?;

        require_processing(result.rows_affected(), id)
    }

    /// Return operations stranded in `processing` to `pending`
    ///
    /// Any operation still `processing` at startup was claimed by a process
    /// that died before committing its status; it is redelivered as-is
    /// without waiting for its lease to expire.
    pub async fn recover_stale(&self) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE sync_operations
            SET status = 'pending', available_at_ms = ?
            WHERE status = 'processing'
            "#,
        )
        .bind(now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        let recovered = result.rows_affected();
        if recovered > 0 {
            info!(recovered, "Recovered stale processing operations for redelivery");
        }
        Ok(recovered)
    }

    /// Count operations by status
    pub async fn count_by_status(&self, status: OperationStatus) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_operations WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn require_processing(rows_affected: u64, id: Uuid) -> StoreResult<()> {
    if rows_affected == 0 {
        return Err(StoreError::Conflict(format!(
            "sync operation {} is not in processing state",
            id
        )));
    }
    Ok(())
}

fn operation_from_row(row: &SqliteRow) -> StoreResult<SyncOperation> {
    let operation_type: String = row.get("operation_type");
    let status: String = row.get("status");
    let payload: String = row.get("payload");
    let retry_count: i64 = row.get("retry_count");
    let processed_at: Option<String> = row.get("processed_at");
    let resubmitted_from: Option<String> = row.get("resubmitted_from");

    Ok(SyncOperation {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        user_id: row.get("user_id"),
        operation_type: operation_type.parse::<OperationType>().map_err(decode_error)?,
        payload: serde_json::from_str(&payload).map_err(decode_error)?,
        status: status.parse::<OperationStatus>().map_err(decode_error)?,
        retry_count: u32::try_from(retry_count).map_err(decode_error)?,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        processed_at: processed_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()?,
        available_at_ms: row.get("available_at_ms"),
        last_error: row.get("last_error"),
        summary: parse_json_text(row.get("summary"))?,
        resubmitted_from: resubmitted_from.as_deref().map(parse_uuid).transpose()?,
    })
}
