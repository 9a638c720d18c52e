//! Idempotency guard for append-only rows
//!
//! Presence of a row with the same stable id means "already synced". Row
//! contents are never compared: the identity resolver guarantees that one
//! stable id always names the same logical entity.

use sqlx::SqliteConnection;
use std::future::Future;
use tracing::debug;
use uuid::Uuid;

use super::{StoreError, StoreResult};

/// Outcome of [`ensure_absent_then_insert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

/// Row of an append-only table keyed by a stable `id` column
pub trait AppendOnlyRow: Sync {
    /// Table holding the row
    const TABLE: &'static str;

    /// Primary key
    fn stable_id(&self) -> Uuid;

    /// Plain INSERT of this row
    fn insert(&self, conn: &mut SqliteConnection) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
}

/// Primary-key existence check
pub async fn exists(conn: &mut SqliteConnection, table: &str, id: Uuid) -> StoreResult<bool> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    let found: Option<i64> = sqlx::query_scalar(&sql)
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}

/// Insert `row` unless a row with its stable id already exists
///
/// A uniqueness violation on insert (another delivery of the same entity
/// committed between the check and the insert) is reported as
/// `AlreadyExists`.
pub async fn ensure_absent_then_insert<R: AppendOnlyRow>(
    conn: &mut SqliteConnection,
    row: &R,
) -> StoreResult<InsertOutcome> {
    let id = row.stable_id();

    if exists(conn, R::TABLE, id).await? {
        debug!(table = R::TABLE, %id, "Row already synced, skipping insert");
        return Ok(InsertOutcome::AlreadyExists);
    }

    match row.insert(conn).await.map_err(StoreError::from) {
        Ok(()) => Ok(InsertOutcome::Inserted),
        Err(StoreError::Conflict(msg)) => {
            debug!(table = R::TABLE, %id, conflict = %msg, "Concurrent insert won, treating as duplicate");
            Ok(InsertOutcome::AlreadyExists)
        }
        Err(e) => Err(e),
    }
}
