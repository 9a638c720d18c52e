//! Shared fixtures for resync-engine integration tests

#![allow(dead_code)]

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use resync_common::config::SyncSettings;
use resync_engine::handlers::OperationContext;
use sqlx::SqlitePool;
use tempfile::TempDir;
use uuid::Uuid;

/// Fresh on-disk database with the full schema
///
/// Keep the `TempDir` alive for the duration of the test.
pub async fn test_pool() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().unwrap();
    let pool = resync_common::db::init_database(&temp_dir.path().join("resync.db"))
        .await
        .unwrap();
    (temp_dir, pool)
}

/// Settings with no backoff and a short poll interval
pub fn fast_settings() -> SyncSettings {
    SyncSettings {
        worker_count: 4,
        backoff_unit_ms: 0,
        poll_interval_ms: 10,
        max_lock_wait_ms: 5000,
        ..SyncSettings::default()
    }
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// Context of an operation submitted `offset_secs` after [`base_time`]
pub fn context_at(user_id: &str, offset_secs: i64) -> OperationContext {
    OperationContext {
        operation_id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        submitted_at: base_time() + ChronoDuration::seconds(offset_secs),
    }
}

pub async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}
