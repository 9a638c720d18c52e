//! Baseline persistence (one row per user and baseline type)

use resync_common::db::Baseline;
use resync_common::time::to_db_string;
use sqlx::{Executor, Row, Sqlite};

use super::{decode_error, parse_timestamp, StoreError, StoreResult};

/// Point read of a baseline
pub async fn get_baseline<'e, E>(
    executor: E,
    user_id: &str,
    baseline_type: &str,
) -> StoreResult<Option<Baseline>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        r#"
        SELECT user_id, baseline_type, value, session_count, established_at, updated_at
        FROM baselines
        WHERE user_id = ? AND baseline_type = ?
        "#,
    )
    .bind(user_id)
    .bind(baseline_type)
    .fetch_optional(executor)
    .await?;

    match row {
        Some(row) => {
            let value: String = row.get("value");
            Ok(Some(Baseline {
                user_id: row.get("user_id"),
                baseline_type: row.get("baseline_type"),
                value: serde_json::from_str(&value).map_err(decode_error)?,
                session_count: row.get("session_count"),
                established_at: parse_timestamp(&row.get::<String, _>("established_at"))?,
                updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
            }))
        }
        None => Ok(None),
    }
}

/// Insert the initial baseline
///
/// Fails with [`StoreError::Conflict`] if a row for the key already exists.
pub async fn insert_baseline<'e, E>(executor: E, baseline: &Baseline) -> StoreResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO baselines (user_id, baseline_type, value, session_count, established_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&baseline.user_id)
    .bind(&baseline.baseline_type)
    .bind(baseline.value.to_string())
    .bind(baseline.session_count)
    .bind(to_db_string(&baseline.established_at))
    .bind(to_db_string(&baseline.updated_at))
    .execute(executor)
    .await?;

    Ok(())
}

/// Update a baseline in place (`established_at` is never rewritten)
pub async fn update_baseline<'e, E>(executor: E, baseline: &Baseline) -> StoreResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE baselines
        SET value = ?, session_count = ?, updated_at = ?
        WHERE user_id = ? AND baseline_type = ?
        "#,
    )
    .bind(baseline.value.to_string())
    .bind(baseline.session_count)
    .bind(to_db_string(&baseline.updated_at))
    .bind(&baseline.user_id)
    .bind(&baseline.baseline_type)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(format!(
            "baseline {}/{}",
            baseline.user_id, baseline.baseline_type
        )));
    }

    Ok(())
}
