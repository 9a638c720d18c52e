//! User preference persistence (one row per user)

use resync_common::db::Preferences;
use resync_common::time::to_db_string;
use sqlx::{Executor, Row, Sqlite};

use super::{decode_error, parse_timestamp, StoreError, StoreResult};

pub async fn get_preferences<'e, E>(executor: E, user_id: &str) -> StoreResult<Option<Preferences>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        "SELECT user_id, value, created_at, updated_at FROM user_preferences WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    match row {
        Some(row) => {
            let value: String = row.get("value");
            Ok(Some(Preferences {
                user_id: row.get("user_id"),
                value: serde_json::from_str(&value).map_err(decode_error)?,
                created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
                updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
            }))
        }
        None => Ok(None),
    }
}

pub async fn insert_preferences<'e, E>(executor: E, preferences: &Preferences) -> StoreResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO user_preferences (user_id, value, created_at, updated_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&preferences.user_id)
    .bind(preferences.value.to_string())
    .bind(to_db_string(&preferences.created_at))
    .bind(to_db_string(&preferences.updated_at))
    .execute(executor)
    .await?;

    Ok(())
}

/// Replace the stored preferences (`created_at` is never rewritten)
pub async fn update_preferences<'e, E>(executor: E, preferences: &Preferences) -> StoreResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("UPDATE user_preferences SET value = ?, updated_at = ? WHERE user_id = ?")
        .bind(preferences.value.to_string())
        .bind(to_db_string(&preferences.updated_at))
        .bind(&preferences.user_id)
        .execute(executor)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(format!("preferences {}", preferences.user_id)));
    }

    Ok(())
}
