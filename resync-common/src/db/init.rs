//! Database initialization
//!
//! Opens (creating if needed) the SQLite database in WAL mode and creates
//! every table the sync engine uses. Table creation is idempotent and safe
//! to run on every startup.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Busy timeout applied to every pooled connection
const BUSY_TIMEOUT_MS: u64 = 5000;

/// Initialize database connection pool and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // WAL allows concurrent readers alongside the single writer; the
    // options are applied per connection, not just to the first one.
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    let pool = SqlitePoolOptions::new()
        .max_connections(16)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_sync_operations_table(pool).await?;
    create_conversations_table(pool).await?;
    create_messages_table(pool).await?;
    create_emotion_records_table(pool).await?;
    create_baselines_table(pool).await?;
    create_user_preferences_table(pool).await?;
    Ok(())
}

/// Durable sync queue
///
/// Rows are never deleted; `available_at_ms` delays re-delivery of
/// operations waiting out a retry backoff.
pub async fn create_sync_operations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_operations (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            operation_type TEXT NOT NULL CHECK (operation_type IN (
                'conversation_sync', 'emotion_data_sync', 'baseline_update', 'user_preference_sync'
            )),
            payload TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN (
                'pending', 'processing', 'completed', 'failed'
            )),
            retry_count INTEGER NOT NULL DEFAULT 0 CHECK (retry_count >= 0),
            created_at TEXT NOT NULL,
            processed_at TEXT,
            available_at_ms INTEGER NOT NULL,
            last_error TEXT,
            summary TEXT,
            resubmitted_from TEXT REFERENCES sync_operations(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sync_operations_claim ON sync_operations(status, available_at_ms)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sync_operations_user ON sync_operations(user_id, created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_conversations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            started_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_messages_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            message_type TEXT NOT NULL CHECK (message_type IN ('user', 'ai')),
            content TEXT NOT NULL,
            emotion_data TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Emotion observations
///
/// Conversation and message references are not foreign keys: emotion data
/// may arrive before the conversation it describes.
async fn create_emotion_records_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS emotion_records (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            conversation_id TEXT,
            message_id TEXT,
            emotion_type TEXT NOT NULL,
            confidence REAL NOT NULL CHECK (confidence >= 0.0 AND confidence <= 1.0),
            voice_emotion TEXT,
            text_sentiment TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_baselines_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS baselines (
            user_id TEXT NOT NULL,
            baseline_type TEXT NOT NULL,
            value TEXT NOT NULL,
            session_count INTEGER NOT NULL DEFAULT 0,
            established_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (user_id, baseline_type)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_user_preferences_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_preferences (
            user_id TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
