//! Unit tests for database initialization

use resync_common::db::init::{create_schema, init_database};
use tempfile::TempDir;

const EXPECTED_TABLES: [&str; 6] = [
    "baselines",
    "conversations",
    "emotion_records",
    "messages",
    "sync_operations",
    "user_preferences",
];

async fn table_names(pool: &sqlx::SqlitePool) -> Vec<String> {
    sqlx::query_scalar::<_, String>(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await
    .unwrap()
}

#[tokio::test]
async fn test_database_creation_when_missing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("resync.db");

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_all_tables_created() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("resync.db")).await.unwrap();

    assert_eq!(table_names(&pool).await, EXPECTED_TABLES);
}

#[tokio::test]
async fn test_database_opens_existing_and_keeps_rows() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("resync.db");

    let pool = init_database(&db_path).await.unwrap();
    sqlx::query("INSERT INTO conversations (id, user_id, started_at) VALUES ('c1', 'u1', '2024-01-01T00:00:00.000000Z')")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversations")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_create_schema_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("resync.db")).await.unwrap();

    create_schema(&pool).await.unwrap();
    create_schema(&pool).await.unwrap();

    assert_eq!(table_names(&pool).await.len(), EXPECTED_TABLES.len());
}

#[tokio::test]
async fn test_baselines_unique_per_user_and_type() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("resync.db")).await.unwrap();

    let insert = "INSERT INTO baselines (user_id, baseline_type, value, session_count, established_at, updated_at) \
                  VALUES ('u1', 'voice', '{}', 1, '2024-01-01T00:00:00.000000Z', '2024-01-01T00:00:00.000000Z')";

    sqlx::query(insert).execute(&pool).await.unwrap();
    let duplicate = sqlx::query(insert).execute(&pool).await;

    assert!(duplicate.is_err(), "Second baseline row for same key should be rejected");
}

#[tokio::test]
async fn test_confidence_range_enforced() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("resync.db")).await.unwrap();

    let result = sqlx::query(
        "INSERT INTO emotion_records (id, user_id, emotion_type, confidence, created_at) \
         VALUES ('e1', 'u1', 'joy', 1.5, '2024-01-01T00:00:00.000000Z')",
    )
    .execute(&pool)
    .await;

    assert!(result.is_err());
}
