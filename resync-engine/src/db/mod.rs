//! Store access for resync-engine
//!
//! Every store function returns [`StoreResult`], an explicit closed set of
//! outcomes: `Ok(value)`, [`StoreError::NotFound`], [`StoreError::Conflict`]
//! or [`StoreError::Infrastructure`].

pub mod baselines;
pub mod conversations;
pub mod emotions;
pub mod guard;
pub mod operations;
pub mod preferences;

pub use guard::{ensure_absent_then_insert, AppendOnlyRow, InsertOutcome};
pub use operations::SyncQueue;

use thiserror::Error;

/// Store result type
pub type StoreResult<T> = Result<T, StoreError>;

/// Store-level failure
#[derive(Debug, Error)]
pub enum StoreError {
    /// No row for the requested key
    #[error("Not found: {0}")]
    NotFound(String),

    /// Uniqueness violation or a row not in the expected state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Store unavailable, locked, or returned undecodable data
    #[error("Store unavailable: {0}")]
    Infrastructure(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::Conflict(db_err.message().to_string())
            }
            _ => StoreError::Infrastructure(err),
        }
    }
}

impl StoreError {
    /// SQLite writer contention ("database is locked")
    pub fn is_lock_contention(&self) -> bool {
        match self {
            StoreError::Infrastructure(err) => err.to_string().contains("database is locked"),
            _ => false,
        }
    }
}

/// Wrap a decoding failure of stored data
pub(crate) fn decode_error<E>(err: E) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    StoreError::Infrastructure(sqlx::Error::Decode(Box::new(err)))
}

/// Serialize an optional JSON value for a TEXT column
pub(crate) fn json_text(value: &Option<serde_json::Value>) -> Option<String> {
    value.as_ref().map(|v| v.to_string())
}

/// Parse an optional TEXT column holding JSON
pub(crate) fn parse_json_text(text: Option<String>) -> StoreResult<Option<serde_json::Value>> {
    text.map(|t| serde_json::from_str(&t))
        .transpose()
        .map_err(decode_error)
}

/// Parse a stored timestamp
pub(crate) fn parse_timestamp(text: &str) -> StoreResult<chrono::DateTime<chrono::Utc>> {
    resync_common::time::from_db_string(text).map_err(decode_error)
}

/// Parse a stored UUID
pub(crate) fn parse_uuid(text: &str) -> StoreResult<uuid::Uuid> {
    uuid::Uuid::parse_str(text).map_err(decode_error)
}
