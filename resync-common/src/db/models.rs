//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

/// Kind of queued sync operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    ConversationSync,
    EmotionDataSync,
    BaselineUpdate,
    UserPreferenceSync,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::ConversationSync => "conversation_sync",
            OperationType::EmotionDataSync => "emotion_data_sync",
            OperationType::BaselineUpdate => "baseline_update",
            OperationType::UserPreferenceSync => "user_preference_sync",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "conversation_sync" => Ok(OperationType::ConversationSync),
            "emotion_data_sync" => Ok(OperationType::EmotionDataSync),
            "baseline_update" => Ok(OperationType::BaselineUpdate),
            "user_preference_sync" => Ok(OperationType::UserPreferenceSync),
            other => Err(Error::InvalidInput(format!("Unknown operation type: {}", other))),
        }
    }
}

/// Queue lifecycle status
///
/// `pending → processing → {completed | pending (retry) | failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::Processing => "processing",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
        }
    }

    /// Terminal states never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::Completed | OperationStatus::Failed)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OperationStatus::Pending),
            "processing" => Ok(OperationStatus::Processing),
            "completed" => Ok(OperationStatus::Completed),
            "failed" => Ok(OperationStatus::Failed),
            other => Err(Error::InvalidInput(format!("Unknown operation status: {}", other))),
        }
    }
}

/// One queued sync operation (`sync_operations` row)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOperation {
    pub id: Uuid,
    pub user_id: String,
    pub operation_type: OperationType,
    /// Raw payload as submitted; decoded into a typed payload by the engine
    pub payload: serde_json::Value,
    pub status: OperationStatus,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    /// Earliest time (unix ms) the operation may be claimed
    pub available_at_ms: i64,
    pub last_error: Option<String>,
    pub summary: Option<serde_json::Value>,
    pub resubmitted_from: Option<Uuid>,
}

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    User,
    Ai,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::User => "user",
            MessageType::Ai => "ai",
        }
    }
}

impl FromStr for MessageType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageType::User),
            "ai" => Ok(MessageType::Ai),
            other => Err(Error::InvalidInput(format!("Unknown message type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub message_type: MessageType,
    /// Opaque content (possibly ciphertext produced upstream)
    pub content: String,
    pub emotion_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionRecord {
    pub id: Uuid,
    pub user_id: String,
    pub conversation_id: Option<Uuid>,
    pub message_id: Option<Uuid>,
    pub emotion_type: String,
    /// Detector confidence in [0, 1]
    pub confidence: f64,
    pub voice_emotion: Option<serde_json::Value>,
    pub text_sentiment: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Behavioral baseline, one row per (user_id, baseline_type)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub user_id: String,
    pub baseline_type: String,
    pub value: serde_json::Value,
    pub session_count: i64,
    pub established_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User preferences, one row per user_id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub user_id: String,
    pub value: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_type_round_trips_through_str() {
        for op in [
            OperationType::ConversationSync,
            OperationType::EmotionDataSync,
            OperationType::BaselineUpdate,
            OperationType::UserPreferenceSync,
        ] {
            assert_eq!(op.as_str().parse::<OperationType>().unwrap(), op);
        }
    }

    #[test]
    fn test_operation_type_serde_matches_as_str() {
        let json = serde_json::to_string(&OperationType::EmotionDataSync).unwrap();
        assert_eq!(json, "\"emotion_data_sync\"");
    }

    #[test]
    fn test_unknown_operation_type_rejected() {
        assert!(matches!(
            "calendar_sync".parse::<OperationType>(),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(OperationStatus::Completed.is_terminal());
        assert!(OperationStatus::Failed.is_terminal());
        assert!(!OperationStatus::Pending.is_terminal());
        assert!(!OperationStatus::Processing.is_terminal());
    }

    #[test]
    fn test_message_type_parse() {
        assert_eq!("ai".parse::<MessageType>().unwrap(), MessageType::Ai);
        assert!("robot".parse::<MessageType>().is_err());
    }
}
