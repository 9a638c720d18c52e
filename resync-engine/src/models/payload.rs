//! Typed operation payloads
//!
//! A submitted payload is decoded once, at the queue boundary, into the
//! [`SyncPayload`] variant for its operation type. Operation-level shape
//! errors (missing `conversation_id`, non-array `messages`) reject the
//! submission. Individual batch entries are decoded leniently through
//! [`Entry`] so one malformed entry never rejects the whole batch.

use chrono::{DateTime, Utc};
use resync_common::db::OperationType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::SyncError;

/// A batch entry: either decoded, or kept raw for rejection reporting
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Entry<T> {
    Valid(T),
    Malformed(Value),
}

/// Client-supplied identifier: text, or a local integer counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientId {
    Text(String),
    Counter(i64),
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientId::Text(s) => f.write_str(s),
            ClientId::Counter(n) => write!(f, "{}", n),
        }
    }
}

impl ClientId {
    /// Empty text ids count as absent
    pub fn is_blank(&self) -> bool {
        matches!(self, ClientId::Text(s) if s.trim().is_empty())
    }
}

/// `conversation_sync`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConversationPayload {
    pub conversation_id: ClientId,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub messages: Vec<Entry<MessageEntry>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageEntry {
    #[serde(default)]
    pub id: Option<ClientId>,
    #[serde(default)]
    pub local_id: Option<ClientId>,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub emotion_data: Option<Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl MessageEntry {
    /// Server id if present, else the client-local id
    pub fn client_id(&self) -> Option<&ClientId> {
        self.id
            .as_ref()
            .filter(|id| !id.is_blank())
            .or_else(|| self.local_id.as_ref().filter(|id| !id.is_blank()))
    }
}

/// `emotion_data_sync`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EmotionPayload {
    #[serde(default)]
    pub emotions: Vec<Entry<EmotionEntry>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EmotionEntry {
    #[serde(default)]
    pub id: Option<ClientId>,
    #[serde(default)]
    pub conversation_id: Option<ClientId>,
    #[serde(default)]
    pub message_id: Option<ClientId>,
    #[serde(default)]
    pub emotion_type: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub voice_emotion: Option<Value>,
    #[serde(default)]
    pub text_sentiment: Option<Value>,
    #[serde(default, alias = "created_at")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// `baseline_update`
///
/// Every field other than the named ones is a metric and lands in the
/// baseline value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BaselinePayload {
    pub baseline_type: String,
    #[serde(default)]
    pub session_count: i64,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub conflict_strategy: Option<String>,
    #[serde(flatten)]
    pub metrics: Map<String, Value>,
}

/// `user_preference_sync`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PreferencePayload {
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub conflict_strategy: Option<String>,
    #[serde(flatten)]
    pub values: Map<String, Value>,
}

/// Decoded payload, one variant per operation type
#[derive(Debug, Clone, PartialEq)]
pub enum SyncPayload {
    Conversation(ConversationPayload),
    Emotion(EmotionPayload),
    Baseline(BaselinePayload),
    Preference(PreferencePayload),
}

impl SyncPayload {
    /// Decode a raw payload for `operation_type`
    pub fn decode(operation_type: OperationType, raw: &Value) -> Result<Self, SyncError> {
        if !raw.is_object() {
            return Err(SyncError::Validation(format!(
                "{} payload must be a JSON object",
                operation_type
            )));
        }

        let payload = match operation_type {
            OperationType::ConversationSync => {
                SyncPayload::Conversation(ConversationPayload::deserialize(raw)?)
            }
            OperationType::EmotionDataSync => SyncPayload::Emotion(EmotionPayload::deserialize(raw)?),
            OperationType::BaselineUpdate => SyncPayload::Baseline(BaselinePayload::deserialize(raw)?),
            OperationType::UserPreferenceSync => {
                SyncPayload::Preference(PreferencePayload::deserialize(raw)?)
            }
        };

        Ok(payload)
    }

    pub fn operation_type(&self) -> OperationType {
        match self {
            SyncPayload::Conversation(_) => OperationType::ConversationSync,
            SyncPayload::Emotion(_) => OperationType::EmotionDataSync,
            SyncPayload::Baseline(_) => OperationType::BaselineUpdate,
            SyncPayload::Preference(_) => OperationType::UserPreferenceSync,
        }
    }
}
