//! `emotion_data_sync` handler

use resync_common::db::EmotionRecord;
use resync_common::time::to_db_string;
use resync_common::uuid_utils;
use sqlx::SqliteConnection;
use tracing::{debug, info};

use super::{malformed_reason, OperationContext};
use crate::db::{ensure_absent_then_insert, InsertOutcome};
use crate::error::SyncError;
use crate::identity::{self, StableId};
use crate::models::{BatchSummary, ClientId, EmotionEntry, EmotionPayload, Entry, SyncSummary};

pub(crate) async fn apply(
    conn: &mut SqliteConnection,
    context: &OperationContext,
    payload: &EmotionPayload,
) -> Result<SyncSummary, SyncError> {
    let mut summary = BatchSummary::default();

    for (index, entry) in payload.emotions.iter().enumerate() {
        let built = match entry {
            Entry::Valid(emotion) => build_record(context, emotion),
            Entry::Malformed(raw) => Err(malformed_reason(raw)),
        };

        match built {
            Ok(record) => match ensure_absent_then_insert(conn, &record).await? {
                InsertOutcome::Inserted => summary.record_inserted(),
                InsertOutcome::AlreadyExists => summary.record_duplicate(),
            },
            Err(reason) => {
                debug!(
                    operation_id = %context.operation_id,
                    index,
                    reason = %reason,
                    "Rejected emotion entry"
                );
                summary.record_rejected(index, reason);
            }
        }
    }

    info!(
        operation_id = %context.operation_id,
        inserted = summary.inserted,
        skipped_duplicate = summary.skipped_duplicate,
        rejected_invalid = summary.rejected_invalid,
        "Emotion records synced"
    );

    Ok(SyncSummary::Emotion { emotions: summary })
}

fn present(id: &Option<ClientId>) -> Option<&ClientId> {
    id.as_ref().filter(|id| !id.is_blank())
}

fn build_record(context: &OperationContext, entry: &EmotionEntry) -> Result<EmotionRecord, String> {
    let user_id = context.user_id.as_str();

    let emotion_type = entry
        .emotion_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| "emotion_type is required".to_string())?;

    let confidence = entry
        .confidence
        .ok_or_else(|| "confidence is required".to_string())?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(format!("confidence {} is outside [0, 1]", confidence));
    }

    // Same discriminators as the conversation handler, so references link up
    let conversation_id: Option<StableId> = present(&entry.conversation_id)
        .map(|c| identity::resolve(user_id, identity::CONVERSATION, &c.to_string()));

    let message_id: Option<StableId> = match (present(&entry.message_id), conversation_id) {
        (None, _) => None,
        (Some(message), Some(conversation)) => Some(identity::resolve(
            user_id,
            &identity::message_scope(&conversation),
            &message.to_string(),
        )),
        (Some(message), None) => Some(uuid_utils::parse_opt(&message.to_string()).ok_or_else(|| {
            "message_id without conversation_id must be a stable id".to_string()
        })?),
    };

    let id = match present(&entry.id) {
        Some(client_id) => identity::resolve(user_id, identity::EMOTION, &client_id.to_string()),
        None => {
            let timestamp = entry
                .timestamp
                .ok_or_else(|| "id or timestamp is required".to_string())?;
            let derivation = format!(
                "{}:{}:{}:{}",
                conversation_id.map(|c| c.to_string()).unwrap_or_default(),
                message_id.map(|m| m.to_string()).unwrap_or_default(),
                emotion_type,
                to_db_string(&timestamp)
            );
            identity::resolve(user_id, identity::EMOTION, &derivation)
        }
    };

    Ok(EmotionRecord {
        id,
        user_id: user_id.to_string(),
        conversation_id,
        message_id,
        emotion_type: emotion_type.to_string(),
        confidence,
        voice_emotion: entry.voice_emotion.clone(),
        text_sentiment: entry.text_sentiment.clone(),
        created_at: entry.timestamp.unwrap_or(context.submitted_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn context() -> OperationContext {
        OperationContext {
            operation_id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            submitted_at: Utc::now(),
        }
    }

    fn joy() -> EmotionEntry {
        EmotionEntry {
            id: None,
            conversation_id: Some(ClientId::Text("c1".to_string())),
            message_id: Some(ClientId::Counter(4)),
            emotion_type: Some("joy".to_string()),
            confidence: Some(0.9),
            voice_emotion: None,
            text_sentiment: None,
            timestamp: Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()),
        }
    }

    #[test]
    fn test_derived_id_is_deterministic() {
        let a = build_record(&context(), &joy()).unwrap();
        let b = build_record(&context(), &joy()).unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_derived_id_depends_on_timestamp() {
        let mut later = joy();
        later.timestamp = Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 1).unwrap());
        let a = build_record(&context(), &joy()).unwrap();
        let b = build_record(&context(), &later).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_references_match_conversation_handler() {
        let record = build_record(&context(), &joy()).unwrap();
        let conversation = identity::resolve("u1", identity::CONVERSATION, "c1");
        assert_eq!(record.conversation_id, Some(conversation));
        assert_eq!(
            record.message_id,
            Some(identity::resolve("u1", &identity::message_scope(&conversation), "4"))
        );
    }

    #[test]
    fn test_provided_id_resolves_under_emotion() {
        let mut entry = joy();
        entry.id = Some(ClientId::Text("e-17".to_string()));
        let record = build_record(&context(), &entry).unwrap();
        assert_eq!(record.id, identity::resolve("u1", identity::EMOTION, "e-17"));
    }

    #[test]
    fn test_rejections() {
        let ctx = context();

        let mut no_id_no_time = joy();
        no_id_no_time.timestamp = None;
        assert!(build_record(&ctx, &no_id_no_time).is_err());

        let mut too_confident = joy();
        too_confident.confidence = Some(1.5);
        assert!(build_record(&ctx, &too_confident).is_err());

        let mut untyped = joy();
        untyped.emotion_type = None;
        assert!(build_record(&ctx, &untyped).is_err());

        let mut orphan = joy();
        orphan.conversation_id = None;
        assert!(build_record(&ctx, &orphan).is_err());
    }

    #[test]
    fn test_orphan_message_id_accepted_when_stable() {
        let stable = Uuid::new_v4();
        let mut entry = joy();
        entry.conversation_id = None;
        entry.message_id = Some(ClientId::Text(stable.to_string()));

        let record = build_record(&context(), &entry).unwrap();
        assert_eq!(record.message_id, Some(stable));
        assert_eq!(record.conversation_id, None);
    }
}
