//! `conversation_sync` handler

use resync_common::db::{Conversation, Message, MessageType};
use sqlx::SqliteConnection;
use tracing::{debug, info};
use uuid::Uuid;

use super::{malformed_reason, OperationContext};
use crate::db::conversations::get_conversation;
use crate::db::{ensure_absent_then_insert, InsertOutcome};
use crate::error::SyncError;
use crate::identity;
use crate::models::{BatchSummary, ConversationPayload, Entry, MessageEntry, SyncSummary};

pub(crate) async fn apply(
    conn: &mut SqliteConnection,
    context: &OperationContext,
    payload: &ConversationPayload,
) -> Result<SyncSummary, SyncError> {
    if payload.conversation_id.is_blank() {
        return Err(SyncError::Validation("conversation_id is required".to_string()));
    }

    let conversation_id = identity::resolve(
        &context.user_id,
        identity::CONVERSATION,
        &payload.conversation_id.to_string(),
    );

    let conversation = Conversation {
        id: conversation_id,
        user_id: context.user_id.clone(),
        started_at: payload.started_at.unwrap_or(context.submitted_at),
    };

    let conversation_created = match ensure_absent_then_insert(conn, &conversation).await? {
        InsertOutcome::Inserted => true,
        InsertOutcome::AlreadyExists => {
            // A client-supplied UUID can name another user's conversation
            let existing = get_conversation(&mut *conn, conversation_id).await?;
            if existing.is_some_and(|c| c.user_id != context.user_id) {
                return Err(SyncError::Validation(format!(
                    "conversation {} belongs to another user",
                    conversation_id
                )));
            }
            false
        }
    };

    let mut summary = BatchSummary::default();

    for (index, entry) in payload.messages.iter().enumerate() {
        let built = match entry {
            Entry::Valid(message) => build_message(context, conversation_id, message),
            Entry::Malformed(raw) => Err(malformed_reason(raw)),
        };

        match built {
            Ok(message) => match ensure_absent_then_insert(conn, &message).await? {
                InsertOutcome::Inserted => summary.record_inserted(),
                InsertOutcome::AlreadyExists => summary.record_duplicate(),
            },
            Err(reason) => {
                debug!(
                    operation_id = %context.operation_id,
                    index,
                    reason = %reason,
                    "Rejected message entry"
                );
                summary.record_rejected(index, reason);
            }
        }
    }

    info!(
        operation_id = %context.operation_id,
        %conversation_id,
        conversation_created,
        inserted = summary.inserted,
        skipped_duplicate = summary.skipped_duplicate,
        rejected_invalid = summary.rejected_invalid,
        "Conversation synced"
    );

    Ok(SyncSummary::Conversation {
        conversation_id,
        conversation_created,
        messages: summary,
    })
}

fn build_message(
    context: &OperationContext,
    conversation_id: Uuid,
    entry: &MessageEntry,
) -> Result<Message, String> {
    let client_id = entry
        .client_id()
        .ok_or_else(|| "id or local_id is required".to_string())?;

    let content = entry
        .content
        .clone()
        .ok_or_else(|| "content is required".to_string())?;

    let message_type = match entry.message_type.as_deref() {
        None => MessageType::User,
        Some(raw) => raw
            .parse::<MessageType>()
            .map_err(|_| format!("message_type must be 'user' or 'ai', got '{}'", raw))?,
    };

    Ok(Message {
        id: identity::resolve(
            &context.user_id,
            &identity::message_scope(&conversation_id),
            &client_id.to_string(),
        ),
        conversation_id,
        message_type,
        content,
        emotion_data: entry.emotion_data.clone(),
        created_at: entry.created_at.unwrap_or(context.submitted_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClientId;
    use chrono::Utc;

    fn context() -> OperationContext {
        OperationContext {
            operation_id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            submitted_at: Utc::now(),
        }
    }

    fn entry(local_id: Option<&str>, content: Option<&str>, message_type: Option<&str>) -> MessageEntry {
        MessageEntry {
            id: None,
            local_id: local_id.map(|s| ClientId::Text(s.to_string())),
            message_type: message_type.map(str::to_string),
            content: content.map(str::to_string),
            emotion_data: None,
            created_at: None,
        }
    }

    #[test]
    fn test_message_type_defaults_to_user() {
        let ctx = context();
        let message = build_message(&ctx, Uuid::nil(), &entry(Some("m1"), Some("hi"), None)).unwrap();
        assert_eq!(message.message_type, MessageType::User);
        assert_eq!(message.created_at, ctx.submitted_at);
    }

    #[test]
    fn test_message_id_is_scoped_to_conversation() {
        let ctx = context();
        let a = build_message(&ctx, Uuid::nil(), &entry(Some("m1"), Some("hi"), None)).unwrap();
        let b = build_message(&ctx, Uuid::from_u128(1), &entry(Some("m1"), Some("hi"), None)).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.id, identity::resolve("u1", &identity::message_scope(&Uuid::nil()), "m1"));
    }

    #[test]
    fn test_message_rejections() {
        let ctx = context();
        assert!(build_message(&ctx, Uuid::nil(), &entry(None, Some("hi"), None)).is_err());
        assert!(build_message(&ctx, Uuid::nil(), &entry(Some("m1"), None, None)).is_err());
        assert!(build_message(&ctx, Uuid::nil(), &entry(Some("m1"), Some("hi"), Some("bot"))).is_err());
    }
}
