//! Conversation and message persistence

use resync_common::db::{Conversation, Message, MessageType};
use resync_common::time::to_db_string;
use sqlx::{Executor, Row, Sqlite, SqliteConnection};
use uuid::Uuid;

use super::{json_text, parse_json_text, parse_timestamp, parse_uuid, AppendOnlyRow, StoreResult};

impl AppendOnlyRow for Conversation {
    const TABLE: &'static str = "conversations";

    fn stable_id(&self) -> Uuid {
        self.id
    }

    async fn insert(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO conversations (id, user_id, started_at) VALUES (?, ?, ?)")
            .bind(self.id.to_string())
            .bind(&self.user_id)
            .bind(to_db_string(&self.started_at))
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

impl AppendOnlyRow for Message {
    const TABLE: &'static str = "messages";

    fn stable_id(&self) -> Uuid {
        self.id
    }

    async fn insert(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, message_type, content, emotion_data, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(self.id.to_string())
        .bind(self.conversation_id.to_string())
        .bind(self.message_type.as_str())
        .bind(&self.content)
        .bind(json_text(&self.emotion_data))
        .bind(to_db_string(&self.created_at))
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

/// Load a conversation by stable id
pub async fn get_conversation<'e, E>(executor: E, id: Uuid) -> StoreResult<Option<Conversation>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT id, user_id, started_at FROM conversations WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(executor)
        .await?;

    match row {
        Some(row) => Ok(Some(Conversation {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            user_id: row.get("user_id"),
            started_at: parse_timestamp(&row.get::<String, _>("started_at"))?,
        })),
        None => Ok(None),
    }
}

/// All messages of a conversation, oldest first
pub async fn list_messages<'e, E>(executor: E, conversation_id: Uuid) -> StoreResult<Vec<Message>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        r#"
        SELECT id, conversation_id, message_type, content, emotion_data, created_at
        FROM messages
        WHERE conversation_id = ?
        ORDER BY created_at, id
        "#,
    )
    .bind(conversation_id.to_string())
    .fetch_all(executor)
    .await?;

    rows.iter()
        .map(|row| {
            let message_type: String = row.get("message_type");
            Ok(Message {
                id: parse_uuid(&row.get::<String, _>("id"))?,
                conversation_id: parse_uuid(&row.get::<String, _>("conversation_id"))?,
                message_type: message_type
                    .parse::<MessageType>()
                    .map_err(super::decode_error)?,
                content: row.get("content"),
                emotion_data: parse_json_text(row.get("emotion_data"))?,
                created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
            })
        })
        .collect()
}
