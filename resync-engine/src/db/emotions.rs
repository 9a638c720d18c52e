//! Emotion record persistence

use resync_common::db::EmotionRecord;
use resync_common::time::to_db_string;
use sqlx::{Executor, Row, Sqlite, SqliteConnection};
use uuid::Uuid;

use super::{json_text, parse_json_text, parse_timestamp, parse_uuid, AppendOnlyRow, StoreResult};

impl AppendOnlyRow for EmotionRecord {
    const TABLE: &'static str = "emotion_records";

    fn stable_id(&self) -> Uuid {
        self.id
    }

    async fn insert(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO emotion_records (
                id, user_id, conversation_id, message_id, emotion_type,
                confidence, voice_emotion, text_sentiment, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(self.id.to_string())
        .bind(&self.user_id)
        .bind(self.conversation_id.map(|id| id.to_string()))
        .bind(self.message_id.map(|id| id.to_string()))
        .bind(&self.emotion_type)
        .bind(self.confidence)
        .bind(json_text(&self.voice_emotion))
        .bind(json_text(&self.text_sentiment))
        .bind(to_db_string(&self.created_at))
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

/// All emotion records of a user, oldest first
pub async fn list_for_user<'e, E>(executor: E, user_id: &str) -> StoreResult<Vec<EmotionRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        r#"
        SELECT id, user_id, conversation_id, message_id, emotion_type,
               confidence, voice_emotion, text_sentiment, created_at
        FROM emotion_records
        WHERE user_id = ?
        ORDER BY created_at, id
        "#,
    )
    .bind(user_id)
    .fetch_all(executor)
    .await?;

    rows.iter()
        .map(|row| {
            let conversation_id: Option<String> = row.get("conversation_id");
            let message_id: Option<String> = row.get("message_id");
            Ok(EmotionRecord {
                id: parse_uuid(&row.get::<String, _>("id"))?,
                user_id: row.get("user_id"),
                conversation_id: conversation_id.as_deref().map(parse_uuid).transpose()?,
                message_id: message_id.as_deref().map(parse_uuid).transpose()?,
                emotion_type: row.get("emotion_type"),
                confidence: row.get("confidence"),
                voice_emotion: parse_json_text(row.get("voice_emotion"))?,
                text_sentiment: parse_json_text(row.get("text_sentiment"))?,
                created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
            })
        })
        .collect()
}
