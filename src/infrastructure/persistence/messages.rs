use crate::domain::entities::{Message, SenderRole, SystemMessageType};
use crate::domain::errors::DomainResult;
use crate::domain::ports::MessageRepository;
use crate::infrastructure::persistence::{optional_text, Database};
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, Row};

// seq is allocated inside the insert so concurrent appends stay ordered
const INSERT_MESSAGE_SQL: &str = "INSERT INTO messages
         (id, conversation_id, seq, sender_id, sender_role, content, attachment,
          is_read, system_message_type, created_at)
     SELECT ?, ?, COALESCE(MAX(seq), 0) + 1, ?, ?, ?, ?, 0, ?, ?
     FROM messages WHERE conversation_id = ?
     RETURNING seq";

pub(crate) fn insert_message_query(message: &Message) -> Query<'_, Any, AnyArguments<'_>> {
    sqlx::query(INSERT_MESSAGE_SQL)
        .bind(&message.id)
        .bind(&message.conversation_id)
        .bind(message.sender_id.as_deref())
        .bind(message.sender_role.as_str())
        .bind(&message.content)
        .bind(message.attachment.as_deref())
        .bind(message.system_message_type.map(|t| t.as_str()))
        .bind(&message.created_at)
        .bind(&message.conversation_id)
}

fn message_from_row(row: &AnyRow) -> Result<Message, sqlx::Error> {
    let sender_role: String = row.try_get("sender_role")?;
    let system_type = optional_text(row, "system_message_type")?;
    let is_read: i64 = row.try_get("is_read")?;

    Ok(Message {
        id: row.try_get("id")?,
        conversation_id: row.try_get("conversation_id")?,
        seq: row.try_get("seq")?,
        sender_id: optional_text(row, "sender_id")?,
        sender_role: SenderRole::from(sender_role),
        content: row.try_get("content")?,
        attachment: optional_text(row, "attachment")?,
        is_read: is_read != 0,
        system_message_type: system_type.as_deref().and_then(SystemMessageType::parse),
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait::async_trait]
impl MessageRepository for Database {
    async fn append_customer_message(
        &self,
        message: &Message,
        expected_version: i64,
    ) -> DomainResult<Option<Message>> {
        let row = sqlx::query(
            "INSERT INTO messages
                 (id, conversation_id, seq, sender_id, sender_role, content, attachment,
                  is_read, system_message_type, created_at)
             SELECT ?, ?,
                    (SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE conversation_id = ?),
                    ?, 'user', ?, ?, 0, NULL, ?
             WHERE EXISTS (
                 SELECT 1 FROM conversations WHERE id = ? AND version = ?
             )
             RETURNING seq",
        )
        .bind(&message.id)
        .bind(&message.conversation_id)
        .bind(&message.conversation_id)
        .bind(message.sender_id.as_deref())
        .bind(&message.content)
        .bind(message.attachment.as_deref())
        .bind(&message.created_at)
        .bind(&message.conversation_id)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            tracing::debug!(
                conversation_id = %message.conversation_id,
                expected_version,
                "Conversation moved before customer message was stored"
            );
            return Ok(None);
        };

        let mut stored = message.clone();
        stored.seq = row.try_get("seq")?;
        tracing::debug!(
            conversation_id = %stored.conversation_id,
            seq = stored.seq,
            "Customer message appended"
        );
        Ok(Some(stored))
    }

    async fn append_staff_message(
        &self,
        message: &Message,
        staff_id: &str,
    ) -> DomainResult<Option<Message>> {
        let row = sqlx::query(
            "INSERT INTO messages
                 (id, conversation_id, seq, sender_id, sender_role, content, attachment,
                  is_read, system_message_type, created_at)
             SELECT ?, ?,
                    (SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE conversation_id = ?),
                    ?, 'staff', ?, ?, 0, NULL, ?
             WHERE EXISTS (
                 SELECT 1 FROM conversations
                 WHERE id = ? AND status = 'active' AND assigned_staff_id = ?
             )
             RETURNING seq",
        )
        .bind(&message.id)
        .bind(&message.conversation_id)
        .bind(&message.conversation_id)
        .bind(staff_id)
        .bind(&message.content)
        .bind(message.attachment.as_deref())
        .bind(&message.created_at)
        .bind(&message.conversation_id)
        .bind(staff_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let mut stored = message.clone();
                stored.seq = row.try_get("seq")?;
                Ok(Some(stored))
            }
            None => Ok(None),
        }
    }

    async fn count_messages(&self, conversation_id: &str) -> DomainResult<i64> {
        let count: i64 =
            sqlx::query("SELECT COUNT(*) as count FROM messages WHERE conversation_id = ?")
                .bind(conversation_id)
                .fetch_one(&self.pool)
                .await?
                .try_get("count")?;
        Ok(count)
    }

    async fn list_messages_range(
        &self,
        conversation_id: &str,
        skip: i64,
        limit: i64,
    ) -> DomainResult<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, seq,
                    COALESCE(sender_id, '') AS sender_id, sender_role, content,
                    COALESCE(attachment, '') AS attachment, is_read,
                    COALESCE(system_message_type, '') AS system_message_type, created_at
             FROM messages
             WHERE conversation_id = ?
             ORDER BY seq ASC
             LIMIT ? OFFSET ?",
        )
        .bind(conversation_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            messages.push(message_from_row(row)?);
        }
        Ok(messages)
    }

    async fn mark_read(&self, conversation_id: &str, reader: SenderRole) -> DomainResult<u64> {
        // Customers read staff and system notes; staff read customer messages
        let sql = match reader {
            SenderRole::User => {
                "UPDATE messages SET is_read = 1
                 WHERE conversation_id = ? AND is_read = 0 AND sender_role <> 'user'"
            }
            _ => {
                "UPDATE messages SET is_read = 1
                 WHERE conversation_id = ? AND is_read = 0 AND sender_role = 'user'"
            }
        };

        let result = sqlx::query(sql)
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
