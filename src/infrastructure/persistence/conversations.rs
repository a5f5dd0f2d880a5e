use crate::domain::entities::{
    AssignmentHistory, AssignmentRecord, Conversation, ConversationStatus,
    UnassignReason,
};
use crate::domain::errors::DomainResult;
use crate::domain::ports::ConversationRepository;
use crate::domain::services::state_machine::{HistoryChange, Transition};
use crate::infrastructure::persistence::messages::insert_message_query;
use crate::infrastructure::persistence::{optional_text, Database};
use sqlx::any::AnyRow;
use sqlx::Row;

const CONVERSATION_COLUMNS: &str = "id, customer_id, status, \
     COALESCE(assigned_staff_id, '') AS assigned_staff_id, \
     COALESCE(last_assigned_staff_id, '') AS last_assigned_staff_id, \
     version, created_at, updated_at";

fn conversation_from_row(row: &AnyRow, history: AssignmentHistory) -> Result<Conversation, sqlx::Error> {
    Ok(Conversation {
        id: row.try_get("id")?,
        customer_id: row.try_get("customer_id")?,
        status: row.try_get("status")?,
        assigned_staff_id: optional_text(row, "assigned_staff_id")?,
        last_assigned_staff_id: optional_text(row, "last_assigned_staff_id")?,
        assignment_history: history,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: row.try_get("version")?,
    })
}

impl Database {
    async fn load_history(&self, conversation_id: &str) -> DomainResult<AssignmentHistory> {
        let rows = sqlx::query(
            "SELECT staff_id, assigned_at,
                    COALESCE(unassigned_at, '') AS unassigned_at,
                    COALESCE(unassign_reason, '') AS unassign_reason
             FROM assignment_history
             WHERE conversation_id = ?
             ORDER BY position ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let reason = optional_text(&row, "unassign_reason")?;
            entries.push(AssignmentRecord {
                staff_id: row.try_get("staff_id")?,
                assigned_at: row.try_get("assigned_at")?,
                unassigned_at: optional_text(&row, "unassigned_at")?,
                unassign_reason: reason.as_deref().and_then(UnassignReason::parse),
            });
        }
        Ok(AssignmentHistory::from(entries))
    }

    async fn hydrate(&self, rows: Vec<AnyRow>) -> DomainResult<Vec<Conversation>> {
        let mut conversations = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id")?;
            let history = self.load_history(&id).await?;
            conversations.push(conversation_from_row(&row, history)?);
        }
        Ok(conversations)
    }
}

#[async_trait::async_trait]
impl ConversationRepository for Database {
    async fn find_or_create_for_customer(
        &self,
        customer_id: &str,
    ) -> DomainResult<(Conversation, bool)> {
        let candidate = Conversation::new(customer_id.to_string());

        // One conversation per customer; a concurrent first message loses here
        let inserted = sqlx::query(
            "INSERT INTO conversations (id, customer_id, status, version, created_at, updated_at)
             VALUES (?, ?, 'waiting', 0, ?, ?)
             ON CONFLICT (customer_id) DO NOTHING",
        )
        .bind(&candidate.id)
        .bind(customer_id)
        .bind(&candidate.created_at)
        .bind(&candidate.updated_at)
        .execute(&self.pool)
        .await?
        .rows_affected()
            > 0;

        let row = sqlx::query(&format!(
            "SELECT {} FROM conversations WHERE customer_id = ?",
            CONVERSATION_COLUMNS
        ))
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await?;

        let id: String = row.try_get("id")?;
        let history = self.load_history(&id).await?;
        Ok((conversation_from_row(&row, history)?, inserted))
    }

    async fn get_conversation_by_id(&self, id: &str) -> DomainResult<Option<Conversation>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM conversations WHERE id = ?",
            CONVERSATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let history = self.load_history(id).await?;
                Ok(Some(conversation_from_row(&row, history)?))
            }
            None => Ok(None),
        }
    }

    async fn commit_transition(&self, transition: &Transition) -> DomainResult<Option<Transition>> {
        let conversation = &transition.conversation;
        let mut tx = self.pool.begin().await?;

        // The version check goes first so the transaction takes the write lock
        // before reading anything.
        let updated = sqlx::query(
            "UPDATE conversations
             SET status = ?, assigned_staff_id = ?, last_assigned_staff_id = ?,
                 updated_at = ?, version = version + 1
             WHERE id = ? AND version = ?",
        )
        .bind(conversation.status.as_str())
        .bind(conversation.assigned_staff_id.as_deref())
        .bind(conversation.last_assigned_staff_id.as_deref())
        .bind(&conversation.updated_at)
        .bind(&conversation.id)
        .bind(transition.expected_version())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            tracing::debug!(
                conversation_id = %conversation.id,
                expected_version = transition.expected_version(),
                "Stale conversation version"
            );
            return Ok(None);
        }

        for change in &transition.history_changes {
            match change {
                HistoryChange::Closed {
                    position,
                    unassigned_at,
                    reason,
                } => {
                    sqlx::query(
                        "UPDATE assignment_history
                         SET unassigned_at = ?, unassign_reason = ?
                         WHERE conversation_id = ? AND position = ? AND unassigned_at IS NULL",
                    )
                    .bind(unassigned_at)
                    .bind(reason.map(|r| r.as_str()))
                    .bind(&conversation.id)
                    .bind(*position as i64)
                    .execute(&mut *tx)
                    .await?;
                }
                HistoryChange::Opened { position, record } => {
                    sqlx::query(
                        "INSERT INTO assignment_history
                             (conversation_id, position, staff_id, assigned_at, unassigned_at, unassign_reason)
                         VALUES (?, ?, ?, ?, NULL, NULL)",
                    )
                    .bind(&conversation.id)
                    .bind(*position as i64)
                    .bind(&record.staff_id)
                    .bind(&record.assigned_at)
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        let mut committed = transition.clone();
        if let Some(message) = committed.system_message.as_mut() {
            let row = insert_message_query(message).fetch_one(&mut *tx).await?;
            message.seq = row.try_get("seq")?;
        }

        tx.commit().await?;
        committed.conversation.version += 1;
        Ok(Some(committed))
    }

    async fn list_waiting(&self, limit: i64, offset: i64) -> DomainResult<(Vec<Conversation>, i64)> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM conversations
             WHERE status = 'waiting'
             ORDER BY created_at ASC, id ASC
             LIMIT ? OFFSET ?",
            CONVERSATION_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 =
            sqlx::query("SELECT COUNT(*) as count FROM conversations WHERE status = 'waiting'")
                .fetch_one(&self.pool)
                .await?
                .try_get("count")?;

        Ok((self.hydrate(rows).await?, total))
    }

    async fn list_by_staff(
        &self,
        staff_id: &str,
        status: Option<ConversationStatus>,
    ) -> DomainResult<Vec<Conversation>> {
        let rows = match status {
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM conversations
                     WHERE assigned_staff_id = ? AND status = 'active'
                     ORDER BY updated_at DESC",
                    CONVERSATION_COLUMNS
                ))
                .bind(staff_id)
                .fetch_all(&self.pool)
                .await?
            }
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {} FROM conversations
                     WHERE last_assigned_staff_id = ? AND status = ?
                     ORDER BY updated_at DESC",
                    CONVERSATION_COLUMNS
                ))
                .bind(staff_id)
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
        };
        self.hydrate(rows).await
    }

    async fn list_active_for_staff(&self, staff_id: &str) -> DomainResult<Vec<Conversation>> {
        self.list_by_staff(staff_id, None).await
    }
}
