// Integration tests for storing customer messages against concurrent conversation changes
use evdesk::domain::entities::{
    now_timestamp, ConversationStatus, Message, SenderRole, SystemMessageType,
};
use evdesk::domain::errors::{DomainError, DomainResult};
use evdesk::domain::ports::{ConversationRepository, MessageRepository};
use evdesk::domain::services::state_machine;
use evdesk::infrastructure::persistence::Database;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

mod helpers;
use helpers::*;

/// Delegates to the database, optionally failing or racing customer appends.
struct ScriptedMessages {
    db: Database,
    fail_customer_appends: Arc<AtomicBool>,
    close_before_next_append: Arc<AtomicBool>,
}

impl ScriptedMessages {
    async fn close_conversation(&self, conversation_id: &str) -> DomainResult<()> {
        let current = self
            .db
            .get_conversation_by_id(conversation_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(conversation_id.to_string()))?;
        if let Some(transition) = state_machine::close(&current, &now_timestamp()) {
            self.db.commit_transition(&transition).await?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl MessageRepository for ScriptedMessages {
    async fn append_customer_message(
        &self,
        message: &Message,
        expected_version: i64,
    ) -> DomainResult<Option<Message>> {
        if self.fail_customer_appends.load(Ordering::SeqCst) {
            return Err(DomainError::Internal("message store unavailable".to_string()));
        }
        if self.close_before_next_append.swap(false, Ordering::SeqCst) {
            self.close_conversation(&message.conversation_id).await?;
        }
        self.db.append_customer_message(message, expected_version).await
    }

    async fn append_staff_message(
        &self,
        message: &Message,
        staff_id: &str,
    ) -> DomainResult<Option<Message>> {
        self.db.append_staff_message(message, staff_id).await
    }

    async fn count_messages(&self, conversation_id: &str) -> DomainResult<i64> {
        self.db.count_messages(conversation_id).await
    }

    async fn list_messages_range(
        &self,
        conversation_id: &str,
        skip: i64,
        limit: i64,
    ) -> DomainResult<Vec<Message>> {
        self.db
            .list_messages_range(conversation_id, skip, limit)
            .await
    }

    async fn mark_read(&self, conversation_id: &str, reader: SenderRole) -> DomainResult<u64> {
        self.db.mark_read(conversation_id, reader).await
    }
}

struct ScriptedHarness {
    h: ChatHarness,
    fail_customer_appends: Arc<AtomicBool>,
    close_before_next_append: Arc<AtomicBool>,
}

async fn scripted_harness() -> ScriptedHarness {
    let fail_customer_appends = Arc::new(AtomicBool::new(false));
    let close_before_next_append = Arc::new(AtomicBool::new(false));
    let (fail, close) = (
        Arc::clone(&fail_customer_appends),
        Arc::clone(&close_before_next_append),
    );
    let h = chat_harness_with_messages(move |db| {
        Arc::new(ScriptedMessages {
            db,
            fail_customer_appends: fail,
            close_before_next_append: close,
        }) as Arc<dyn MessageRepository>
    })
    .await;

    ScriptedHarness {
        h,
        fail_customer_appends,
        close_before_next_append,
    }
}

#[tokio::test]
async fn test_unassigned_fields_read_back_as_none() {
    let t = setup_test_db().await;

    let (conversation, created) = assert_ok!(t.db.find_or_create_for_customer("cust1").await);
    assert!(created);
    assert_eq!(conversation.status, ConversationStatus::Waiting);
    assert_eq!(conversation.assigned_staff_id, None);
    assert_eq!(conversation.last_assigned_staff_id, None);
    assert!(conversation.assignment_history.is_empty());

    let draft = Message::from_customer(
        conversation.id.clone(),
        "cust1".to_string(),
        "Charger offline".to_string(),
        None,
    );
    let stored = assert_ok!(
        t.db
            .append_customer_message(&draft, conversation.version)
            .await
    );
    assert_eq!(stored.map(|m| m.seq), Some(1));

    let messages = assert_ok!(t.db.list_messages_range(&conversation.id, 0, 10).await);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].sender_id.as_deref(), Some("cust1"));
    assert_eq!(messages[0].attachment, None);
    assert_eq!(messages[0].system_message_type, None);
    assert!(!messages[0].is_read);
}

#[tokio::test]
async fn test_released_history_entry_reads_back() {
    let h = chat_harness().await;
    let id = h
        .service
        .send_user_message("u1", "Hello", None)
        .await
        .unwrap()
        .conversation
        .id;
    h.service.take_chat(&id, "staffA").await.unwrap();
    h.service.close_conversation(&id).await.unwrap();

    let closed = assert_ok!(h.test_db.db.get_conversation_by_id(&id).await).unwrap();
    let entry = closed.assignment_history.last().unwrap();
    assert_eq!(entry.staff_id, "staffA");
    assert!(entry.unassigned_at.is_some());
    assert_eq!(entry.unassign_reason, None);

    let history = h
        .service
        .get_conversation_history(&id, None, None)
        .await
        .unwrap();
    assert!(history
        .messages
        .iter()
        .filter(|m| m.is_system())
        .all(|m| m.sender_id.is_none() && m.system_message_type.is_some()));
}

#[tokio::test]
async fn test_customer_message_refused_on_stale_version() {
    let t = setup_test_db().await;
    let (conversation, _) = t.db.find_or_create_for_customer("cust1").await.unwrap();

    let taken = state_machine::take(&conversation, "staffA", &now_timestamp()).unwrap();
    t.db.commit_transition(&taken).await.unwrap().unwrap();

    let draft = Message::from_customer(
        conversation.id.clone(),
        "cust1".to_string(),
        "Are you there?".to_string(),
        None,
    );
    let stale = assert_ok!(
        t.db
            .append_customer_message(&draft, conversation.version)
            .await
    );
    assert!(stale.is_none());

    // Only the assignment note was written
    assert_eq!(t.db.count_messages(&conversation.id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_close_racing_customer_message_reopens_conversation() {
    let s = scripted_harness().await;
    let h = &s.h;
    h.presence.set_online("staffA", true);

    let id = h
        .service
        .send_user_message("u1", "Hello", None)
        .await
        .unwrap()
        .conversation
        .id;
    h.service.take_chat(&id, "staffA").await.unwrap();
    h.broadcaster.clear();

    // The conversation closes between the lookup and the insert
    s.close_before_next_append.store(true, Ordering::SeqCst);
    let result = assert_ok!(
        h.service
            .send_user_message("u1", "One more thing", None)
            .await
    );

    assert!(result.is_reopened);
    assert_eq!(result.conversation.status, ConversationStatus::Active);
    assert_eq!(result.conversation.assigned_staff_id.as_deref(), Some("staffA"));

    let stored = h.service.get_conversation(&id).await.unwrap();
    assert_eq!(stored.status, ConversationStatus::Active);
    assert_eq!(stored.version, result.conversation.version);

    let history = h
        .service
        .get_conversation_history(&id, None, None)
        .await
        .unwrap();
    let tail: Vec<(SenderRole, Option<SystemMessageType>)> = history
        .messages
        .iter()
        .rev()
        .take(3)
        .rev()
        .map(|m| (m.sender_role, m.system_message_type))
        .collect();
    assert_eq!(
        tail,
        vec![
            (SenderRole::System, Some(SystemMessageType::ConversationClosed)),
            (SenderRole::System, Some(SystemMessageType::StaffAssigned)),
            (SenderRole::User, None),
        ]
    );
    let assigned_to_owner = h
        .broadcaster
        .kinds_for(&Target::User("staffA".to_string()))
        .into_iter()
        .filter(|kind| *kind == "chat_assigned")
        .count();
    assert_eq!(assigned_to_owner, 1);
}

#[tokio::test]
async fn test_failed_store_after_reopen_still_announces_assignment() {
    let s = scripted_harness().await;
    let h = &s.h;
    h.presence.set_online("staffA", true);

    let id = h
        .service
        .send_user_message("u1", "Hello", None)
        .await
        .unwrap()
        .conversation
        .id;
    h.service.take_chat(&id, "staffA").await.unwrap();
    h.service.close_conversation(&id).await.unwrap();
    h.broadcaster.clear();

    s.fail_customer_appends.store(true, Ordering::SeqCst);
    let err = assert_err!(
        h.service
            .send_user_message("u1", "It happened again", None)
            .await
    );
    assert!(matches!(err, DomainError::Internal(_)));

    // The reopen committed, so staff must have heard about it
    let stored = h.service.get_conversation(&id).await.unwrap();
    assert_eq!(stored.status, ConversationStatus::Active);
    assert_eq!(stored.assigned_staff_id.as_deref(), Some("staffA"));
    assert!(h
        .broadcaster
        .kinds_for(&Target::User("staffA".to_string()))
        .contains(&"chat_assigned"));
    assert!(h
        .broadcaster
        .kinds_for(&Target::AllStaff)
        .contains(&"conversation_updated"));

    // Retrying once the store recovers does not reopen twice
    s.fail_customer_appends.store(false, Ordering::SeqCst);
    let retried = h
        .service
        .send_user_message("u1", "It happened again", None)
        .await
        .unwrap();
    assert!(!retried.is_reopened);
    assert_eq!(retried.conversation.assignment_history.len(), 2);
}
