use crate::application::services::NotificationService;
use crate::domain::entities::{
    now_timestamp, validate_content, Conversation, ConversationStatus, Message, PushPayload,
    SenderRole, UnassignReason,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::events::RealtimeEvent;
use crate::domain::ports::{
    Broadcaster, ConversationRepository, MessageRepository, PresenceRegistry, TaskSpawner,
};
use crate::domain::services::state_machine::{self, Transition, TransitionKind};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

const RETRY_DELAYS_MS: [u64; 3] = [50, 100, 200];

#[derive(Debug, Clone, Copy)]
pub struct AssignmentSettings {
    /// Retries after a stale-version commit before giving up.
    pub max_retries: u32,
    pub history_default_limit: i64,
    pub history_max_limit: i64,
}

impl Default for AssignmentSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            history_default_limit: 20,
            history_max_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SendUserMessageResult {
    pub conversation: Conversation,
    pub message: Message,
    pub is_new_conversation: bool,
    pub is_reopened: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct WaitingPage {
    pub conversations: Vec<Conversation>,
    pub total_count: i64,
    pub current_page: i64,
    pub total_pages: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HistoryPagination {
    pub current_page: i64,
    pub limit: i64,
    pub total_messages: i64,
    pub total_pages: i64,
    pub has_more_messages: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationHistory {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
    pub pagination: HistoryPagination,
}

enum TransitionOutcome {
    Committed(Transition),
    /// Current state already satisfies the request; nothing was written.
    Unchanged(Conversation),
}

fn total_pages(total: i64, limit: i64) -> i64 {
    if total <= 0 {
        0
    } else {
        (total + limit - 1) / limit
    }
}

fn require(value: &str, field: &str) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::ValidationError(format!("{} is required", field)));
    }
    Ok(())
}

/// Routes customer conversations to exactly one staff member at a time.
///
/// Every state change is computed by [`state_machine`] and committed with a
/// version check, so concurrent requests on one conversation (from this or
/// another process) serialize in the store. Broadcasts follow a successful
/// commit and cannot fail the operation; pushes run on the task spawner.
#[derive(Clone)]
pub struct AssignmentService {
    conversation_repo: Arc<dyn ConversationRepository>,
    message_repo: Arc<dyn MessageRepository>,
    presence: Arc<dyn PresenceRegistry>,
    broadcaster: Arc<dyn Broadcaster>,
    notifications: NotificationService,
    task_spawner: Arc<dyn TaskSpawner>,
    settings: AssignmentSettings,
}

impl AssignmentService {
    pub fn new(
        conversation_repo: Arc<dyn ConversationRepository>,
        message_repo: Arc<dyn MessageRepository>,
        presence: Arc<dyn PresenceRegistry>,
        broadcaster: Arc<dyn Broadcaster>,
        notifications: NotificationService,
        task_spawner: Arc<dyn TaskSpawner>,
        settings: AssignmentSettings,
    ) -> Self {
        Self {
            conversation_repo,
            message_repo,
            presence,
            broadcaster,
            notifications,
            task_spawner,
            settings,
        }
    }

    async fn load(&self, conversation_id: &str) -> DomainResult<Conversation> {
        self.conversation_repo
            .get_conversation_by_id(conversation_id)
            .await?
            .ok_or_else(|| {
                DomainError::NotFound(format!("Conversation {} not found", conversation_id))
            })
    }

    /// Loads, computes and commits a transition, retrying on a stale version.
    ///
    /// `compute` runs against fresh state on every attempt, so preconditions
    /// are re-checked after losing a race.
    async fn run_transition<F>(
        &self,
        conversation_id: &str,
        mut compute: F,
    ) -> DomainResult<TransitionOutcome>
    where
        F: FnMut(&Conversation) -> DomainResult<Option<Transition>>,
    {
        for attempt in 0..=self.settings.max_retries {
            let conversation = self.load(conversation_id).await?;
            let transition = match compute(&conversation)? {
                Some(t) => t,
                None => return Ok(TransitionOutcome::Unchanged(conversation)),
            };

            match self.conversation_repo.commit_transition(&transition).await? {
                Some(committed) => {
                    metrics::counter!(
                        "chat_transitions_total",
                        "transition" => committed.kind.as_str()
                    )
                    .increment(1);
                    tracing::info!(
                        conversation_id = %conversation_id,
                        transition = committed.kind.as_str(),
                        from = %committed.previous_status,
                        to = %committed.conversation.status,
                        staff_id = ?committed.conversation.assigned_staff_id,
                        "Conversation transition committed"
                    );
                    return Ok(TransitionOutcome::Committed(committed));
                }
                None if attempt < self.settings.max_retries => {
                    let delay_ms =
                        RETRY_DELAYS_MS[(attempt as usize).min(RETRY_DELAYS_MS.len() - 1)];
                    tracing::info!(
                        conversation_id = %conversation_id,
                        attempt = attempt + 1,
                        delay_ms,
                        "Stale conversation version, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                None => break,
            }
        }

        Err(DomainError::Conflict(format!(
            "Conversation {} is being modified concurrently",
            conversation_id
        )))
    }

    /// Sends the events that document a committed transition.
    fn publish_transition(&self, transition: &Transition) {
        let conversation = &transition.conversation;
        let timestamp = conversation.updated_at.clone();

        if let Some(message) = &transition.system_message {
            self.broadcaster
                .to_room(&conversation.id, RealtimeEvent::for_message(message.clone()));
        }

        match transition.kind {
            TransitionKind::Taken | TransitionKind::ReopenedToActive => {
                let staff_id = conversation.assigned_staff_id.clone().unwrap_or_default();
                self.broadcaster.to_room_and_users(
                    &conversation.id,
                    &[staff_id.as_str()],
                    RealtimeEvent::ChatAssigned {
                        conversation_id: conversation.id.clone(),
                        staff_id: staff_id.clone(),
                        conversation: conversation.clone(),
                        timestamp: timestamp.clone(),
                    },
                );
                // Queue views drop the conversation
                self.broadcaster.to_all_staff(RealtimeEvent::ConversationUpdated {
                    conversation: conversation.clone(),
                    timestamp,
                });
            }
            TransitionKind::Transferred => {
                let from = transition.previous_staff_id.clone().unwrap_or_default();
                let to = conversation.assigned_staff_id.clone().unwrap_or_default();
                self.broadcaster.to_room_and_users(
                    &conversation.id,
                    &[from.as_str(), to.as_str()],
                    RealtimeEvent::ChatTransferred {
                        conversation_id: conversation.id.clone(),
                        from_staff_id: from.clone(),
                        to_staff_id: to.clone(),
                        conversation: conversation.clone(),
                        timestamp,
                    },
                );
            }
            TransitionKind::Released => {
                self.broadcaster.to_room(
                    &conversation.id,
                    RealtimeEvent::ConversationUpdated {
                        conversation: conversation.clone(),
                        timestamp: timestamp.clone(),
                    },
                );
                self.broadcaster.to_all_staff(RealtimeEvent::NewWaitingChat {
                    conversation: conversation.clone(),
                    message: None,
                    timestamp,
                });
            }
            TransitionKind::Closed => {
                let event = RealtimeEvent::ConversationClosed {
                    conversation_id: conversation.id.clone(),
                    timestamp,
                };
                match transition.previous_staff_id.as_deref() {
                    Some(staff_id) => {
                        self.broadcaster
                            .to_room_and_users(&conversation.id, &[staff_id], event)
                    }
                    None => self.broadcaster.to_room(&conversation.id, event),
                }
                if transition.previous_status == ConversationStatus::Waiting {
                    self.broadcaster.to_all_staff(RealtimeEvent::ConversationUpdated {
                        conversation: conversation.clone(),
                        timestamp: conversation.updated_at.clone(),
                    });
                }
            }
            // The customer message that triggered it is announced to the queue
            TransitionKind::ReopenedToWaiting => {}
        }
    }

    fn schedule_push(&self, recipient_id: String, payload: PushPayload) {
        let notifications = self.notifications.clone();
        self.task_spawner.spawn(Box::pin(async move {
            if let Some(report) = notifications
                .notify_if_offline(&recipient_id, &payload)
                .await
            {
                if report.failure_count > 0 {
                    tracing::warn!(
                        recipient_id = %recipient_id,
                        failures = report.failure_count,
                        errors = ?report.errors,
                        "Push delivery failed for some targets"
                    );
                }
            }
        }));
    }

    /// Reopens a CLOSED conversation for an incoming customer message and
    /// publishes the reopen once committed. `None` if it already left CLOSED.
    async fn reopen_for_customer(&self, conversation_id: &str) -> DomainResult<Option<Conversation>> {
        let presence = &self.presence;
        let outcome = self
            .run_transition(conversation_id, |current| {
                if current.status != ConversationStatus::Closed {
                    return Ok(None);
                }
                let reclaim = current
                    .last_assigned_staff_id
                    .as_deref()
                    .filter(|staff_id| presence.is_online(staff_id));
                Ok(Some(state_machine::reopen(current, reclaim, &now_timestamp())?))
            })
            .await?;

        match outcome {
            TransitionOutcome::Committed(t) => {
                self.publish_transition(&t);
                Ok(Some(t.conversation))
            }
            TransitionOutcome::Unchanged(_) => Ok(None),
        }
    }

    pub async fn send_user_message(
        &self,
        customer_id: &str,
        content: &str,
        attachment: Option<String>,
    ) -> DomainResult<SendUserMessageResult> {
        require(customer_id, "customer_id")?;
        validate_content(content, attachment.as_deref()).map_err(DomainError::ValidationError)?;

        let (mut conversation, is_new_conversation) = self
            .conversation_repo
            .find_or_create_for_customer(customer_id)
            .await?;
        if is_new_conversation {
            tracing::info!(
                conversation_id = %conversation.id,
                customer_id = %customer_id,
                "Conversation created"
            );
        }

        let draft = Message::from_customer(
            conversation.id.clone(),
            customer_id.to_string(),
            content.to_string(),
            attachment,
        );
        let mut is_reopened = false;
        let mut attempt = 0;
        let message = loop {
            if conversation.status == ConversationStatus::Closed {
                if let Some(current) = self.reopen_for_customer(&conversation.id).await? {
                    is_reopened = true;
                    conversation = current;
                } else {
                    conversation = self.load(&conversation.id).await?;
                }
            }

            // Stored only against the state the routing below was decided on
            match self
                .message_repo
                .append_customer_message(&draft, conversation.version)
                .await?
            {
                Some(message) => break message,
                None if attempt < self.settings.max_retries => {
                    let delay_ms =
                        RETRY_DELAYS_MS[(attempt as usize).min(RETRY_DELAYS_MS.len() - 1)];
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    conversation = self.load(&conversation.id).await?;
                }
                None => {
                    return Err(DomainError::Conflict(format!(
                        "Conversation {} is being modified concurrently",
                        conversation.id
                    )))
                }
            }
        };

        let timestamp = message.created_at.clone();
        match (conversation.status, conversation.assigned_staff_id.clone()) {
            (ConversationStatus::Active, Some(staff_id)) => {
                let event = RealtimeEvent::for_message(message.clone());
                self.broadcaster
                    .to_room_and_users(&conversation.id, &[staff_id.as_str()], event.clone());
                if is_reopened {
                    self.broadcaster.to_all_staff(event);
                }
                self.schedule_push(
                    staff_id,
                    PushPayload::new_message(&conversation.id, "customer", content),
                );
            }
            _ => {
                self.broadcaster
                    .to_room(&conversation.id, RealtimeEvent::for_message(message.clone()));
                let announce = is_new_conversation || is_reopened;
                let event = if announce {
                    RealtimeEvent::NewWaitingChat {
                        conversation: conversation.clone(),
                        message: Some(message.clone()),
                        timestamp,
                    }
                } else {
                    RealtimeEvent::for_message(message.clone())
                };
                self.broadcaster.to_all_staff(event);
            }
        }

        Ok(SendUserMessageResult {
            conversation,
            message,
            is_new_conversation,
            is_reopened,
        })
    }

    pub async fn take_chat(&self, conversation_id: &str, staff_id: &str) -> DomainResult<Conversation> {
        require(conversation_id, "conversation_id")?;
        require(staff_id, "staff_id")?;

        let outcome = self
            .run_transition(conversation_id, |current| {
                Ok(Some(state_machine::take(current, staff_id, &now_timestamp())?))
            })
            .await;

        match outcome {
            Ok(TransitionOutcome::Committed(t)) => {
                self.publish_transition(&t);
                Ok(t.conversation)
            }
            Ok(TransitionOutcome::Unchanged(current)) => Ok(current),
            Err(DomainError::Conflict(msg)) => {
                metrics::counter!("chat_take_conflicts_total").increment(1);
                tracing::info!(
                    conversation_id = %conversation_id,
                    staff_id = %staff_id,
                    "Take rejected: {}",
                    msg
                );
                Err(DomainError::Conflict(msg))
            }
            Err(e) => Err(e),
        }
    }

    /// Only the current owner may speak.
    pub async fn send_staff_message(
        &self,
        conversation_id: &str,
        staff_id: &str,
        content: &str,
        attachment: Option<String>,
    ) -> DomainResult<Message> {
        require(conversation_id, "conversation_id")?;
        require(staff_id, "staff_id")?;
        validate_content(content, attachment.as_deref()).map_err(DomainError::ValidationError)?;

        let conversation = self.load(conversation_id).await?;
        let not_owner = || {
            DomainError::Forbidden(format!(
                "Staff {} is not assigned to conversation {}",
                staff_id, conversation_id
            ))
        };
        if !conversation.is_assigned_to(staff_id) {
            return Err(not_owner());
        }

        let draft = Message::from_staff(
            conversation_id.to_string(),
            staff_id.to_string(),
            content.to_string(),
            attachment,
        );
        // Ownership may have moved since the load
        let message = self
            .message_repo
            .append_staff_message(&draft, staff_id)
            .await?
            .ok_or_else(not_owner)?;

        self.broadcaster
            .to_room(conversation_id, RealtimeEvent::for_message(message.clone()));
        self.schedule_push(
            conversation.customer_id.clone(),
            PushPayload::new_message(conversation_id, "support", content),
        );

        Ok(message)
    }

    pub async fn transfer_chat(
        &self,
        conversation_id: &str,
        current_staff_id: &str,
        new_staff_id: &str,
    ) -> DomainResult<Conversation> {
        require(conversation_id, "conversation_id")?;
        require(current_staff_id, "staff_id")?;
        require(new_staff_id, "new_staff_id")?;

        let outcome = self
            .run_transition(conversation_id, |current| {
                Ok(Some(state_machine::transfer(
                    current,
                    current_staff_id,
                    new_staff_id,
                    &now_timestamp(),
                )?))
            })
            .await?;

        match outcome {
            TransitionOutcome::Committed(t) => {
                self.publish_transition(&t);
                Ok(t.conversation)
            }
            TransitionOutcome::Unchanged(current) => Ok(current),
        }
    }

    /// Returns every conversation held by `staff_id` to the queue.
    ///
    /// Each conversation commits on its own; a failure on one is logged and
    /// the batch continues. Returns the ids that were released.
    pub async fn handle_staff_offline(
        &self,
        staff_id: &str,
        reason: UnassignReason,
    ) -> DomainResult<Vec<String>> {
        require(staff_id, "staff_id")?;

        let held = self.conversation_repo.list_active_for_staff(staff_id).await?;
        let mut released = Vec::with_capacity(held.len());

        for conversation in held {
            let outcome = self
                .run_transition(&conversation.id, |current| {
                    Ok(state_machine::release(current, staff_id, reason, &now_timestamp()))
                })
                .await;
            match outcome {
                Ok(TransitionOutcome::Committed(t)) => {
                    self.publish_transition(&t);
                    released.push(t.conversation.id);
                }
                Ok(TransitionOutcome::Unchanged(_)) => {}
                Err(e) => tracing::warn!(
                    conversation_id = %conversation.id,
                    staff_id = %staff_id,
                    error = %e,
                    "Failed to release conversation, continuing"
                ),
            }
        }

        tracing::info!(
            staff_id = %staff_id,
            reason = %reason,
            released = released.len(),
            "Released conversations of departing staff"
        );
        Ok(released)
    }

    /// Closing an already closed conversation returns it unchanged.
    pub async fn close_conversation(&self, conversation_id: &str) -> DomainResult<Conversation> {
        require(conversation_id, "conversation_id")?;

        let outcome = self
            .run_transition(conversation_id, |current| {
                Ok(state_machine::close(current, &now_timestamp()))
            })
            .await?;

        match outcome {
            TransitionOutcome::Committed(t) => {
                self.publish_transition(&t);
                Ok(t.conversation)
            }
            TransitionOutcome::Unchanged(current) => {
                tracing::debug!(conversation_id = %conversation_id, "Conversation already closed");
                Ok(current)
            }
        }
    }

    pub async fn list_waiting(&self, page: i64, limit: i64) -> DomainResult<WaitingPage> {
        self.validate_page(page, limit)?;
        let (conversations, total_count) = self
            .conversation_repo
            .list_waiting(limit, (page - 1) * limit)
            .await?;

        Ok(WaitingPage {
            conversations,
            total_count,
            current_page: page,
            total_pages: total_pages(total_count, limit),
        })
    }

    pub async fn list_staff_conversations(
        &self,
        staff_id: &str,
        status: Option<ConversationStatus>,
    ) -> DomainResult<Vec<Conversation>> {
        require(staff_id, "staff_id")?;
        self.conversation_repo.list_by_staff(staff_id, status).await
    }

    /// Reverse-paginated history: page 1 is the newest `limit` messages.
    ///
    /// Each page covers `[total - page*limit, total - (page-1)*limit)`
    /// clamped at zero, returned oldest first.
    pub async fn get_conversation_history(
        &self,
        conversation_id: &str,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> DomainResult<ConversationHistory> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(self.settings.history_default_limit);
        self.validate_page(page, limit)?;

        let conversation = self.load(conversation_id).await?;
        let total_messages = self.message_repo.count_messages(conversation_id).await?;

        let end = (total_messages - (page - 1) * limit).max(0);
        let skip = (total_messages - page * limit).max(0);
        let messages = if end > skip {
            self.message_repo
                .list_messages_range(conversation_id, skip, end - skip)
                .await?
        } else {
            Vec::new()
        };

        Ok(ConversationHistory {
            conversation,
            messages,
            pagination: HistoryPagination {
                current_page: page,
                limit,
                total_messages,
                total_pages: total_pages(total_messages, limit),
                has_more_messages: skip > 0,
            },
        })
    }

    /// Marks the other side's messages read for `reader`.
    pub async fn mark_read(&self, conversation_id: &str, reader: SenderRole) -> DomainResult<u64> {
        if reader == SenderRole::System {
            return Err(DomainError::ValidationError(
                "System cannot mark messages read".to_string(),
            ));
        }
        self.load(conversation_id).await?;
        let flipped = self.message_repo.mark_read(conversation_id, reader).await?;
        tracing::debug!(conversation_id = %conversation_id, reader = %reader, flipped, "Messages marked read");
        Ok(flipped)
    }

    pub async fn get_conversation(&self, conversation_id: &str) -> DomainResult<Conversation> {
        self.load(conversation_id).await
    }

    fn validate_page(&self, page: i64, limit: i64) -> DomainResult<()> {
        if page < 1 {
            return Err(DomainError::ValidationError("page must be at least 1".to_string()));
        }
        if limit < 1 || limit > self.settings.history_max_limit {
            return Err(DomainError::ValidationError(format!(
                "limit must be between 1 and {}",
                self.settings.history_max_limit
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0, 20), 0);
        assert_eq!(total_pages(1, 20), 1);
        assert_eq!(total_pages(40, 20), 2);
        assert_eq!(total_pages(41, 20), 3);
    }

    #[test]
    fn test_require_rejects_blank() {
        assert!(require(" ", "staff_id").is_err());
        assert!(require("s1", "staff_id").is_ok());
    }
}
