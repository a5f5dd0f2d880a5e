use crate::domain::entities::{Message, SenderRole};
use crate::domain::errors::DomainResult;

#[async_trait::async_trait]
pub trait MessageRepository: Send + Sync {
    /// Stores a customer message only while the conversation is still at
    /// `expected_version`. Returns it with its sequence number.
    async fn append_customer_message(
        &self,
        message: &Message,
        expected_version: i64,
    ) -> DomainResult<Option<Message>>;

    /// Stores the message only while `staff_id` owns the conversation.
    async fn append_staff_message(
        &self,
        message: &Message,
        staff_id: &str,
    ) -> DomainResult<Option<Message>>;

    async fn count_messages(&self, conversation_id: &str) -> DomainResult<i64>;

    /// Ascending by sequence.
    async fn list_messages_range(
        &self,
        conversation_id: &str,
        skip: i64,
        limit: i64,
    ) -> DomainResult<Vec<Message>>;

    /// Marks the other side's messages read. Returns how many flipped.
    async fn mark_read(&self, conversation_id: &str, reader: SenderRole) -> DomainResult<u64>;
}
