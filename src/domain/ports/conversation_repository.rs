use crate::domain::entities::{Conversation, ConversationStatus};
use crate::domain::errors::DomainResult;
use crate::domain::services::state_machine::Transition;

#[async_trait::async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Returns the customer's conversation, creating a WAITING one if absent.
    /// The boolean is true when this call created it.
    async fn find_or_create_for_customer(
        &self,
        customer_id: &str,
    ) -> DomainResult<(Conversation, bool)>;

    async fn get_conversation_by_id(&self, id: &str) -> DomainResult<Option<Conversation>>;

    /// Compare-and-swap commit of a computed transition.
    ///
    /// Writes nothing and returns `None` if the stored version no longer
    /// matches the one the transition was computed from. On success the
    /// returned transition carries the bumped version and the stored system
    /// message.
    async fn commit_transition(&self, transition: &Transition) -> DomainResult<Option<Transition>>;

    /// Oldest first.
    async fn list_waiting(&self, limit: i64, offset: i64) -> DomainResult<(Vec<Conversation>, i64)>;

    async fn list_by_staff(
        &self,
        staff_id: &str,
        status: Option<ConversationStatus>,
    ) -> DomainResult<Vec<Conversation>>;

    async fn list_active_for_staff(&self, staff_id: &str) -> DomainResult<Vec<Conversation>>;
}
