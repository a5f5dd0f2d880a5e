use crate::domain::events::RealtimeEvent;

/// Addressable fan-out of realtime events.
///
/// Emits never block and never fail; an event for a recipient with no live
/// connection is dropped.
pub trait Broadcaster: Send + Sync {
    fn to_room(&self, conversation_id: &str, event: RealtimeEvent);

    fn to_user(&self, user_id: &str, event: RealtimeEvent);

    fn to_all_staff(&self, event: RealtimeEvent);

    /// Room members plus the given users. Implementations that can see
    /// connections should deliver once per connection.
    fn to_room_and_users(&self, conversation_id: &str, user_ids: &[&str], event: RealtimeEvent) {
        self.to_room(conversation_id, event.clone());
        for user_id in user_ids {
            self.to_user(user_id, event.clone());
        }
    }
}
