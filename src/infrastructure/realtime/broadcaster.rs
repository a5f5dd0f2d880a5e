use super::presence::InMemoryPresenceRegistry;
use super::room::RoomManager;
use crate::domain::events::RealtimeEvent;
use crate::domain::ports::Broadcaster;
use std::collections::HashSet;
use std::sync::Arc;

/// Delivers events to live socket connections.
#[derive(Clone)]
pub struct WebSocketBroadcaster {
    presence: Arc<InMemoryPresenceRegistry>,
    rooms: Arc<RoomManager>,
}

impl WebSocketBroadcaster {
    pub fn new(presence: Arc<InMemoryPresenceRegistry>, rooms: Arc<RoomManager>) -> Self {
        Self { presence, rooms }
    }
}

impl Broadcaster for WebSocketBroadcaster {
    fn to_room(&self, conversation_id: &str, event: RealtimeEvent) {
        self.rooms.broadcast(conversation_id, &event);
    }

    fn to_user(&self, user_id: &str, event: RealtimeEvent) {
        let connections = self.presence.connections_for(user_id);
        if connections.is_empty() {
            tracing::debug!(user_id = %user_id, event = event.kind(), "User offline, event dropped");
            return;
        }
        for conn in connections {
            conn.send(event.clone());
        }
    }

    fn to_all_staff(&self, event: RealtimeEvent) {
        let connections = self.presence.staff_connections();
        tracing::debug!(event = event.kind(), recipients = connections.len(), "Broadcast to staff");
        for conn in connections {
            conn.send(event.clone());
        }
    }

    fn to_room_and_users(&self, conversation_id: &str, user_ids: &[&str], event: RealtimeEvent) {
        let mut seen = HashSet::new();
        let targets = self
            .rooms
            .members(conversation_id)
            .into_iter()
            .chain(
                user_ids
                    .iter()
                    .flat_map(|user_id| self.presence.connections_for(user_id)),
            );
        for conn in targets {
            if seen.insert(conn.session_id) {
                conn.send(event.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::ParticipantRole;
    use crate::infrastructure::realtime::connection::Connection;
    use tokio::sync::mpsc;

    #[test]
    fn test_room_and_user_delivery_is_deduplicated() {
        let presence = Arc::new(InMemoryPresenceRegistry::new());
        let rooms = Arc::new(RoomManager::new());
        let broadcaster = WebSocketBroadcaster::new(presence.clone(), rooms.clone());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let staff = Arc::new(Connection::new("staffA", ParticipantRole::Staff, tx));
        presence.connect(staff.clone());
        rooms.join("c1", &staff);

        broadcaster.to_room_and_users("c1", &["staffA"], RealtimeEvent::Pong);

        assert_eq!(rx.try_recv().unwrap(), RealtimeEvent::Pong);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_all_staff_skips_customers() {
        let presence = Arc::new(InMemoryPresenceRegistry::new());
        let broadcaster = WebSocketBroadcaster::new(presence.clone(), Arc::new(RoomManager::new()));

        let (staff_tx, mut staff_rx) = mpsc::unbounded_channel();
        let (cust_tx, mut cust_rx) = mpsc::unbounded_channel();
        presence.connect(Arc::new(Connection::new("s1", ParticipantRole::Staff, staff_tx)));
        presence.connect(Arc::new(Connection::new("c1", ParticipantRole::Customer, cust_tx)));

        broadcaster.to_all_staff(RealtimeEvent::Pong);

        assert!(staff_rx.try_recv().is_ok());
        assert!(cust_rx.try_recv().is_err());
    }
}
