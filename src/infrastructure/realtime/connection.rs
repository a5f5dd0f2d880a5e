//! A live realtime connection and the rooms it has joined.

use crate::domain::entities::ParticipantRole;
use crate::domain::events::RealtimeEvent;
use std::collections::HashSet;
use std::sync::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug)]
pub struct Connection {
    /// Unique per socket; one user may hold several
    pub session_id: Uuid,
    pub user_id: String,
    pub role: ParticipantRole,
    sender: mpsc::UnboundedSender<RealtimeEvent>,
    rooms: RwLock<HashSet<String>>,
}

impl Connection {
    pub fn new(
        user_id: impl Into<String>,
        role: ParticipantRole,
        sender: mpsc::UnboundedSender<RealtimeEvent>,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            user_id: user_id.into(),
            role,
            sender,
            rooms: RwLock::new(HashSet::new()),
        }
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    /// Queues an event for the socket writer. False once the socket is gone.
    pub fn send(&self, event: RealtimeEvent) -> bool {
        self.sender.send(event).is_ok()
    }

    pub(crate) fn track_room(&self, conversation_id: &str) -> bool {
        self.rooms
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(conversation_id.to_string())
    }

    pub(crate) fn untrack_room(&self, conversation_id: &str) -> bool {
        self.rooms
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(conversation_id)
    }

    pub fn joined_rooms(&self) -> Vec<String> {
        self.rooms
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}
