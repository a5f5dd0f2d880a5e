//! Per-conversation rooms for pub/sub.

use super::connection::Connection;
use crate::domain::events::RealtimeEvent;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

#[derive(Default)]
pub struct RoomManager {
    /// conversation_id -> joined connections
    rooms: RwLock<HashMap<String, Vec<Arc<Connection>>>>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the connection was already in the room.
    pub fn join(&self, conversation_id: &str, conn: &Arc<Connection>) -> bool {
        let mut rooms = self.rooms.write().unwrap_or_else(|e| e.into_inner());
        let members = rooms.entry(conversation_id.to_string()).or_default();
        if members.iter().any(|c| c.session_id == conn.session_id) {
            return false;
        }
        members.push(Arc::clone(conn));
        conn.track_room(conversation_id);

        tracing::debug!(
            conversation_id = %conversation_id,
            session_id = %conn.session_id,
            room_size = members.len(),
            "Connection joined room"
        );
        true
    }

    pub fn leave(&self, conversation_id: &str, session_id: &Uuid) -> bool {
        let mut rooms = self.rooms.write().unwrap_or_else(|e| e.into_inner());
        let Some(members) = rooms.get_mut(conversation_id) else {
            return false;
        };
        let mut left = None;
        members.retain(|c| {
            if c.session_id == *session_id {
                left = Some(Arc::clone(c));
                false
            } else {
                true
            }
        });
        if members.is_empty() {
            rooms.remove(conversation_id);
        }
        match left {
            Some(conn) => {
                conn.untrack_room(conversation_id);
                true
            }
            None => false,
        }
    }

    pub fn members(&self, conversation_id: &str) -> Vec<Arc<Connection>> {
        self.rooms
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Sends to every member; returns how many accepted the event.
    pub fn broadcast(&self, conversation_id: &str, event: &RealtimeEvent) -> usize {
        let members = self.members(conversation_id);
        let delivered = members.iter().filter(|c| c.send(event.clone())).count();
        tracing::debug!(
            conversation_id = %conversation_id,
            event = event.kind(),
            recipients = delivered,
            failed = members.len() - delivered,
            "Broadcast to room"
        );
        delivered
    }

    /// Drops a closed connection from every room it joined.
    pub fn remove_connection(&self, conn: &Connection) {
        let joined = conn.joined_rooms();
        if joined.is_empty() {
            return;
        }
        let mut rooms = self.rooms.write().unwrap_or_else(|e| e.into_inner());
        for conversation_id in &joined {
            if let Some(members) = rooms.get_mut(conversation_id) {
                members.retain(|c| c.session_id != conn.session_id);
                if members.is_empty() {
                    rooms.remove(conversation_id);
                }
            }
            conn.untrack_room(conversation_id);
        }
        tracing::debug!(
            session_id = %conn.session_id,
            room_count = joined.len(),
            "Removed connection from rooms"
        );
    }

    pub fn room_size(&self, conversation_id: &str) -> usize {
        self.rooms
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(conversation_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}
