//! Process-local presence: who holds a live connection right now.
//!
//! Rebuilt from nothing on restart; clients reconnect and re-register.

use super::connection::Connection;
use crate::domain::ports::PresenceRegistry;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

#[derive(Default)]
struct PresenceState {
    connections: HashMap<Uuid, Arc<Connection>>,
    by_user: HashMap<String, HashSet<Uuid>>,
}

/// A removed connection and whether it was its user's last one.
pub struct Departure {
    pub connection: Arc<Connection>,
    pub last_for_user: bool,
}

#[derive(Default)]
pub struct InMemoryPresenceRegistry {
    state: RwLock<PresenceState>,
}

impl InMemoryPresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection. True when it is the user's first.
    pub fn connect(&self, conn: Arc<Connection>) -> bool {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let sessions = state.by_user.entry(conn.user_id.clone()).or_default();
        let first = sessions.is_empty();
        sessions.insert(conn.session_id);
        state.connections.insert(conn.session_id, Arc::clone(&conn));

        metrics::gauge!("realtime_connections").set(state.connections.len() as f64);
        tracing::info!(
            session_id = %conn.session_id,
            user_id = %conn.user_id,
            role = %conn.role,
            first_connection = first,
            total_connections = state.connections.len(),
            "Realtime connection registered"
        );
        first
    }

    /// Unknown sessions return `None`, so a double disconnect is harmless.
    pub fn disconnect(&self, session_id: &Uuid) -> Option<Departure> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let connection = state.connections.remove(session_id)?;

        let last_for_user = match state.by_user.get_mut(&connection.user_id) {
            Some(sessions) => {
                sessions.remove(session_id);
                sessions.is_empty()
            }
            None => true,
        };
        if last_for_user {
            state.by_user.remove(&connection.user_id);
        }

        metrics::gauge!("realtime_connections").set(state.connections.len() as f64);
        tracing::info!(
            session_id = %session_id,
            user_id = %connection.user_id,
            last_for_user,
            remaining_connections = state.connections.len(),
            "Realtime connection removed"
        );
        Some(Departure {
            connection,
            last_for_user,
        })
    }

    pub fn connections_for(&self, user_id: &str) -> Vec<Arc<Connection>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .by_user
            .get(user_id)
            .map(|sessions| {
                sessions
                    .iter()
                    .filter_map(|id| state.connections.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn staff_connections(&self) -> Vec<Arc<Connection>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .connections
            .values()
            .filter(|c| c.is_staff())
            .cloned()
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .connections
            .len()
    }
}

impl PresenceRegistry for InMemoryPresenceRegistry {
    fn is_online(&self, user_id: &str) -> bool {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .by_user
            .get(user_id)
            .map(|sessions| !sessions.is_empty())
            .unwrap_or(false)
    }

    fn online_staff(&self) -> Vec<String> {
        let mut staff: Vec<String> = self
            .staff_connections()
            .into_iter()
            .map(|c| c.user_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        staff.sort();
        staff
    }
}
