//! Socket layer: live connections, presence, rooms and event fan-out.

pub mod broadcaster;
pub mod connection;
pub mod events;
pub mod handler;
pub mod presence;
pub mod room;

pub use broadcaster::WebSocketBroadcaster;
pub use connection::Connection;
pub use events::ClientEvent;
pub use presence::{Departure, InMemoryPresenceRegistry};
pub use room::RoomManager;

use std::sync::Arc;

/// Process-wide realtime state shared by the socket handler and the broadcaster.
#[derive(Clone, Default)]
pub struct RealtimeState {
    pub presence: Arc<InMemoryPresenceRegistry>,
    pub rooms: Arc<RoomManager>,
}

impl RealtimeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn broadcaster(&self) -> WebSocketBroadcaster {
        WebSocketBroadcaster::new(Arc::clone(&self.presence), Arc::clone(&self.rooms))
    }
}
