//! Events sent by clients over the socket.

use serde::Deserialize;

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinRoom { conversation_id: String },
    LeaveRoom { conversation_id: String },
    TypingStart { conversation_id: String },
    TypingStop { conversation_id: String },
    /// Heartbeat
    Ping,
}
