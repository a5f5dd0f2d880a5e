//! Realtime events pushed to connected clients.
//!
//! Serialized as JSON objects tagged by `type`.

use crate::domain::entities::{Conversation, Message, ParticipantRole};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeEvent {
    /// A staff member came online or lost their last connection
    StaffStatus {
        staff_id: String,
        online: bool,
        timestamp: String,
    },

    /// A conversation entered the queue, or a queued customer wrote again
    NewWaitingChat {
        conversation: Conversation,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<Message>,
        timestamp: String,
    },

    ChatAssigned {
        conversation_id: String,
        staff_id: String,
        conversation: Conversation,
        timestamp: String,
    },

    ChatTransferred {
        conversation_id: String,
        from_staff_id: String,
        to_staff_id: String,
        conversation: Conversation,
        timestamp: String,
    },

    MessageNew {
        conversation_id: String,
        message: Message,
    },

    MessageSystem {
        conversation_id: String,
        message: Message,
    },

    /// Status or owner changed outside of assign/transfer/close
    ConversationUpdated {
        conversation: Conversation,
        timestamp: String,
    },

    ConversationClosed {
        conversation_id: String,
        timestamp: String,
    },

    UserJoined {
        conversation_id: String,
        user_id: String,
        role: ParticipantRole,
    },

    UserLeft {
        conversation_id: String,
        user_id: String,
        role: ParticipantRole,
    },

    Typing {
        conversation_id: String,
        user_id: String,
        is_typing: bool,
    },

    /// Roll-call sent to a staff connection when it opens
    OnlineStaff { staff_ids: Vec<String> },

    Connected { session_id: String, user_id: String },

    Pong,

    Error { message: String },
}

impl RealtimeEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            RealtimeEvent::StaffStatus { .. } => "staff_status",
            RealtimeEvent::NewWaitingChat { .. } => "new_waiting_chat",
            RealtimeEvent::ChatAssigned { .. } => "chat_assigned",
            RealtimeEvent::ChatTransferred { .. } => "chat_transferred",
            RealtimeEvent::MessageNew { .. } => "message_new",
            RealtimeEvent::MessageSystem { .. } => "message_system",
            RealtimeEvent::ConversationUpdated { .. } => "conversation_updated",
            RealtimeEvent::ConversationClosed { .. } => "conversation_closed",
            RealtimeEvent::UserJoined { .. } => "user_joined",
            RealtimeEvent::UserLeft { .. } => "user_left",
            RealtimeEvent::Typing { .. } => "typing",
            RealtimeEvent::OnlineStaff { .. } => "online_staff",
            RealtimeEvent::Connected { .. } => "connected",
            RealtimeEvent::Pong => "pong",
            RealtimeEvent::Error { .. } => "error",
        }
    }

    /// Wraps a stored message in the event matching its author.
    pub fn for_message(message: Message) -> Self {
        let conversation_id = message.conversation_id.clone();
        if message.is_system() {
            RealtimeEvent::MessageSystem {
                conversation_id,
                message,
            }
        } else {
            RealtimeEvent::MessageNew {
                conversation_id,
                message,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::SystemMessageType;

    #[test]
    fn test_pong_serialization() {
        let json = serde_json::to_string(&RealtimeEvent::Pong).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);
    }

    #[test]
    fn test_kind_matches_wire_tag() {
        let events = vec![
            RealtimeEvent::StaffStatus {
                staff_id: "s1".to_string(),
                online: true,
                timestamp: "t".to_string(),
            },
            RealtimeEvent::ConversationClosed {
                conversation_id: "c1".to_string(),
                timestamp: "t".to_string(),
            },
            RealtimeEvent::OnlineStaff {
                staff_ids: vec!["s1".to_string()],
            },
            RealtimeEvent::Error {
                message: "boom".to_string(),
            },
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.kind());
        }
    }

    #[test]
    fn test_for_message_picks_system_event() {
        let system = Message::system(
            "c1".to_string(),
            SystemMessageType::ConversationClosed,
            "Conversation closed".to_string(),
        );
        assert_eq!(RealtimeEvent::for_message(system).kind(), "message_system");

        let user = Message::from_customer("c1".to_string(), "u1".to_string(), "hi".to_string(), None);
        assert_eq!(RealtimeEvent::for_message(user).kind(), "message_new");
    }
}
