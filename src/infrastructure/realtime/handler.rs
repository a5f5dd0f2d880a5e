//! Socket endpoint: session lifecycle and client event routing.

use super::connection::Connection;
use super::events::ClientEvent;
use crate::domain::entities::{now_timestamp, Participant, ParticipantRole, UnassignReason};
use crate::domain::events::RealtimeEvent;
use crate::domain::ports::{Broadcaster, PresenceRegistry};
use crate::infrastructure::http::middleware::{AppState, AuthenticatedUser};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{stream::StreamExt, SinkExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Upgrades an authenticated request to a realtime socket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Response {
    tracing::info!(user_id = %user.id(), role = %user.role(), "WebSocket upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state, user.participant))
}

async fn handle_socket(socket: WebSocket, state: AppState, participant: Participant) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<RealtimeEvent>();

    let conn = open_session(&state, participant, tx);
    let session_id = conn.session_id;

    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to serialize realtime event");
                }
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(session_id = %session_id, error = ?e, "WebSocket receive error");
                break;
            }
        };
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => handle_client_event(&state, &conn, event).await,
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = ?e, "Failed to parse client event");
                    conn.send(RealtimeEvent::Error {
                        message: "Invalid event format".to_string(),
                    });
                }
            },
            Message::Close(_) => {
                tracing::info!(session_id = %session_id, "WebSocket close frame received");
                break;
            }
            // Ping/pong frames are answered by axum
            _ => {}
        }
    }

    close_session(&state, &session_id).await;
    send_task.abort();
}

/// Registers a connection and announces it.
///
/// Staff receive the current online-staff list; a staff member's first
/// connection is announced to every other staff connection.
pub fn open_session(
    state: &AppState,
    participant: Participant,
    sender: mpsc::UnboundedSender<RealtimeEvent>,
) -> Arc<Connection> {
    let conn = Arc::new(Connection::new(participant.id, participant.role, sender));
    let first = state.realtime.presence.connect(Arc::clone(&conn));

    conn.send(RealtimeEvent::Connected {
        session_id: conn.session_id.to_string(),
        user_id: conn.user_id.clone(),
    });

    if conn.is_staff() {
        conn.send(RealtimeEvent::OnlineStaff {
            staff_ids: state.realtime.presence.online_staff(),
        });
        if first {
            state.realtime.broadcaster().to_all_staff(RealtimeEvent::StaffStatus {
                staff_id: conn.user_id.clone(),
                online: true,
                timestamp: now_timestamp(),
            });
        }
    }
    conn
}

/// Removes a connection. When a staff member's last connection goes, their
/// conversations return to the queue.
pub async fn close_session(state: &AppState, session_id: &Uuid) {
    let Some(departure) = state.realtime.presence.disconnect(session_id) else {
        return;
    };
    let conn = departure.connection;
    state.realtime.rooms.remove_connection(&conn);

    if !conn.is_staff() || !departure.last_for_user {
        return;
    }

    state.realtime.broadcaster().to_all_staff(RealtimeEvent::StaffStatus {
        staff_id: conn.user_id.clone(),
        online: false,
        timestamp: now_timestamp(),
    });

    if let Err(e) = state
        .assignment_service
        .handle_staff_offline(&conn.user_id, UnassignReason::StaffOffline)
        .await
    {
        tracing::error!(staff_id = %conn.user_id, error = %e, "Failed to release conversations on disconnect");
    }
}

pub async fn handle_client_event(state: &AppState, conn: &Arc<Connection>, event: ClientEvent) {
    match event {
        ClientEvent::JoinRoom { conversation_id } => {
            let conversation = match state
                .assignment_service
                .get_conversation(&conversation_id)
                .await
            {
                Ok(conversation) => conversation,
                Err(e) => {
                    conn.send(RealtimeEvent::Error {
                        message: e.to_string(),
                    });
                    return;
                }
            };
            if conn.role == ParticipantRole::Customer && conversation.customer_id != conn.user_id {
                conn.send(RealtimeEvent::Error {
                    message: "Not a participant of this conversation".to_string(),
                });
                return;
            }

            if state.realtime.rooms.join(&conversation_id, conn) {
                state.realtime.rooms.broadcast(
                    &conversation_id,
                    &RealtimeEvent::UserJoined {
                        conversation_id: conversation_id.clone(),
                        user_id: conn.user_id.clone(),
                        role: conn.role,
                    },
                );
            }
        }
        ClientEvent::LeaveRoom { conversation_id } => {
            if state.realtime.rooms.leave(&conversation_id, &conn.session_id) {
                state.realtime.rooms.broadcast(
                    &conversation_id,
                    &RealtimeEvent::UserLeft {
                        conversation_id: conversation_id.clone(),
                        user_id: conn.user_id.clone(),
                        role: conn.role,
                    },
                );
            }
        }
        ClientEvent::TypingStart { conversation_id } => {
            broadcast_typing(state, conn, conversation_id, true)
        }
        ClientEvent::TypingStop { conversation_id } => {
            broadcast_typing(state, conn, conversation_id, false)
        }
        ClientEvent::Ping => {
            conn.send(RealtimeEvent::Pong);
        }
    }
}

fn broadcast_typing(state: &AppState, conn: &Connection, conversation_id: String, is_typing: bool) {
    if !conn.joined_rooms().contains(&conversation_id) {
        conn.send(RealtimeEvent::Error {
            message: "Join the conversation before sending typing events".to_string(),
        });
        return;
    }
    let event = RealtimeEvent::Typing {
        conversation_id: conversation_id.clone(),
        user_id: conn.user_id.clone(),
        is_typing,
    };
    state.realtime.rooms.broadcast(&conversation_id, &event);
}
