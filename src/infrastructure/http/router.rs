use crate::infrastructure::http::controllers::{chat, devices, staff};
use crate::infrastructure::http::middleware::{require_identity, AppState};
use crate::infrastructure::realtime::handler::ws_handler;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

// Content is capped at 10k characters; leave room for the JSON envelope
const MAX_BODY_BYTES: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    // Build protected routes (require a caller identity)
    let protected = Router::new()
        // Chat
        .route("/api/chat/messages", post(chat::send_user_message))
        .route(
            "/api/chat/conversations/waiting",
            get(chat::list_waiting),
        )
        .route(
            "/api/chat/conversations/mine",
            get(chat::list_my_conversations),
        )
        .route(
            "/api/chat/conversations/:id",
            get(chat::get_conversation_history),
        )
        .route(
            "/api/chat/conversations/:id/take",
            post(chat::take_chat),
        )
        .route(
            "/api/chat/conversations/:id/messages",
            post(chat::send_staff_message),
        )
        .route(
            "/api/chat/conversations/:id/transfer",
            post(chat::transfer_chat),
        )
        .route(
            "/api/chat/conversations/:id/close",
            post(chat::close_conversation),
        )
        .route(
            "/api/chat/conversations/:id/read",
            post(chat::mark_read),
        )
        // Staff presence
        .route("/api/staff/logout", post(staff::logout))
        .route("/api/staff/online", get(staff::online_staff))
        // Push targets
        .route("/api/devices", post(devices::register_device))
        .route("/api/devices/:token", delete(devices::unregister_device))
        // Realtime socket
        .route("/ws", get(ws_handler))
        .layer(axum::middleware::from_fn(require_identity));

    // Build public routes
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .merge(protected)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root_handler() -> &'static str {
    "Evdesk Live Support"
}

async fn health_handler() -> &'static str {
    "OK"
}
