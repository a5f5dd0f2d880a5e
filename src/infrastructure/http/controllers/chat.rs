use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    application::services::{ConversationHistory, SendUserMessageResult, WaitingPage},
    domain::entities::{Conversation, ConversationStatus, Message, ParticipantRole},
    infrastructure::http::middleware::{ApiError, ApiResult, AppState, AuthenticatedUser},
};

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub content: String,
    pub attachment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub new_staff_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub marked: u64,
}

/// Customers may only touch their own conversation; staff may touch any.
async fn authorize_participant(
    state: &AppState,
    user: &AuthenticatedUser,
    conversation_id: &str,
) -> ApiResult<Conversation> {
    let conversation = state
        .assignment_service
        .get_conversation(conversation_id)
        .await?;
    if user.role() == ParticipantRole::Customer && conversation.customer_id != user.id() {
        return Err(ApiError::Forbidden(
            "Not a participant of this conversation".to_string(),
        ));
    }
    Ok(conversation)
}

// POST /api/chat/messages - Customer sends a message
pub async fn send_user_message(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<SendUserMessageResult>)> {
    user.require_customer()?;

    let result = state
        .assignment_service
        .send_user_message(user.id(), &req.content, req.attachment)
        .await?;

    Ok((StatusCode::CREATED, Json(result)))
}

// POST /api/chat/conversations/:id/take - Claim a conversation
pub async fn take_chat(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(conversation_id): Path<String>,
) -> ApiResult<Json<Conversation>> {
    user.require_staff()?;

    let conversation = state
        .assignment_service
        .take_chat(&conversation_id, user.id())
        .await?;

    Ok(Json(conversation))
}

// POST /api/chat/conversations/:id/messages - Assigned staff replies
pub async fn send_staff_message(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(conversation_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    user.require_staff()?;

    let message = state
        .assignment_service
        .send_staff_message(&conversation_id, user.id(), &req.content, req.attachment)
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

// POST /api/chat/conversations/:id/transfer - Hand over to another staff member
pub async fn transfer_chat(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(conversation_id): Path<String>,
    Json(req): Json<TransferRequest>,
) -> ApiResult<Json<Conversation>> {
    user.require_staff()?;

    let conversation = state
        .assignment_service
        .transfer_chat(&conversation_id, user.id(), &req.new_staff_id)
        .await?;

    Ok(Json(conversation))
}

// POST /api/chat/conversations/:id/close - Close a conversation
pub async fn close_conversation(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(conversation_id): Path<String>,
) -> ApiResult<Json<Conversation>> {
    authorize_participant(&state, &user, &conversation_id).await?;

    let conversation = state
        .assignment_service
        .close_conversation(&conversation_id)
        .await?;

    Ok(Json(conversation))
}

// POST /api/chat/conversations/:id/read - Mark the other side's messages read
pub async fn mark_read(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(conversation_id): Path<String>,
) -> ApiResult<Json<MarkReadResponse>> {
    authorize_participant(&state, &user, &conversation_id).await?;

    let marked = state
        .assignment_service
        .mark_read(&conversation_id, user.reader_role())
        .await?;

    Ok(Json(MarkReadResponse { marked }))
}

// GET /api/chat/conversations/waiting - Queue of unassigned conversations
pub async fn list_waiting(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<WaitingPage>> {
    user.require_staff()?;

    let page = state
        .assignment_service
        .list_waiting(query.page, query.limit)
        .await?;

    Ok(Json(page))
}

// GET /api/chat/conversations/mine - Caller's conversations
pub async fn list_my_conversations(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<Vec<Conversation>>> {
    user.require_staff()?;

    let status = query
        .status
        .as_deref()
        .map(str::parse::<ConversationStatus>)
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let conversations = state
        .assignment_service
        .list_staff_conversations(user.id(), status)
        .await?;

    Ok(Json(conversations))
}

// GET /api/chat/conversations/:id - Conversation with a page of history
pub async fn get_conversation_history(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(conversation_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<ConversationHistory>> {
    authorize_participant(&state, &user, &conversation_id).await?;

    let history = state
        .assignment_service
        .get_conversation_history(&conversation_id, query.page, query.limit)
        .await?;

    Ok(Json(history))
}
