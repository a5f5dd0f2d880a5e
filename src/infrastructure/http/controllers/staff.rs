use axum::{extract::State, Json};
use serde::Serialize;

use crate::{
    domain::{entities::UnassignReason, ports::PresenceRegistry},
    infrastructure::http::middleware::{ApiResult, AppState, AuthenticatedUser},
};

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub released_conversation_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct OnlineStaffResponse {
    pub staff_ids: Vec<String>,
}

// POST /api/staff/logout - Release every conversation the caller holds
pub async fn logout(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> ApiResult<Json<LogoutResponse>> {
    user.require_staff()?;

    let released = state
        .assignment_service
        .handle_staff_offline(user.id(), UnassignReason::StaffLogout)
        .await?;

    Ok(Json(LogoutResponse {
        released_conversation_ids: released,
    }))
}

// GET /api/staff/online - Staff with a live connection
pub async fn online_staff(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> ApiResult<Json<OnlineStaffResponse>> {
    user.require_staff()?;

    Ok(Json(OnlineStaffResponse {
        staff_ids: state.realtime.presence.online_staff(),
    }))
}
