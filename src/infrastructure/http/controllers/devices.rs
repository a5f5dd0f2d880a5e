use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::{
    domain::entities::DeviceToken,
    infrastructure::http::middleware::{ApiResult, AppState, AuthenticatedUser},
};

#[derive(Debug, Deserialize)]
pub struct RegisterDeviceRequest {
    pub token: String,
    pub platform: Option<String>,
}

// POST /api/devices - Register a push target for the caller
pub async fn register_device(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Json(req): Json<RegisterDeviceRequest>,
) -> ApiResult<(StatusCode, Json<DeviceToken>)> {
    let device = state
        .notification_service
        .register_device(user.id(), &req.token, req.platform.as_deref())
        .await?;

    Ok((StatusCode::CREATED, Json(device)))
}

// DELETE /api/devices/:token - Remove one of the caller's push targets
pub async fn unregister_device(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(token): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .notification_service
        .unregister_device(user.id(), &token)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
