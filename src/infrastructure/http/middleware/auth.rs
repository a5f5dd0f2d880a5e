use crate::application::services::{AssignmentService, NotificationService};
use crate::domain::entities::{Participant, ParticipantRole, SenderRole};
use crate::infrastructure::http::middleware::error::ApiError;
use crate::infrastructure::persistence::Database;
use crate::infrastructure::realtime::RealtimeState;
use axum::{extract::Request, http::HeaderMap, middleware::Next, response::Response};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub assignment_service: AssignmentService,
    pub notification_service: NotificationService,
    pub realtime: RealtimeState,
}

/// Caller identity as asserted by the upstream gateway.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub participant: Participant,
}

impl AuthenticatedUser {
    pub fn id(&self) -> &str {
        &self.participant.id
    }

    pub fn role(&self) -> ParticipantRole {
        self.participant.role
    }

    pub fn require_staff(&self) -> Result<(), ApiError> {
        if self.participant.is_staff() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Staff access required".to_string()))
        }
    }

    pub fn require_customer(&self) -> Result<(), ApiError> {
        if self.participant.role == ParticipantRole::Customer {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Customer access required".to_string()))
        }
    }

    /// Message-author side this caller reads as.
    pub fn reader_role(&self) -> SenderRole {
        if self.participant.is_staff() {
            SenderRole::Staff
        } else {
            SenderRole::User
        }
    }

    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let user_id = headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(ApiError::Unauthorized)?;
        let role = headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?
            .parse::<ParticipantRole>()
            .map_err(|_| ApiError::Unauthorized)?;

        Ok(Self {
            participant: Participant::new(user_id, role),
        })
    }
}

/// Rejects requests without a trusted identity and exposes it as an extension.
pub async fn require_identity(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let user = AuthenticatedUser::from_headers(request.headers())?;
    tracing::debug!(user_id = %user.id(), role = %user.role(), "Request identity");
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
