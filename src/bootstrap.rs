use crate::application::services::{AssignmentService, AssignmentSettings, NotificationService};
use crate::config::Config;
use crate::domain::ports::{
    Broadcaster, ConversationRepository, DeviceTokenRepository, MessageRepository,
    PresenceRegistry, PushProvider, TaskSpawner,
};
use crate::infrastructure::http::middleware::AppState;
use crate::infrastructure::persistence::Database;
use crate::infrastructure::providers::{HttpPushProvider, LoggingPushProvider};
use crate::infrastructure::realtime::RealtimeState;
use crate::infrastructure::runtime::TokioTaskSpawner;
use std::sync::Arc;

pub async fn build_app_state(
    db: Database,
    config: &Config,
) -> Result<AppState, Box<dyn std::error::Error>> {
    // Push gateway, or log-only delivery when none is configured
    let push_provider: Arc<dyn PushProvider> = match &config.push_endpoint {
        Some(endpoint) => {
            tracing::info!(endpoint = %endpoint, "Push gateway configured");
            Arc::new(HttpPushProvider::new(
                endpoint.clone(),
                config.push_api_key.clone(),
                config.push_timeout(),
            )?)
        }
        None => {
            tracing::warn!("PUSH_ENDPOINT not set, push notifications will only be logged");
            Arc::new(LoggingPushProvider)
        }
    };

    let task_spawner = Arc::new(TokioTaskSpawner::new()) as Arc<dyn TaskSpawner>;

    Ok(assemble_app_state(
        db,
        RealtimeState::new(),
        push_provider,
        task_spawner,
        config.assignment_settings(),
    ))
}

/// Wires services over a database and a realtime layer.
pub fn assemble_app_state(
    db: Database,
    realtime: RealtimeState,
    push_provider: Arc<dyn PushProvider>,
    task_spawner: Arc<dyn TaskSpawner>,
    settings: AssignmentSettings,
) -> AppState {
    let presence = Arc::clone(&realtime.presence) as Arc<dyn PresenceRegistry>;
    let broadcaster = Arc::new(realtime.broadcaster()) as Arc<dyn Broadcaster>;

    let notification_service = NotificationService::new(
        push_provider,
        Arc::new(db.clone()) as Arc<dyn DeviceTokenRepository>,
        Arc::clone(&presence),
    );
    tracing::info!(
        provider = notification_service.provider_name(),
        "Notification service initialized"
    );

    let assignment_service = AssignmentService::new(
        Arc::new(db.clone()) as Arc<dyn ConversationRepository>,
        Arc::new(db.clone()) as Arc<dyn MessageRepository>,
        presence,
        broadcaster,
        notification_service.clone(),
        task_spawner,
        settings,
    );
    tracing::info!(
        max_retries = settings.max_retries,
        "Assignment service initialized"
    );

    AppState {
        db,
        assignment_service,
        notification_service,
        realtime,
    }
}
