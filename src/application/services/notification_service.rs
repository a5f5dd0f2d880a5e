use crate::domain::entities::{DeviceToken, PushPayload, PushReport};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{DeviceTokenRepository, PresenceRegistry, PushFailure, PushProvider};
use futures::future::join_all;
use std::sync::Arc;

/// Bridges chat events to push delivery for recipients without a live
/// connection. Nothing here returns an error for a failed delivery.
#[derive(Clone)]
pub struct NotificationService {
    provider: Arc<dyn PushProvider>,
    device_tokens: Arc<dyn DeviceTokenRepository>,
    presence: Arc<dyn PresenceRegistry>,
}

impl NotificationService {
    pub fn new(
        provider: Arc<dyn PushProvider>,
        device_tokens: Arc<dyn DeviceTokenRepository>,
        presence: Arc<dyn PresenceRegistry>,
    ) -> Self {
        Self {
            provider,
            device_tokens,
            presence,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    /// Delivers `payload` to every target and reports per-target outcomes.
    pub async fn send(&self, targets: &[String], payload: &PushPayload) -> PushReport {
        let mut report = PushReport::default();
        if targets.is_empty() {
            return report;
        }

        let outcomes = join_all(
            targets
                .iter()
                .map(|target| async move { (target, self.provider.deliver(target, payload).await) }),
        )
        .await;

        for (target, outcome) in outcomes {
            match outcome {
                Ok(()) => {
                    report.success_count += 1;
                    metrics::counter!("push_deliveries_total", "outcome" => "success").increment(1);
                }
                Err(PushFailure::InvalidTarget(reason)) => {
                    report.failure_count += 1;
                    report.invalid_targets.push(target.clone());
                    report.errors.push(reason);
                    metrics::counter!("push_deliveries_total", "outcome" => "invalid").increment(1);
                }
                Err(PushFailure::Transient(reason)) => {
                    report.failure_count += 1;
                    report.errors.push(reason);
                    metrics::counter!("push_deliveries_total", "outcome" => "transient").increment(1);
                }
            }
        }

        tracing::debug!(
            provider = self.provider.provider_name(),
            success = report.success_count,
            failure = report.failure_count,
            "Push batch delivered"
        );
        report
    }

    /// Best-effort removal of dead targets; failures are only logged.
    pub async fn prune_invalid(&self, owner_id: &str, invalid_targets: &[String]) {
        if invalid_targets.is_empty() {
            return;
        }
        match self
            .device_tokens
            .remove_tokens(owner_id, invalid_targets)
            .await
        {
            Ok(removed) => tracing::info!(
                owner_id = %owner_id,
                removed,
                "Pruned invalid push targets"
            ),
            Err(e) => tracing::warn!(
                owner_id = %owner_id,
                error = %e,
                "Failed to prune invalid push targets"
            ),
        }
    }

    /// Pushes to all of a user's registered devices and prunes the dead ones.
    pub async fn notify_user(&self, owner_id: &str, payload: &PushPayload) -> PushReport {
        let tokens = match self.device_tokens.list_for_owner(owner_id).await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(owner_id = %owner_id, error = %e, "Failed to load push targets");
                return PushReport {
                    errors: vec![e.to_string()],
                    ..PushReport::default()
                };
            }
        };
        if tokens.is_empty() {
            tracing::debug!(owner_id = %owner_id, "No push targets registered");
            return PushReport::default();
        }

        let targets: Vec<String> = tokens.into_iter().map(|t| t.token).collect();
        let report = self.send(&targets, payload).await;
        self.prune_invalid(owner_id, &report.invalid_targets).await;
        report
    }

    /// Skips the push when the recipient has a live connection.
    ///
    /// The presence check races with disconnects; a recipient that drops
    /// right after it may miss both channels.
    pub async fn notify_if_offline(
        &self,
        recipient_id: &str,
        payload: &PushPayload,
    ) -> Option<PushReport> {
        if self.presence.is_online(recipient_id) {
            return None;
        }
        Some(self.notify_user(recipient_id, payload).await)
    }

    pub async fn register_device(
        &self,
        owner_id: &str,
        token: &str,
        platform: Option<&str>,
    ) -> DomainResult<DeviceToken> {
        if token.trim().is_empty() {
            return Err(DomainError::ValidationError("token is required".to_string()));
        }
        self.device_tokens.register(owner_id, token.trim(), platform).await
    }

    pub async fn unregister_device(&self, owner_id: &str, token: &str) -> DomainResult<()> {
        let removed = self
            .device_tokens
            .remove_tokens(owner_id, &[token.to_string()])
            .await?;
        if removed == 0 {
            return Err(DomainError::NotFound(format!("Device token {} not found", token)));
        }
        Ok(())
    }
}
