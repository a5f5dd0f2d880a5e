//! Push delivery adapters.

use crate::domain::entities::PushPayload;
use crate::domain::ports::{PushFailure, PushProvider};
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Gateway error codes that mean the token will never work again.
const UNREGISTERED_MARKERS: [&str; 3] = ["UNREGISTERED", "NotRegistered", "InvalidRegistration"];

/// Sorts a rejected delivery into permanent or transient.
pub fn classify_rejection(status: StatusCode, body: &str) -> PushFailure {
    let excerpt: String = body.chars().take(500).collect();
    let detail = format!("HTTP {}: {}", status.as_u16(), excerpt);

    if status == StatusCode::NOT_FOUND
        || status == StatusCode::GONE
        || UNREGISTERED_MARKERS.iter().any(|m| body.contains(m))
    {
        PushFailure::InvalidTarget(detail)
    } else {
        PushFailure::Transient(detail)
    }
}

/// Posts notifications to an HTTP push gateway, one request per device token.
pub struct HttpPushProvider {
    endpoint: String,
    api_key: Option<String>,
    http_client: Client,
}

impl HttpPushProvider {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            api_key,
            http_client,
        })
    }
}

#[async_trait::async_trait]
impl PushProvider for HttpPushProvider {
    async fn deliver(&self, target: &str, payload: &PushPayload) -> Result<(), PushFailure> {
        let body = json!({
            "to": target,
            "notification": {
                "title": payload.title,
                "body": payload.body,
            },
            "data": payload.data,
        });

        let mut request = self.http_client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let message = if e.is_timeout() {
                    format!("Push gateway timeout: {}", e)
                } else if e.is_connect() {
                    format!("Push gateway connection failed: {}", e)
                } else {
                    format!("Network error: {}", e)
                };
                warn!("{}", message);
                return Err(PushFailure::Transient(message));
            }
        };

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if status.is_success() && !UNREGISTERED_MARKERS.iter().any(|m| text.contains(m)) {
            debug!(status = status.as_u16(), "Push delivered");
            return Ok(());
        }

        Err(classify_rejection(status, &text))
    }

    fn provider_name(&self) -> &'static str {
        "http"
    }
}

/// Used when no gateway is configured: records the notification and succeeds.
#[derive(Debug, Default)]
pub struct LoggingPushProvider;

#[async_trait::async_trait]
impl PushProvider for LoggingPushProvider {
    async fn deliver(&self, target: &str, payload: &PushPayload) -> Result<(), PushFailure> {
        info!(
            target_token = %target,
            title = %payload.title,
            "Push notification (no gateway configured)"
        );
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "log"
    }
}
