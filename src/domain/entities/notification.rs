use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A push target registered by a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceToken {
    pub owner_id: String,
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: HashMap<String, String>,
}

impl PushPayload {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            data: HashMap::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Payload for an incoming chat message, body trimmed to a preview.
    pub fn new_message(conversation_id: &str, sender_label: &str, content: &str) -> Self {
        const PREVIEW_CHARS: usize = 100;
        let preview: String = if content.chars().count() > PREVIEW_CHARS {
            let mut p: String = content.chars().take(PREVIEW_CHARS).collect();
            p.push_str("...");
            p
        } else if content.is_empty() {
            "Sent an attachment".to_string()
        } else {
            content.to_string()
        };
        Self::new(format!("New message from {}", sender_label), preview)
            .with_data("type", "chat_message")
            .with_data("conversation_id", conversation_id)
    }
}

/// Outcome of a multi-target push.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PushReport {
    pub success_count: usize,
    pub failure_count: usize,
    /// Targets the provider reported as permanently invalid.
    pub invalid_targets: Vec<String>,
    pub errors: Vec<String>,
}

impl PushReport {
    pub fn attempted(&self) -> usize {
        self.success_count + self.failure_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_message_payload_truncates_preview() {
        let long = "x".repeat(150);
        let payload = PushPayload::new_message("c1", "Support", &long);
        assert_eq!(payload.body.chars().count(), 103);
        assert!(payload.body.ends_with("..."));
        assert_eq!(payload.data.get("conversation_id").map(String::as_str), Some("c1"));
    }

    #[test]
    fn test_attachment_only_message_gets_placeholder_body() {
        let payload = PushPayload::new_message("c1", "Customer", "");
        assert_eq!(payload.body, "Sent an attachment");
    }
}
