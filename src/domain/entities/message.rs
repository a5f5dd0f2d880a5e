use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::now_timestamp;

pub const MAX_CONTENT_LENGTH: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    User,
    Staff,
    System,
}

impl SenderRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderRole::User => "user",
            SenderRole::Staff => "staff",
            SenderRole::System => "system",
        }
    }
}

impl fmt::Display for SenderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<String> for SenderRole {
    fn from(s: String) -> Self {
        match s.as_str() {
            "staff" => SenderRole::Staff,
            "system" => SenderRole::System,
            _ => SenderRole::User,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemMessageType {
    StaffAssigned,
    StaffTransferred,
    StaffOffline,
    ConversationClosed,
}

impl SystemMessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemMessageType::StaffAssigned => "staff_assigned",
            SystemMessageType::StaffTransferred => "staff_transferred",
            SystemMessageType::StaffOffline => "staff_offline",
            SystemMessageType::ConversationClosed => "conversation_closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "staff_assigned" => Some(SystemMessageType::StaffAssigned),
            "staff_transferred" => Some(SystemMessageType::StaffTransferred),
            "staff_offline" => Some(SystemMessageType::StaffOffline),
            "conversation_closed" => Some(SystemMessageType::ConversationClosed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    /// Position within the conversation, assigned by the store on insert.
    pub seq: i64,
    /// Absent for system messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    pub sender_role: SenderRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
    pub is_read: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_message_type: Option<SystemMessageType>,
    pub created_at: String,
}

impl Message {
    fn build(
        conversation_id: String,
        sender_id: Option<String>,
        sender_role: SenderRole,
        content: String,
        attachment: Option<String>,
        system_message_type: Option<SystemMessageType>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id,
            seq: 0,
            sender_id,
            sender_role,
            content,
            attachment,
            is_read: false,
            system_message_type,
            created_at: now_timestamp(),
        }
    }

    pub fn from_customer(
        conversation_id: String,
        customer_id: String,
        content: String,
        attachment: Option<String>,
    ) -> Self {
        Self::build(
            conversation_id,
            Some(customer_id),
            SenderRole::User,
            content,
            attachment,
            None,
        )
    }

    pub fn from_staff(
        conversation_id: String,
        staff_id: String,
        content: String,
        attachment: Option<String>,
    ) -> Self {
        Self::build(
            conversation_id,
            Some(staff_id),
            SenderRole::Staff,
            content,
            attachment,
            None,
        )
    }

    pub fn system(conversation_id: String, kind: SystemMessageType, content: String) -> Self {
        Self::build(
            conversation_id,
            None,
            SenderRole::System,
            content,
            None,
            Some(kind),
        )
    }

    pub fn is_system(&self) -> bool {
        self.sender_role == SenderRole::System
    }
}

/// A message needs either text or an attachment. Text is capped at
/// [`MAX_CONTENT_LENGTH`] characters.
pub fn validate_content(content: &str, attachment: Option<&str>) -> Result<(), String> {
    let has_attachment = attachment.map(|a| !a.trim().is_empty()).unwrap_or(false);
    if content.trim().is_empty() && !has_attachment {
        return Err("Message must have content or an attachment".to_string());
    }
    if content.chars().count() > MAX_CONTENT_LENGTH {
        return Err(format!(
            "Message content cannot exceed {} characters",
            MAX_CONTENT_LENGTH
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_content_requires_text_or_attachment() {
        assert!(validate_content("", None).is_err());
        assert!(validate_content("   ", Some("  ")).is_err());
        assert!(validate_content("", Some("https://cdn/img.png")).is_ok());
        assert!(validate_content("hello", None).is_ok());
    }

    #[test]
    fn test_validate_content_max_length() {
        let at_limit = "a".repeat(MAX_CONTENT_LENGTH);
        assert!(validate_content(&at_limit, None).is_ok());

        let over = "a".repeat(MAX_CONTENT_LENGTH + 1);
        assert!(validate_content(&over, None).is_err());
    }

    #[test]
    fn test_system_message_carries_type() {
        let msg = Message::system(
            "c1".to_string(),
            SystemMessageType::StaffAssigned,
            "Staff joined".to_string(),
        );
        assert!(msg.is_system());
        assert!(msg.sender_id.is_none());
        assert_eq!(msg.system_message_type, Some(SystemMessageType::StaffAssigned));
        assert!(!msg.is_read);
    }

    #[test]
    fn test_message_serializes_roles_lowercase() {
        let msg = Message::from_customer("c1".to_string(), "u1".to_string(), "hi".to_string(), None);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["sender_role"], "user");
        assert!(json.get("system_message_type").is_none());
    }
}
