use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Customer,
    Staff,
    Admin,
}

impl ParticipantRole {
    /// Admins act with staff privileges in chat.
    pub fn is_staff(&self) -> bool {
        matches!(self, ParticipantRole::Staff | ParticipantRole::Admin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantRole::Customer => "customer",
            ParticipantRole::Staff => "staff",
            ParticipantRole::Admin => "admin",
        }
    }
}

impl fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ParticipantRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "customer" | "user" => Ok(ParticipantRole::Customer),
            "staff" => Ok(ParticipantRole::Staff),
            "admin" => Ok(ParticipantRole::Admin),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

/// A caller identified at the edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: String,
    pub role: ParticipantRole,
}

impl Participant {
    pub fn new(id: impl Into<String>, role: ParticipantRole) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }
}
