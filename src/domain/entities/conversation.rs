use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::now_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Waiting,
    Active,
    Closed,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Waiting => "waiting",
            ConversationStatus::Active => "active",
            ConversationStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// Convert from string (for SQLx)
impl From<String> for ConversationStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "active" => ConversationStatus::Active,
            "closed" => ConversationStatus::Closed,
            _ => ConversationStatus::Waiting,
        }
    }
}

impl std::str::FromStr for ConversationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "waiting" => Ok(ConversationStatus::Waiting),
            "active" => Ok(ConversationStatus::Active),
            "closed" => Ok(ConversationStatus::Closed),
            other => Err(format!("Unknown conversation status: {}", other)),
        }
    }
}

impl sqlx::Type<sqlx::Any> for ConversationStatus {
    fn type_info() -> sqlx::any::AnyTypeInfo {
        <String as sqlx::Type<sqlx::Any>>::type_info()
    }

    fn compatible(ty: &sqlx::any::AnyTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Any>>::compatible(ty)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Any> for ConversationStatus {
    fn decode(value: sqlx::any::AnyValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Any>>::decode(value)?;
        Ok(ConversationStatus::from(s))
    }
}

/// Why a staff member stopped holding a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnassignReason {
    ManualTransfer,
    StaffOffline,
    StaffLogout,
}

impl UnassignReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnassignReason::ManualTransfer => "manual_transfer",
            UnassignReason::StaffOffline => "staff_offline",
            UnassignReason::StaffLogout => "staff_logout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual_transfer" => Some(UnassignReason::ManualTransfer),
            "staff_offline" | "offline" => Some(UnassignReason::StaffOffline),
            "staff_logout" | "logout" => Some(UnassignReason::StaffLogout),
            _ => None,
        }
    }
}

impl fmt::Display for UnassignReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry of a conversation's assignment log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub staff_id: String,
    pub assigned_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unassigned_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unassign_reason: Option<UnassignReason>,
}

impl AssignmentRecord {
    pub fn open(staff_id: String, assigned_at: String) -> Self {
        Self {
            staff_id,
            assigned_at,
            unassigned_at: None,
            unassign_reason: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.unassigned_at.is_none()
    }
}

/// Append-only assignment log with a cached index of the open entry.
///
/// Entries are never removed; closing one only sets its end fields. The
/// open index is recomputed whenever the log is rebuilt from storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<AssignmentRecord>", into = "Vec<AssignmentRecord>")]
pub struct AssignmentHistory {
    entries: Vec<AssignmentRecord>,
    open: Option<usize>,
}

impl AssignmentHistory {
    pub fn entries(&self) -> &[AssignmentRecord] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn open_index(&self) -> Option<usize> {
        self.open
    }

    pub fn open_entry(&self) -> Option<&AssignmentRecord> {
        self.open.map(|i| &self.entries[i])
    }

    pub fn last(&self) -> Option<&AssignmentRecord> {
        self.entries.last()
    }

    /// Number of entries without an end timestamp. Healthy logs have 0 or 1.
    pub fn open_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_open()).count()
    }

    /// Appends a new open entry and returns its position.
    ///
    /// Callers must close the current open entry first.
    pub fn push_open(&mut self, staff_id: String, assigned_at: String) -> usize {
        debug_assert!(self.open.is_none(), "assignment log already has an open entry");
        self.entries
            .push(AssignmentRecord::open(staff_id, assigned_at));
        let position = self.entries.len() - 1;
        self.open = Some(position);
        position
    }

    /// Closes the open entry, if any, and returns its position.
    pub fn close_open(
        &mut self,
        unassigned_at: String,
        reason: Option<UnassignReason>,
    ) -> Option<usize> {
        let position = self.open.take()?;
        let entry = &mut self.entries[position];
        entry.unassigned_at = Some(unassigned_at);
        entry.unassign_reason = reason;
        Some(position)
    }
}

impl From<Vec<AssignmentRecord>> for AssignmentHistory {
    fn from(entries: Vec<AssignmentRecord>) -> Self {
        let open = entries.iter().rposition(|e| e.is_open());
        Self { entries, open }
    }
}

impl From<AssignmentHistory> for Vec<AssignmentRecord> {
    fn from(history: AssignmentHistory) -> Self {
        history.entries
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub customer_id: String,
    pub status: ConversationStatus,
    pub assigned_staff_id: Option<String>,
    pub last_assigned_staff_id: Option<String>,
    pub assignment_history: AssignmentHistory,
    pub created_at: String,
    pub updated_at: String,
    /// Optimistic concurrency token, bumped by every committed transition.
    pub version: i64,
}

impl Conversation {
    pub fn new(customer_id: String) -> Self {
        let now = now_timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            customer_id,
            status: ConversationStatus::Waiting,
            assigned_staff_id: None,
            last_assigned_staff_id: None,
            assignment_history: AssignmentHistory::default(),
            created_at: now.clone(),
            updated_at: now,
            version: 0,
        }
    }

    pub fn is_assigned_to(&self, staff_id: &str) -> bool {
        self.status == ConversationStatus::Active
            && self.assigned_staff_id.as_deref() == Some(staff_id)
    }

    /// Checks the single-owner invariant: ACTIVE iff an owner is set iff the
    /// newest log entry is open and names that owner.
    pub fn check_ownership_invariant(&self) -> Result<(), String> {
        let active = self.status == ConversationStatus::Active;
        if active != self.assigned_staff_id.is_some() {
            return Err(format!(
                "status {} does not agree with assigned staff {:?}",
                self.status, self.assigned_staff_id
            ));
        }
        if self.assignment_history.open_count() > 1 {
            return Err("more than one open assignment entry".to_string());
        }
        let last_open = self
            .assignment_history
            .last()
            .filter(|e| e.is_open())
            .map(|e| e.staff_id.as_str());
        if last_open != self.assigned_staff_id.as_deref() {
            return Err(format!(
                "open assignment entry {:?} does not match assigned staff {:?}",
                last_open, self.assigned_staff_id
            ));
        }
        Ok(())
    }
}
