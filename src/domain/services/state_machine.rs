//! Pure conversation lifecycle transitions.
//!
//! Every function here takes the current in-memory state and returns the
//! full set of changes a single transition produces. Nothing is written; the
//! caller commits a [`Transition`] atomically against the version it was
//! computed from.

use crate::domain::entities::{
    AssignmentRecord, Conversation, ConversationStatus, Message, SystemMessageType,
    UnassignReason,
};
use crate::domain::errors::DomainError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Conversation is already assigned to {staff_id}")]
    AlreadyAssigned { staff_id: String },
    #[error("Staff {staff_id} does not own this conversation")]
    NotOwner { staff_id: String },
    #[error("Cannot {action} a conversation in status {from}")]
    InvalidTransition {
        from: ConversationStatus,
        action: &'static str,
    },
    #[error("{0}")]
    Invalid(String),
}

impl From<TransitionError> for DomainError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::AlreadyAssigned { .. } => DomainError::Conflict(err.to_string()),
            TransitionError::NotOwner { .. } => DomainError::Forbidden(err.to_string()),
            TransitionError::InvalidTransition { .. } => DomainError::Conflict(err.to_string()),
            TransitionError::Invalid(msg) => DomainError::ValidationError(msg),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    ReopenedToActive,
    ReopenedToWaiting,
    Taken,
    Transferred,
    Released,
    Closed,
}

impl TransitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionKind::ReopenedToActive => "reopened_active",
            TransitionKind::ReopenedToWaiting => "reopened_waiting",
            TransitionKind::Taken => "taken",
            TransitionKind::Transferred => "transferred",
            TransitionKind::Released => "released",
            TransitionKind::Closed => "closed",
        }
    }
}

/// A single mutation of the assignment log, addressed by entry position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryChange {
    Closed {
        position: usize,
        unassigned_at: String,
        reason: Option<UnassignReason>,
    },
    Opened {
        position: usize,
        record: AssignmentRecord,
    },
}

#[derive(Debug, Clone)]
pub struct Transition {
    /// State after the transition. `version` still holds the version the
    /// transition was computed from until the store commits it.
    pub conversation: Conversation,
    pub previous_status: ConversationStatus,
    pub previous_staff_id: Option<String>,
    /// Closes come before opens.
    pub history_changes: Vec<HistoryChange>,
    pub system_message: Option<Message>,
    pub kind: TransitionKind,
}

impl Transition {
    pub fn expected_version(&self) -> i64 {
        self.conversation.version
    }

    fn begin(conversation: &Conversation, kind: TransitionKind) -> Self {
        Self {
            conversation: conversation.clone(),
            previous_status: conversation.status,
            previous_staff_id: conversation.assigned_staff_id.clone(),
            history_changes: Vec::new(),
            system_message: None,
            kind,
        }
    }

    fn close_open_entry(&mut self, now: &str, reason: Option<UnassignReason>) {
        if let Some(position) = self
            .conversation
            .assignment_history
            .close_open(now.to_string(), reason)
        {
            self.history_changes.push(HistoryChange::Closed {
                position,
                unassigned_at: now.to_string(),
                reason,
            });
        }
    }

    fn open_entry(&mut self, staff_id: &str, now: &str) {
        let position = self
            .conversation
            .assignment_history
            .push_open(staff_id.to_string(), now.to_string());
        let record = self.conversation.assignment_history.entries()[position].clone();
        self.history_changes
            .push(HistoryChange::Opened { position, record });
        self.conversation.assigned_staff_id = Some(staff_id.to_string());
        self.conversation.last_assigned_staff_id = Some(staff_id.to_string());
        self.conversation.status = ConversationStatus::Active;
    }

    fn note(&mut self, kind: SystemMessageType, content: String) {
        self.system_message = Some(Message::system(
            self.conversation.id.clone(),
            kind,
            content,
        ));
    }

    fn finish(mut self, now: &str) -> Self {
        self.conversation.updated_at = now.to_string();
        debug_assert!(self.conversation.check_ownership_invariant().is_ok());
        self
    }
}

fn require_staff_id(staff_id: &str, field: &str) -> Result<(), TransitionError> {
    if staff_id.trim().is_empty() {
        return Err(TransitionError::Invalid(format!("{} is required", field)));
    }
    Ok(())
}

/// Reopens a closed conversation after a new customer message.
///
/// With `reclaim_staff` set (the last owner is online) the conversation goes
/// straight to ACTIVE with a fresh log entry; otherwise it re-enters the
/// queue without a system message.
pub fn reopen(
    conversation: &Conversation,
    reclaim_staff: Option<&str>,
    now: &str,
) -> Result<Transition, TransitionError> {
    if conversation.status != ConversationStatus::Closed {
        return Err(TransitionError::InvalidTransition {
            from: conversation.status,
            action: "reopen",
        });
    }

    match reclaim_staff {
        Some(staff_id) => {
            require_staff_id(staff_id, "staff_id")?;
            let mut t = Transition::begin(conversation, TransitionKind::ReopenedToActive);
            // Prior entries are closed on close; this only guards legacy rows.
            t.close_open_entry(now, None);
            t.open_entry(staff_id, now);
            t.note(
                SystemMessageType::StaffAssigned,
                format!("Conversation reopened and assigned to {}", staff_id),
            );
            Ok(t.finish(now))
        }
        None => {
            // The only transition without a system note. The customer message
            // that caused it is the first entry the queue sees.
            let mut t = Transition::begin(conversation, TransitionKind::ReopenedToWaiting);
            t.close_open_entry(now, None);
            t.conversation.status = ConversationStatus::Waiting;
            t.conversation.assigned_staff_id = None;
            Ok(t.finish(now))
        }
    }
}

/// First writer wins: any ACTIVE conversation is a conflict, even for its owner.
pub fn take(
    conversation: &Conversation,
    staff_id: &str,
    now: &str,
) -> Result<Transition, TransitionError> {
    require_staff_id(staff_id, "staff_id")?;
    if conversation.status == ConversationStatus::Active {
        return Err(TransitionError::AlreadyAssigned {
            staff_id: conversation.assigned_staff_id.clone().unwrap_or_default(),
        });
    }

    let mut t = Transition::begin(conversation, TransitionKind::Taken);
    t.close_open_entry(now, None);
    t.open_entry(staff_id, now);
    t.note(
        SystemMessageType::StaffAssigned,
        format!("{} joined the conversation", staff_id),
    );
    Ok(t.finish(now))
}

pub fn transfer(
    conversation: &Conversation,
    current_staff_id: &str,
    new_staff_id: &str,
    now: &str,
) -> Result<Transition, TransitionError> {
    require_staff_id(new_staff_id, "new_staff_id")?;
    if !conversation.is_assigned_to(current_staff_id) {
        return Err(TransitionError::NotOwner {
            staff_id: current_staff_id.to_string(),
        });
    }
    if current_staff_id == new_staff_id {
        return Err(TransitionError::Invalid(
            "Cannot transfer a conversation to its current owner".to_string(),
        ));
    }

    let mut t = Transition::begin(conversation, TransitionKind::Transferred);
    t.close_open_entry(now, Some(UnassignReason::ManualTransfer));
    t.open_entry(new_staff_id, now);
    t.note(
        SystemMessageType::StaffTransferred,
        format!(
            "Conversation transferred from {} to {}",
            current_staff_id, new_staff_id
        ),
    );
    Ok(t.finish(now))
}

/// Returns the conversation to the queue when its owner goes away.
///
/// `None` when the conversation is not (or no longer) held by `staff_id`.
/// `last_assigned_staff_id` is kept so a later reopen can reclaim.
pub fn release(
    conversation: &Conversation,
    staff_id: &str,
    reason: UnassignReason,
    now: &str,
) -> Option<Transition> {
    if !conversation.is_assigned_to(staff_id) {
        return None;
    }

    let mut t = Transition::begin(conversation, TransitionKind::Released);
    t.close_open_entry(now, Some(reason));
    t.conversation.status = ConversationStatus::Waiting;
    t.conversation.assigned_staff_id = None;
    t.note(
        SystemMessageType::StaffOffline,
        format!("{} is no longer available; conversation returned to the queue", staff_id),
    );
    Some(t.finish(now))
}

/// `None` when the conversation is already closed.
pub fn close(conversation: &Conversation, now: &str) -> Option<Transition> {
    if conversation.status == ConversationStatus::Closed {
        return None;
    }

    let mut t = Transition::begin(conversation, TransitionKind::Closed);
    t.close_open_entry(now, None);
    t.conversation.status = ConversationStatus::Closed;
    t.conversation.assigned_staff_id = None;
    t.note(
        SystemMessageType::ConversationClosed,
        "Conversation closed".to_string(),
    );
    Some(t.finish(now))
}
