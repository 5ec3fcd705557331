//! Escalation records: durable markers of conversations awaiting human review.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{ConversationId, UserId};

/// How urgently a human must look at the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Immediate,
    High,
    Normal,
}

/// Lifecycle of an escalation. `Pending -> Resolved` happens exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    Pending,
    Resolved,
}

/// A conversation flagged for human review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRecord {
    pub id: String,
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub trigger_reason: String,
    pub priority: Priority,
    status: EscalationStatus,
    pub created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resolved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resolution_note: Option<String>,
}

impl EscalationRecord {
    /// Open a new pending escalation.
    pub fn open(
        conversation_id: ConversationId,
        user_id: UserId,
        trigger_reason: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id,
            user_id,
            trigger_reason: trigger_reason.into(),
            priority,
            status: EscalationStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
            resolved_by: None,
            resolution_note: None,
        }
    }

    pub fn status(&self) -> EscalationStatus {
        self.status
    }

    pub fn is_pending(&self) -> bool {
        self.status == EscalationStatus::Pending
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    pub fn resolved_by(&self) -> Option<&str> {
        self.resolved_by.as_deref()
    }

    pub fn resolution_note(&self) -> Option<&str> {
        self.resolution_note.as_deref()
    }

    /// Mark the escalation resolved. Returns `false` (and changes nothing)
    /// if it was already resolved, so `resolved_at` is set exactly once.
    pub fn resolve(&mut self, resolved_by: impl Into<String>, note: impl Into<String>) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.status = EscalationStatus::Resolved;
        self.resolved_at = Some(Utc::now());
        self.resolved_by = Some(resolved_by.into());
        self.resolution_note = Some(note.into());
        true
    }
}
