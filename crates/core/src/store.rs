//! Persistence contract for conversations, escalations and analytics rows.
//!
//! Records are keyed by `conversation_id` (and listed by `user_id`). The
//! store is treated as eventually consistent; callers on the response path
//! degrade to logging when it is unavailable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conversation::{ConversationState, Stage};
use crate::error::{ErrorKind, StoreError};
use crate::escalation::{EscalationRecord, EscalationStatus};
use crate::message::{ConversationId, UserId};
use crate::routing::{RoutingDecision, SpecialistId};

/// One analytics row per processed turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsRow {
    pub id: String,
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub turn: u32,
    pub decision: RoutingDecision,
    /// Stage the conversation rested in after the turn
    pub final_stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialist_used: Option<SpecialistId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools_used: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub latency_ms: u64,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub fallback_used: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<ErrorKind>,
    pub recorded_at: DateTime<Utc>,
}

impl AnalyticsRow {
    /// Start a row for a turn; remaining fields are filled by the caller.
    pub fn new(
        conversation_id: ConversationId,
        user_id: UserId,
        turn: u32,
        decision: RoutingDecision,
        final_stage: Stage,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id,
            user_id,
            turn,
            decision,
            final_stage,
            specialist_used: None,
            tools_used: Vec::new(),
            confidence: None,
            latency_ms: 0,
            attempts: 0,
            fallback_used: false,
            diagnostics: Vec::new(),
            recorded_at: Utc::now(),
        }
    }
}

/// Row counts reported by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub conversations: usize,
    pub pending_escalations: usize,
    pub resolved_escalations: usize,
    pub analytics_rows: usize,
}

/// The persistence trait.
///
/// Implementations: in-memory (tests, ephemeral runs), JSON files, none.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The backend name (e.g., "memory", "file", "none").
    fn name(&self) -> &str;

    /// Load a conversation by id.
    async fn load_conversation(&self, id: &ConversationId) -> Result<Option<ConversationState>, StoreError>;

    /// Insert or replace a conversation.
    async fn save_conversation(&self, state: &ConversationState) -> Result<(), StoreError>;

    /// All conversations owned by a user.
    async fn conversations_for_user(&self, user_id: &UserId) -> Result<Vec<ConversationState>, StoreError>;

    /// Persist a new escalation.
    async fn create_escalation(&self, record: &EscalationRecord) -> Result<(), StoreError>;

    /// Load an escalation by id.
    async fn get_escalation(&self, id: &str) -> Result<Option<EscalationRecord>, StoreError>;

    /// Replace an existing escalation. Fails with `NotFound` if absent.
    async fn update_escalation(&self, record: &EscalationRecord) -> Result<(), StoreError>;

    /// List escalations, optionally filtered by status, oldest first.
    async fn escalations(&self, status: Option<EscalationStatus>) -> Result<Vec<EscalationRecord>, StoreError>;

    /// All escalations raised for a conversation, oldest first.
    async fn escalations_for_conversation(&self, id: &ConversationId) -> Result<Vec<EscalationRecord>, StoreError>;

    /// Append an analytics row.
    async fn record_analytics(&self, row: &AnalyticsRow) -> Result<(), StoreError>;

    /// Analytics rows for a conversation, in insertion order.
    async fn analytics_for(&self, id: &ConversationId) -> Result<Vec<AnalyticsRow>, StoreError>;

    /// Row counts.
    async fn stats(&self) -> Result<StoreStats, StoreError>;
}
