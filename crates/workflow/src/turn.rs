//! Request and response types for one conversation turn.

use compass_core::{ConversationId, ErrorKind, SpecialistId, Stage, UserId};
use serde::{Deserialize, Serialize};

/// An incoming user message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    pub message: String,
    pub user_id: UserId,
    /// Existing conversation to continue; a new one is started if absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    /// Caller-supplied context merged into the conversation metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Map<String, serde_json::Value>>,
    /// Route through the empathy-first path
    #[serde(default)]
    pub use_specialist_flag: bool,
}

impl TurnRequest {
    pub fn new(message: impl Into<String>, user_id: UserId) -> Self {
        Self {
            message: message.into(),
            user_id,
            conversation_id: None,
            context: None,
            use_specialist_flag: false,
        }
    }

    pub fn in_conversation(mut self, id: ConversationId) -> Self {
        self.conversation_id = Some(id);
        self
    }

    pub fn with_context(mut self, context: serde_json::Map<String, serde_json::Value>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_specialist_workflow(mut self, enabled: bool) -> Self {
        self.use_specialist_flag = enabled;
        self
    }
}

/// The reply to one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResponse {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialist_attribution: Option<SpecialistId>,
    /// The routing stage the turn went through
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    pub conversation_id: ConversationId,
    pub turn: u32,
    /// Non-fatal conditions noted during the turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<ErrorKind>,
}

/// One item on a streaming turn channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnChunk {
    Chunk { content: String },
    Complete { response: TurnResponse },
    Error { message: String },
}

/// A human expert's resolution of a pending escalation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanResolution {
    pub escalation_id: String,
    pub expert_message: String,
    pub resolved_by: String,
}
