//! Message and identifier types.
//!
//! A [`Message`] is created once per turn (user input, specialist reply,
//! safety notice, expert reply) and appended to its conversation. Nothing
//! mutates a message after it has been created.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::routing::SpecialistId;

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the end user owning a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn anonymous() -> Self {
        Self("anonymous".into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// A specialist, the safety protocol, or a human expert
    Assistant,
    /// System instructions
    System,
}

/// Structured metadata attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Tools the specialist reported using
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools_used: Vec<String>,

    /// Self-reported confidence in `[0.0, 1.0]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,

    /// Sources cited by the specialist
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,

    /// Number of completion-service attempts behind this message
    #[serde(default)]
    pub attempts: u32,

    /// Whether the reduced-prompt retry or the static fallback produced it
    #[serde(default)]
    pub fallback_used: bool,

    /// Empathy step signal: the user is ready for specialist guidance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_for_specialist: Option<bool>,

    /// Empathy step signal: a human should take over
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff_requested: Option<bool>,

    /// Anything else the service returned
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Which specialist (or protocol) produced an assistant message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialist_attribution: Option<SpecialistId>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Structured metadata
    #[serde(default)]
    pub metadata: MessageMetadata,
}

impl Message {
    fn build(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            specialist_attribution: None,
            created_at: Utc::now(),
            metadata: MessageMetadata::default(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::build(Role::User, content.into())
    }

    /// Create a new assistant message without attribution.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::build(Role::Assistant, content.into())
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::build(Role::System, content.into())
    }

    /// Create an assistant message attributed to a specialist.
    pub fn from_specialist(
        specialist: SpecialistId,
        content: impl Into<String>,
        metadata: MessageMetadata,
    ) -> Self {
        Self {
            specialist_attribution: Some(specialist),
            metadata,
            ..Self::build(Role::Assistant, content.into())
        }
    }
}
