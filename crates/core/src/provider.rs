//! Completion service contract: the abstraction over language-model backends.
//!
//! The routing engine treats the model as an opaque capability: given system
//! instructions, message history and generation settings it returns content
//! plus optional structured metadata, or fails.
//!
//! Backends disagree on response shape, so [`CompletionPayload`] keeps the
//! raw shape and the specialist adapter normalizes it into a [`Message`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Message;

/// Generation settings for a completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// The model to use
    pub model: String,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.7
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            temperature: default_temperature(),
            max_tokens: Some(1024),
        }
    }
}

/// A request to the completion service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// System instructions (specialist persona plus supplementary context)
    pub system_instructions: String,

    /// Conversation history, oldest first
    pub messages: Vec<Message>,

    /// Generation settings
    pub generation: GenerationConfig,
}

/// Raw response content as returned by a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "value", rename_all = "snake_case")]
pub enum CompletionPayload {
    /// A plain text body
    Text(String),
    /// A list of text fragments to be joined
    Parts(Vec<String>),
    /// A JSON document in one of the known response layouts
    Json(serde_json::Value),
}

/// A response from the completion service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// The generated content in its raw shape
    pub payload: CompletionPayload,

    /// Structured metadata (tools used, confidence, empathy signals)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,

    /// Which model actually responded
    #[serde(default)]
    pub model: String,
}

impl CompletionResponse {
    /// A plain-text response with no metadata.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            payload: CompletionPayload::Text(content.into()),
            metadata: None,
            model: String::new(),
        }
    }
}

/// The completion-service capability.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// A human-readable name for this backend.
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: CompletionRequest) -> std::result::Result<CompletionResponse, ProviderError>;

    /// Health check: can we reach the backend?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}
