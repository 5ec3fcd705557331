//! OpenAI-compatible completion service.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM and any endpoint exposing
//! `/chat/completions`. The raw JSON body is handed back as a
//! [`CompletionPayload::Json`] and normalized by the adapter.

use async_trait::async_trait;
use compass_config::AppConfig;
use compass_core::{
    CompletionPayload, CompletionRequest, CompletionResponse, CompletionService, Message, ProviderError, Role,
};
use serde::Serialize;
use tracing::{debug, warn};

/// An OpenAI-compatible chat completions client.
pub struct OpenAiCompatService {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatService {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        // The adapter enforces the real deadline; this is a backstop.
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// OpenAI (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Ollama running locally.
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new("ollama", base_url.unwrap_or("http://localhost:11434/v1"), "ollama")
    }

    /// Build from config. Fails when no API key is configured.
    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let key = config
            .api_key
            .clone()
            .ok_or_else(|| ProviderError::NotConfigured("no API key; set COMPASS_API_KEY".into()))?;
        Ok(Self::new(config.provider.clone(), config.api_url.clone(), key))
    }

    fn to_api_messages(system: &str, messages: &[Message]) -> Vec<ApiMessage> {
        let mut out = Vec::with_capacity(messages.len() + 1);
        if !system.is_empty() {
            out.push(ApiMessage {
                role: "system",
                content: system.to_string(),
            });
        }
        out.extend(messages.iter().map(|m| ApiMessage {
            role: match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
            },
            content: m.content.clone(),
        }));
        out
    }
}

#[async_trait]
impl CompletionService for OpenAiCompatService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": request.generation.model,
            "messages": Self::to_api_messages(&request.system_instructions, &request.messages),
            "temperature": request.generation.temperature,
            "stream": false,
        });
        if let Some(max_tokens) = request.generation.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        debug!(service = %self.name, model = %request.generation.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited { retry_after_secs: 5 });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Completion service returned error");
            return Err(ProviderError::Service {
                status_code: status,
                message: error_body,
            });
        }

        let doc: serde_json::Value = response.json().await.map_err(|e| ProviderError::Service {
            status_code: 200,
            message: format!("Failed to parse response: {e}"),
        })?;

        Ok(into_response(doc))
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

/// Split a chat completions body into payload, usage metadata and model.
fn into_response(doc: serde_json::Value) -> CompletionResponse {
    let model = doc["model"].as_str().unwrap_or_default().to_string();
    let metadata = doc
        .get("usage")
        .filter(|u| !u.is_null())
        .map(|u| serde_json::json!({ "usage": u }));
    CompletionResponse {
        payload: CompletionPayload::Json(doc),
        metadata,
        model,
    }
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}
