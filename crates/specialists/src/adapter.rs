//! Specialist invocation adapter.
//!
//! Calls the completion service on behalf of a specialist with a hard
//! per-attempt timeout. A failed or timed-out first attempt is retried once
//! with the fallback specialist's brief instructions and only the latest
//! user message. If that fails too, a fixed fallback message is returned.
//! [`SpecialistAdapter::invoke`] never fails.

use std::sync::Arc;
use std::time::Duration;

use compass_config::AppConfig;
use compass_core::{
    CompletionRequest, CompletionService, ErrorKind, GenerationConfig, Message, MessageMetadata,
    ProviderError, Role, SpecialistId,
};
use compass_routing::{SpecialistProfile, SpecialistRegistry};
use tracing::{debug, info, warn};

use crate::normalize::normalize;

/// Shown when both attempts fail.
pub const FALLBACK_MESSAGE: &str = "I'm sorry, I wasn't able to put together a full answer just now. \
Please try again in a moment, or rephrase your question and I'll do my best to help.";

/// Optional extra context appended to the specialist's instructions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationContext {
    pub empathy_notes: Option<String>,
    pub supervisor_notes: Option<String>,
    pub profile_summary: Option<String>,
}

impl InvocationContext {
    pub fn empathy(notes: impl Into<String>) -> Self {
        Self {
            empathy_notes: Some(notes.into()),
            ..Self::default()
        }
    }

    pub fn supervisor(notes: impl Into<String>) -> Self {
        Self {
            supervisor_notes: Some(notes.into()),
            ..Self::default()
        }
    }

    pub fn with_profile_summary(mut self, summary: Option<String>) -> Self {
        self.profile_summary = summary;
        self
    }

    fn is_empty(&self) -> bool {
        self.empathy_notes.is_none() && self.supervisor_notes.is_none() && self.profile_summary.is_none()
    }
}

/// Result of one invocation, always carrying a message.
#[derive(Debug, Clone)]
pub struct InvocationOutcome {
    pub message: Message,
    /// Completion-service calls made (1 or 2)
    pub attempts: u32,
    /// The retry or the fixed fallback message produced the reply
    pub fallback_used: bool,
    /// Kind of the last failure, if any attempt failed
    pub error: Option<ErrorKind>,
    /// Both attempts failed and the message is [`FALLBACK_MESSAGE`]
    pub exhausted: bool,
}

/// Invokes specialists against a completion service.
pub struct SpecialistAdapter {
    service: Arc<dyn CompletionService>,
    registry: Arc<SpecialistRegistry>,
    generation: GenerationConfig,
    timeout: Duration,
    history_limit: usize,
}

impl SpecialistAdapter {
    /// Create an adapter with a 40s timeout and default generation settings.
    pub fn new(service: Arc<dyn CompletionService>, registry: Arc<SpecialistRegistry>) -> Self {
        Self {
            service,
            registry,
            generation: GenerationConfig::default(),
            timeout: Duration::from_secs(40),
            history_limit: 20,
        }
    }

    /// Create an adapter using the model, timeout and history settings from config.
    pub fn from_config(
        service: Arc<dyn CompletionService>,
        registry: Arc<SpecialistRegistry>,
        config: &AppConfig,
    ) -> Self {
        Self::new(service, registry)
            .with_generation(GenerationConfig {
                model: config.model.clone(),
                temperature: config.temperature,
                max_tokens: Some(config.max_tokens),
            })
            .with_timeout(Duration::from_secs(config.invocation.timeout_secs))
            .with_history_limit(config.invocation.history_limit)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    pub fn registry(&self) -> &SpecialistRegistry {
        &self.registry
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ask `specialist` to answer the conversation so far.
    pub async fn invoke(
        &self,
        specialist: &SpecialistId,
        history: &[Message],
        context: &InvocationContext,
    ) -> InvocationOutcome {
        let profile = match self.registry.get(specialist) {
            Some(p) => p,
            None => {
                warn!(specialist = %specialist, "Unknown specialist, using general");
                self.registry.general()
            }
        };

        let window = history.len().saturating_sub(self.history_limit);
        let request = CompletionRequest {
            system_instructions: compose_instructions(&profile.instructions, context),
            messages: history[window..].to_vec(),
            generation: self.generation.clone(),
        };

        let first_error = match self.attempt(profile, request).await {
            Ok(mut message) => {
                message.metadata.attempts = 1;
                return InvocationOutcome {
                    message,
                    attempts: 1,
                    fallback_used: false,
                    error: None,
                    exhausted: false,
                };
            }
            Err(e) => e,
        };

        let fallback = self.registry.fallback_for(&profile.id);
        warn!(
            specialist = %profile.id,
            fallback = %fallback.id,
            error = %first_error,
            "Specialist call failed, retrying with reduced prompt"
        );

        let latest_user: Vec<Message> = history
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .cloned()
            .into_iter()
            .collect();
        let retry = CompletionRequest {
            system_instructions: fallback.brief.clone(),
            messages: latest_user,
            generation: self.generation.clone(),
        };

        match self.attempt(fallback, retry).await {
            Ok(mut message) => {
                message.metadata.attempts = 2;
                message.metadata.fallback_used = true;
                info!(specialist = %fallback.id, "Retry succeeded");
                InvocationOutcome {
                    message,
                    attempts: 2,
                    fallback_used: true,
                    error: Some(first_error.kind()),
                    exhausted: false,
                }
            }
            Err(second_error) => {
                warn!(
                    specialist = %fallback.id,
                    error = %second_error,
                    "Retry failed, returning fallback message"
                );
                let metadata = MessageMetadata {
                    attempts: 2,
                    fallback_used: true,
                    ..MessageMetadata::default()
                };
                InvocationOutcome {
                    message: Message::from_specialist(fallback.id.clone(), FALLBACK_MESSAGE, metadata),
                    attempts: 2,
                    fallback_used: true,
                    error: Some(second_error.kind()),
                    exhausted: true,
                }
            }
        }
    }

    async fn attempt(
        &self,
        profile: &SpecialistProfile,
        request: CompletionRequest,
    ) -> Result<Message, ProviderError> {
        debug!(
            specialist = %profile.id,
            service = %self.service.name(),
            messages = request.messages.len(),
            "Invoking specialist"
        );

        let response = match tokio::time::timeout(self.timeout, self.service.complete(request)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ProviderError::Timeout(format!(
                    "Specialist '{}' timed out after {}ms",
                    profile.id,
                    self.timeout.as_millis()
                )));
            }
        };

        let normalized = normalize(&response);
        if normalized.is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(Message::from_specialist(
            profile.id.clone(),
            normalized.content,
            normalized.metadata,
        ))
    }
}

fn compose_instructions(base: &str, context: &InvocationContext) -> String {
    if context.is_empty() {
        return base.to_string();
    }
    let mut out = base.to_string();
    if let Some(notes) = &context.empathy_notes {
        out.push_str("\n\n## Empathy notes\n");
        out.push_str(notes);
    }
    if let Some(notes) = &context.supervisor_notes {
        out.push_str("\n\n## Supervisor notes\n");
        out.push_str(notes);
    }
    if let Some(summary) = &context.profile_summary {
        out.push_str("\n\n## About the user\n");
        out.push_str(summary);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use compass_core::{CompletionResponse, ProviderError};
    use std::sync::Mutex;

    /// Returns queued results in order, then repeats the last one.
    struct ScriptedService {
        script: Mutex<Vec<Result<CompletionResponse, ProviderError>>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedService {
        fn new(script: Vec<Result<CompletionResponse, ProviderError>>) -> Self {
            Self {
                script: Mutex::new(script),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn request(&self, i: usize) -> CompletionRequest {
            self.requests.lock().unwrap()[i].clone()
        }
    }

    #[async_trait]
    impl CompletionService for ScriptedService {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
            self.requests.lock().unwrap().push(request);
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            }
        }
    }

    /// Never answers.
    struct HangingService {
        call_count: Mutex<usize>,
    }

    #[async_trait]
    impl CompletionService for HangingService {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
            *self.call_count.lock().unwrap() += 1;
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(ProviderError::Network("unreachable".into()))
        }
    }

    fn adapter(service: Arc<dyn CompletionService>) -> SpecialistAdapter {
        SpecialistAdapter::new(service, Arc::new(SpecialistRegistry::with_defaults()))
            .with_timeout(Duration::from_millis(50))
    }

    fn history() -> Vec<Message> {
        vec![
            Message::user("Hi"),
            Message::assistant("Hello! How can I help?"),
            Message::user("I'm a veteran looking at solar jobs"),
        ]
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let service = Arc::new(ScriptedService::new(vec![Ok(CompletionResponse::text("Try SolarCorps."))]));
        let out = adapter(service.clone())
            .invoke(&SpecialistId::veteran(), &history(), &InvocationContext::default())
            .await;

        assert_eq!(out.message.content, "Try SolarCorps.");
        assert_eq!(out.message.specialist_attribution, Some(SpecialistId::veteran()));
        assert_eq!(out.attempts, 1);
        assert!(!out.fallback_used);
        assert!(out.error.is_none());
        assert_eq!(service.calls(), 1);

        let req = service.request(0);
        assert_eq!(req.messages.len(), 3);
        assert!(req.system_instructions.contains("veterans"));
    }

    #[tokio::test]
    async fn context_is_appended_to_instructions() {
        let service = Arc::new(ScriptedService::new(vec![Ok(CompletionResponse::text("ok"))]));
        let ctx = InvocationContext::empathy("User sounds anxious.")
            .with_profile_summary(Some("Former Army electrician".into()));
        adapter(service.clone())
            .invoke(&SpecialistId::general(), &history(), &ctx)
            .await;

        let sys = service.request(0).system_instructions;
        assert!(sys.contains("## Empathy notes\nUser sounds anxious."));
        assert!(sys.contains("Former Army electrician"));
    }

    #[tokio::test]
    async fn failure_retries_once_with_reduced_prompt() {
        let service = Arc::new(ScriptedService::new(vec![
            Err(ProviderError::Service {
                status_code: 503,
                message: "unavailable".into(),
            }),
            Ok(CompletionResponse::text("Short answer.")),
        ]));
        let out = adapter(service.clone())
            .invoke(&SpecialistId::veteran(), &history(), &InvocationContext::supervisor("notes"))
            .await;

        assert_eq!(service.calls(), 2);
        assert_eq!(out.attempts, 2);
        assert!(out.fallback_used);
        assert_eq!(out.error, Some(ErrorKind::ServiceUnavailable));
        assert_eq!(out.message.content, "Short answer.");
        assert_eq!(out.message.specialist_attribution, Some(SpecialistId::general()));
        assert!(out.message.metadata.fallback_used);

        let retry = service.request(1);
        assert_eq!(retry.messages.len(), 1);
        assert_eq!(retry.messages[0].content, "I'm a veteran looking at solar jobs");
        assert!(!retry.system_instructions.contains("Supervisor notes"));
    }

    #[tokio::test]
    async fn timeout_then_failure_returns_fallback_message() {
        let service = Arc::new(HangingService {
            call_count: Mutex::new(0),
        });
        let out = adapter(service.clone())
            .invoke(&SpecialistId::resume(), &history(), &InvocationContext::default())
            .await;

        assert_eq!(*service.call_count.lock().unwrap(), 2);
        assert_eq!(out.attempts, 2);
        assert!(out.fallback_used);
        assert_eq!(out.error, Some(ErrorKind::InvocationTimeout));
        assert_eq!(out.message.content, FALLBACK_MESSAGE);
        assert_eq!(out.message.role, Role::Assistant);
    }

    #[tokio::test]
    async fn empty_response_counts_as_failure() {
        let service = Arc::new(ScriptedService::new(vec![
            Ok(CompletionResponse::text("   ")),
            Ok(CompletionResponse::text("Recovered.")),
        ]));
        let out = adapter(service.clone())
            .invoke(&SpecialistId::general(), &history(), &InvocationContext::default())
            .await;
        assert_eq!(out.message.content, "Recovered.");
        assert_eq!(out.error, Some(ErrorKind::ServiceUnavailable));
    }

    #[tokio::test]
    async fn unknown_specialist_uses_general() {
        let service = Arc::new(ScriptedService::new(vec![Ok(CompletionResponse::text("hi"))]));
        let out = adapter(service)
            .invoke(&SpecialistId::new("astronaut"), &history(), &InvocationContext::default())
            .await;
        assert_eq!(out.message.specialist_attribution, Some(SpecialistId::general()));
    }

    #[tokio::test]
    async fn history_is_windowed() {
        let service = Arc::new(ScriptedService::new(vec![Ok(CompletionResponse::text("ok"))]));
        adapter(service.clone())
            .with_history_limit(2)
            .invoke(&SpecialistId::general(), &history(), &InvocationContext::default())
            .await;
        let req = service.request(0);
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[1].content, "I'm a veteran looking at solar jobs");
    }

    #[test]
    fn from_config_reads_invocation_settings() {
        let mut config = AppConfig::default();
        config.invocation.timeout_secs = 7;
        config.model = "local".into();
        let service = Arc::new(ScriptedService::new(vec![Ok(CompletionResponse::text("ok"))]));
        let a = SpecialistAdapter::from_config(service, Arc::new(SpecialistRegistry::with_defaults()), &config);
        assert_eq!(a.timeout(), Duration::from_secs(7));
        assert_eq!(a.generation.model, "local");
    }
}
