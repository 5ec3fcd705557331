//! End-to-end integration tests for the Compass routing engine.
//!
//! These tests exercise the full pipeline from user message to reply:
//! classification, routing, specialist invocation, crisis escalation,
//! persistence, analytics and human resolution.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use compass_analytics::{AnalyticsLogger, StoreSink};
use compass_config::AppConfig;
use compass_core::{
    CompletionPayload, CompletionRequest, CompletionResponse, CompletionService, ConversationId,
    ConversationStore, EscalationStatus, ErrorKind, Priority, ProviderError, SpecialistId, Stage, UserId,
};
use compass_routing::Router;
use compass_specialists::{FALLBACK_MESSAGE, SpecialistAdapter};
use compass_store::{FileStore, InMemoryStore};
use compass_workflow::{HOLDING_MESSAGE, HumanResolution, SAFETY_MESSAGE, TurnRequest, WorkflowTracker};

// ── Mock Services ────────────────────────────────────────────────────────

/// Returns scripted responses in sequence, then a default reply.
struct ScriptedService {
    responses: Mutex<Vec<CompletionResponse>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedService {
    fn new(responses: Vec<CompletionResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn text(response: &str) -> Self {
        Self::new(vec![CompletionResponse::text(response)])
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, i: usize) -> CompletionRequest {
        self.requests.lock().unwrap()[i].clone()
    }
}

#[async_trait::async_trait]
impl CompletionService for ScriptedService {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(CompletionResponse::text("Happy to help with that."))
        } else {
            Ok(responses.remove(0))
        }
    }
}

/// Never answers.
struct HangingService {
    call_count: Mutex<usize>,
}

impl HangingService {
    fn new() -> Self {
        Self {
            call_count: Mutex::new(0),
        }
    }

    fn calls(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl CompletionService for HangingService {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        *self.call_count.lock().unwrap() += 1;
        std::future::pending::<()>().await;
        Err(ProviderError::EmptyResponse)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn tracker_with(
    service: Arc<dyn CompletionService>,
    store: Arc<dyn ConversationStore>,
    timeout: Duration,
) -> Arc<WorkflowTracker> {
    let router = Arc::new(Router::from_config(&AppConfig::default()).unwrap());
    let adapter = Arc::new(SpecialistAdapter::new(service, router.registry.clone()).with_timeout(timeout));
    let analytics = Arc::new(AnalyticsLogger::spawn(Arc::new(StoreSink::new(store.clone())), 64));
    Arc::new(WorkflowTracker::new(router, adapter, store, analytics))
}

fn turn(text: &str, conversation: &str) -> TurnRequest {
    TurnRequest::new(text, UserId::from("user-1")).in_conversation(ConversationId::from(conversation))
}

// ── Named scenarios ──────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_crisis_message_gets_safety_message_and_escalation() {
    let service = Arc::new(ScriptedService::text("should never be used"));
    let store = Arc::new(InMemoryStore::new());
    let tracker = tracker_with(service.clone(), store.clone(), Duration::from_secs(5));

    let response = tracker
        .process_turn(turn("I don't see the point anymore, I want to end my life", "conv-crisis"))
        .await;

    assert_eq!(response.content, SAFETY_MESSAGE);
    assert_eq!(response.stage, Stage::EmergencyHandoff);
    assert_eq!(response.specialist_attribution, Some(SpecialistId::crisis_protocol()));
    assert!(response.diagnostics.contains(&ErrorKind::CrisisDetected));
    assert_eq!(service.calls(), 0, "crisis turns never reach the completion service");

    let pending = store.escalations(Some(EscalationStatus::Pending)).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].priority, Priority::Immediate);
    assert_eq!(pending[0].conversation_id, ConversationId::from("conv-crisis"));
}

#[tokio::test]
async fn e2e_veteran_solar_routes_to_veteran_specialist() {
    let service = Arc::new(ScriptedService::text("Your logistics experience maps well to solar project work."));
    let tracker = tracker_with(service.clone(), Arc::new(InMemoryStore::new()), Duration::from_secs(5));

    let response = tracker
        .process_turn(turn("I'm a veteran interested in solar jobs", "conv-vet"))
        .await;

    assert_eq!(response.stage, Stage::SpecialistDirect);
    assert_eq!(response.specialist_attribution, Some(SpecialistId::veteran()));
    assert_eq!(response.content, "Your logistics experience maps well to solar project work.");
    assert_eq!(service.calls(), 1);
}

#[tokio::test]
async fn e2e_third_benign_turn_is_supervisor_mediated() {
    let service = Arc::new(ScriptedService::new(vec![]));
    let tracker = tracker_with(service.clone(), Arc::new(InMemoryStore::new()), Duration::from_secs(5));

    let first = tracker.process_turn(turn("hello", "conv-multi")).await;
    assert_eq!(first.stage, Stage::SimpleResponse);
    assert_eq!(first.specialist_attribution, Some(SpecialistId::general()));

    let second = tracker.process_turn(turn("what should I do next?", "conv-multi")).await;
    assert_eq!(second.stage, Stage::SimpleResponse);

    let third = tracker.process_turn(turn("ok, tell me more", "conv-multi")).await;
    assert_eq!(third.turn, 3);
    assert_eq!(third.stage, Stage::SupervisorMediated);
    assert_eq!(service.calls(), 3);
}

#[tokio::test]
async fn e2e_timeout_retries_once_then_falls_back() {
    let service = Arc::new(HangingService::new());
    let tracker = tracker_with(service.clone(), Arc::new(InMemoryStore::new()), Duration::from_millis(50));

    let response = tracker.process_turn(turn("Can you look at my resume?", "conv-slow")).await;

    assert_eq!(service.calls(), 2, "exactly one retry");
    assert_eq!(response.content, FALLBACK_MESSAGE);
    assert_eq!(response.specialist_attribution, Some(SpecialistId::general()));
    assert!(response.diagnostics.contains(&ErrorKind::InvocationTimeout));
}

// ── Crisis lifecycle ─────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_crisis_flag_is_sticky_until_human_resolution() {
    let service = Arc::new(ScriptedService::text("Welcome back. Let's pick up where we left off."));
    let store = Arc::new(InMemoryStore::new());
    let tracker = tracker_with(service.clone(), store.clone(), Duration::from_secs(5));

    tracker.process_turn(turn("I want to kill myself", "conv-sticky")).await;

    // Further turns are held, even benign ones and even repeated crisis language.
    for text in ["hello?", "I'm a veteran looking for work", "I want to kill myself"] {
        let held = tracker.process_turn(turn(text, "conv-sticky")).await;
        assert_eq!(held.content, HOLDING_MESSAGE);
        assert_eq!(held.stage, Stage::EmergencyHandoff);
    }
    assert_eq!(service.calls(), 0);
    assert_eq!(store.escalations(None).await.unwrap().len(), 1, "no duplicate escalation");

    let escalation = tracker.pending_escalations().await.unwrap().remove(0);
    let resolved = tracker
        .resolve_escalation(HumanResolution {
            escalation_id: escalation.id.clone(),
            expert_message: "Hi, I'm a counselor. I'm here and we can talk whenever you're ready.".into(),
            resolved_by: "counselor-42".into(),
        })
        .await
        .unwrap();
    assert_eq!(resolved.status(), EscalationStatus::Resolved);
    assert_eq!(resolved.resolved_by(), Some("counselor-42"));

    let state = tracker
        .conversation(&ConversationId::from("conv-sticky"))
        .await
        .unwrap()
        .unwrap();
    assert!(!state.crisis_flag());
    assert_eq!(state.stage(), Stage::Resolved);

    let after = tracker.process_turn(turn("thanks, I'm feeling a bit better", "conv-sticky")).await;
    assert_eq!(after.content, "Welcome back. Let's pick up where we left off.");
    assert_eq!(service.calls(), 1);
}

#[tokio::test]
async fn e2e_escalation_resolves_exactly_once() {
    let store = Arc::new(InMemoryStore::new());
    let tracker = tracker_with(Arc::new(ScriptedService::new(vec![])), store.clone(), Duration::from_secs(5));
    tracker.process_turn(turn("there's no reason to live", "conv-once")).await;
    let id = tracker.pending_escalations().await.unwrap()[0].id.clone();

    let resolution = |by: &str| HumanResolution {
        escalation_id: id.clone(),
        expert_message: "Checking in with you.".into(),
        resolved_by: by.into(),
    };

    let (a, b) = tokio::join!(
        tracker.resolve_escalation(resolution("counselor-a")),
        tracker.resolve_escalation(resolution("counselor-b")),
    );
    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1, "exactly one resolution wins");

    let stored = store.get_escalation(&id).await.unwrap().unwrap();
    assert_eq!(stored.status(), EscalationStatus::Resolved);
    assert!(stored.resolved_at().is_some());
    assert!(tracker.pending_escalations().await.unwrap().is_empty());

    let state = store.load_conversation(&ConversationId::from("conv-once")).await.unwrap().unwrap();
    let experts = state
        .messages()
        .iter()
        .filter(|m| m.specialist_attribution == Some(SpecialistId::human_expert()))
        .count();
    assert_eq!(experts, 1);
}

#[tokio::test]
async fn e2e_escalation_survives_restart_with_file_store() {
    let dir = tempfile::tempdir().unwrap();

    {
        let store: Arc<dyn ConversationStore> = Arc::new(FileStore::new(dir.path()));
        let tracker = tracker_with(Arc::new(ScriptedService::new(vec![])), store, Duration::from_secs(5));
        tracker.process_turn(turn("I want to end it all", "conv-file")).await;
        tracker.shutdown().await;
    }

    // A fresh process sees the pending escalation and the held conversation.
    let store: Arc<dyn ConversationStore> = Arc::new(FileStore::new(dir.path()));
    let service = Arc::new(ScriptedService::new(vec![]));
    let tracker = tracker_with(service.clone(), store.clone(), Duration::from_secs(5));

    let held = tracker.process_turn(turn("are you there?", "conv-file")).await;
    assert_eq!(held.content, HOLDING_MESSAGE);
    assert_eq!(held.turn, 2);

    let pending = tracker.pending_escalations().await.unwrap();
    assert_eq!(pending.len(), 1);
    tracker
        .resolve_escalation(HumanResolution {
            escalation_id: pending[0].id.clone(),
            expert_message: "I'm here.".into(),
            resolved_by: "counselor".into(),
        })
        .await
        .unwrap();

    let state = store.load_conversation(&ConversationId::from("conv-file")).await.unwrap().unwrap();
    assert!(!state.crisis_flag());
    assert_eq!(service.calls(), 0);
}

// ── Empathy path ─────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_high_distress_gets_empathy_only() {
    let service = Arc::new(ScriptedService::text("That sounds incredibly heavy. I'm here with you."));
    let tracker = tracker_with(service.clone(), Arc::new(InMemoryStore::new()), Duration::from_secs(5));

    let response = tracker
        .process_turn(turn("I feel hopeless and overwhelmed since the layoff", "conv-empathy"))
        .await;

    assert_eq!(response.stage, Stage::EmpathyFirst);
    assert_eq!(response.content, "That sounds incredibly heavy. I'm here with you.");
    assert_eq!(service.calls(), 1, "high tier is not ready for a specialist by default");
    assert!(service.request(0).system_instructions.contains("## Empathy notes"));
}

#[tokio::test]
async fn e2e_specialist_workflow_flag_hands_ready_user_to_specialist() {
    let service = Arc::new(ScriptedService::new(vec![
        CompletionResponse {
            payload: CompletionPayload::Text("Moving countries is a lot to handle.".into()),
            metadata: Some(serde_json::json!({"ready_for_specialist": true})),
            model: String::new(),
        },
        CompletionResponse::text("Credential evaluation services can assess your degree."),
    ]));
    let tracker = tracker_with(service.clone(), Arc::new(InMemoryStore::new()), Duration::from_secs(5));

    let response = tracker
        .process_turn(
            turn("I'm an immigrant engineer and worried my degree won't count", "conv-intl")
                .with_specialist_workflow(true),
        )
        .await;

    assert_eq!(response.stage, Stage::EmpathyFirst);
    assert_eq!(response.specialist_attribution, Some(SpecialistId::international()));
    assert!(response.content.starts_with("Moving countries is a lot to handle."));
    assert!(response.content.ends_with("Credential evaluation services can assess your degree."));
    assert_eq!(service.calls(), 2);
}

// ── Analytics ────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_every_turn_is_audited() {
    let store = Arc::new(InMemoryStore::new());
    let tracker = tracker_with(Arc::new(ScriptedService::new(vec![])), store.clone(), Duration::from_secs(5));

    tracker.process_turn(turn("I'm a veteran interested in solar jobs", "conv-audit")).await;
    tracker.process_turn(turn("I want to end my life", "conv-audit")).await;
    tracker.shutdown().await;

    let rows = store.analytics_for(&ConversationId::from("conv-audit")).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].specialist_used, Some(SpecialistId::veteran()));
    assert_eq!(rows[0].attempts, 1);
    assert_eq!(rows[1].decision.resulting_stage, Stage::EmergencyHandoff);
    assert_eq!(rows[1].attempts, 0);

    let summary = tracker.analytics().summary();
    assert_eq!(summary.turns, 2);
    assert_eq!(summary.crises, 1);
    assert_eq!(summary.by_specialist["veteran"], 1);
}
