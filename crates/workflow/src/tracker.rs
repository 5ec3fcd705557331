//! The workflow tracker: drives one turn from user message to reply.
//!
//! For every turn the tracker loads the conversation, routes the message,
//! walks the stage machine, invokes specialists through the adapter (or the
//! crisis handler), persists the state and queues an analytics row. It never
//! fails the caller: every degradation ends in a reply plus a diagnostic.

use std::sync::Arc;
use std::time::Instant;

use compass_analytics::AnalyticsLogger;
use compass_core::{
    AnalyticsRow, ConversationId, ConversationState, ConversationStore, ErrorKind, EscalationRecord,
    EscalationStatus, Message, MessageMetadata, RoutingDecision, SpecialistId, Stage, Tier,
};
use compass_routing::{Routed, Router, classify};
use compass_specialists::{InvocationContext, InvocationOutcome, SpecialistAdapter};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::WorkflowError;
use crate::crisis::CrisisHandler;
use crate::locks::ConversationLocks;
use crate::turn::{HumanResolution, TurnChunk, TurnRequest, TurnResponse};

const EMPATHY_NOTES: &str = "The user may be under emotional strain. Acknowledge how they feel before offering \
any guidance, keep the tone warm and unhurried, and do not push next steps they have not asked for.";

const SUPERVISOR_NOTES: &str = "This conversation has gone on for several turns. Briefly recap what has been \
discussed so far, then give one clear, concrete next step.";

const HANDOFF_REASON: &str = "human handoff requested during empathy response";

const STREAM_BUFFER: usize = 32;
const STREAM_WORDS_PER_CHUNK: usize = 4;

const STREAM_ERROR: &str = "Something went wrong while processing your message. Please try again.";

/// What one routed turn produced, before persistence and analytics.
struct TurnResult {
    reply: Message,
    /// Text returned to the caller; may combine several messages
    content: String,
    decision: RoutingDecision,
    stage: Stage,
    attempts: u32,
    fallback_used: bool,
    diagnostics: Vec<ErrorKind>,
}

impl TurnResult {
    fn from_message(reply: Message, decision: RoutingDecision, stage: Stage) -> Self {
        let diagnostics = decision.diagnostics.clone();
        Self {
            content: reply.content.clone(),
            reply,
            decision,
            stage,
            attempts: 0,
            fallback_used: false,
            diagnostics,
        }
    }

    fn from_outcome(outcome: InvocationOutcome, decision: RoutingDecision, stage: Stage) -> Self {
        let mut result = Self::from_message(outcome.message, decision, stage);
        result.attempts = outcome.attempts;
        result.fallback_used = outcome.fallback_used;
        if let Some(kind) = outcome.error {
            note(&mut result.diagnostics, kind);
        }
        result
    }
}

/// Processes turns and human resolutions.
pub struct WorkflowTracker {
    router: Arc<Router>,
    adapter: Arc<SpecialistAdapter>,
    store: Arc<dyn ConversationStore>,
    analytics: Arc<AnalyticsLogger>,
    crisis: CrisisHandler,
    locks: ConversationLocks,
}

impl WorkflowTracker {
    pub fn new(
        router: Arc<Router>,
        adapter: Arc<SpecialistAdapter>,
        store: Arc<dyn ConversationStore>,
        analytics: Arc<AnalyticsLogger>,
    ) -> Self {
        Self {
            router,
            adapter,
            crisis: CrisisHandler::new(store.clone()),
            store,
            analytics,
            locks: ConversationLocks::new(),
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn analytics(&self) -> &AnalyticsLogger {
        &self.analytics
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Process one user message and return the reply.
    pub async fn process_turn(&self, request: TurnRequest) -> TurnResponse {
        let started = Instant::now();
        let conversation_id = request.conversation_id.clone().unwrap_or_default();
        let _guard = self.locks.lock(&conversation_id).await;
        let mut diagnostics = Vec::new();

        // A state rebuilt after a failed load is never saved over the stored one.
        let (mut state, rebuilt) = match self.store.load_conversation(&conversation_id).await {
            Ok(Some(state)) => (state, false),
            Ok(None) => (ConversationState::new(conversation_id.clone(), request.user_id.clone()), false),
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "Could not load conversation");
                diagnostics.push(ErrorKind::PersistenceUnavailable);
                (ConversationState::new(conversation_id.clone(), request.user_id.clone()), true)
            }
        };
        let held = state.crisis_flag() || self.awaiting_human(&conversation_id, rebuilt).await;
        if held && !state.crisis_flag() && !rebuilt {
            warn!(conversation_id = %conversation_id, "Pending escalation on unflagged conversation, holding");
            state.enter_emergency_handoff();
        }
        if let Some(context) = request.context {
            state.metadata.extend(context);
        }
        let turn = state.push_user_message(Message::user(request.message.as_str()));

        let result = if held {
            self.held_turn(&state, &request.message, turn)
        } else {
            self.routed_turn(&mut state, &request.message, turn, request.use_specialist_flag)
                .await
        };

        for kind in &result.diagnostics {
            note(&mut diagnostics, *kind);
        }

        if result.stage != Stage::EmergencyHandoff {
            state.last_specialist = result.reply.specialist_attribution.clone();
        }
        state.push_message(result.reply.clone());

        if rebuilt {
            warn!(conversation_id = %conversation_id, "Turn not persisted, stored conversation left untouched");
        } else if let Err(e) = self.store.save_conversation(&state).await {
            warn!(conversation_id = %conversation_id, error = %e, "Could not save conversation");
            note(&mut diagnostics, ErrorKind::PersistenceUnavailable);
        }
        let final_stage = if held { Stage::EmergencyHandoff } else { state.stage() };

        let latency_ms = started.elapsed().as_millis() as u64;
        info!(
            conversation_id = %conversation_id,
            turn,
            stage = %result.stage,
            tier = %result.decision.tier,
            specialist = ?result.reply.specialist_attribution.as_ref().map(|s| s.as_str()),
            latency_ms,
            "Turn processed"
        );

        let mut row = AnalyticsRow::new(
            state.conversation_id.clone(),
            state.user_id.clone(),
            turn,
            result.decision,
            final_stage,
        );
        row.specialist_used = result.reply.specialist_attribution.clone();
        row.tools_used = result.reply.metadata.tools_used.clone();
        row.confidence = result.reply.metadata.confidence;
        row.latency_ms = latency_ms;
        row.attempts = result.attempts;
        row.fallback_used = result.fallback_used;
        row.diagnostics = diagnostics.clone();
        self.analytics.record(row);

        TurnResponse {
            content: result.content,
            specialist_attribution: result.reply.specialist_attribution,
            stage: result.stage,
            sources: result.reply.metadata.sources,
            conversation_id,
            turn,
            diagnostics,
        }
    }

    /// Process a turn in the background and stream the reply.
    ///
    /// The channel carries word-group chunks, then one `Complete` with the
    /// full response. A failed turn task yields a single generic `Error`.
    pub fn process_turn_streaming(self: &Arc<Self>, request: TurnRequest) -> mpsc::Receiver<TurnChunk> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let task = tokio::spawn(async move { tracker.process_turn(request).await });
            match task.await {
                Ok(response) => {
                    for content in word_chunks(&response.content, STREAM_WORDS_PER_CHUNK) {
                        if tx.send(TurnChunk::Chunk { content }).await.is_err() {
                            debug!("Stream receiver dropped");
                            return;
                        }
                    }
                    let _ = tx.send(TurnChunk::Complete { response }).await;
                }
                Err(e) => {
                    warn!(error = %e, "Turn task failed");
                    let _ = tx
                        .send(TurnChunk::Error {
                            message: STREAM_ERROR.into(),
                        })
                        .await;
                }
            }
        });
        rx
    }

    /// Apply a human expert's resolution to a pending escalation.
    ///
    /// Appends the expert's message, clears the crisis flag and moves the
    /// conversation to `resolved`, which re-enables automated routing.
    pub async fn resolve_escalation(&self, resolution: HumanResolution) -> Result<EscalationRecord, WorkflowError> {
        let expert_message = resolution.expert_message.trim();
        if expert_message.is_empty() {
            return Err(WorkflowError::EmptyExpertMessage);
        }

        let conversation_id = self
            .store
            .get_escalation(&resolution.escalation_id)
            .await?
            .ok_or_else(|| WorkflowError::EscalationNotFound(resolution.escalation_id.clone()))?
            .conversation_id;
        let _guard = self.locks.lock(&conversation_id).await;

        // Re-read under the lock; a concurrent resolution may have won.
        let mut record = self
            .store
            .get_escalation(&resolution.escalation_id)
            .await?
            .ok_or_else(|| WorkflowError::EscalationNotFound(resolution.escalation_id.clone()))?;
        let stored = self.store.load_conversation(&conversation_id).await?;

        if !record.is_pending() {
            // An earlier resolution may have saved the record but not the
            // conversation; finish clearing the hold instead of failing.
            let interrupted = match &stored {
                Some(state) => state.crisis_flag() && self.other_pending(&record).await? == 0,
                None => false,
            };
            let Some(mut state) = stored.filter(|_| interrupted) else {
                return Err(WorkflowError::AlreadyResolved(record.id));
            };
            warn!(
                conversation_id = %conversation_id,
                escalation_id = %record.id,
                "Completing interrupted resolution"
            );
            state.push_message(Message::from_specialist(
                SpecialistId::human_expert(),
                record.resolution_note().unwrap_or(expert_message),
                MessageMetadata::default(),
            ));
            state.resolve_by_human()?;
            self.store.save_conversation(&state).await?;
            return Ok(record);
        }
        record.resolve(resolution.resolved_by.as_str(), expert_message);

        // Conversation first: a failure here leaves the escalation pending and
        // the call can simply be retried.
        match stored {
            Some(mut state) => {
                state.push_message(Message::from_specialist(
                    SpecialistId::human_expert(),
                    expert_message,
                    MessageMetadata::default(),
                ));
                state.resolve_by_human()?;
                self.store.save_conversation(&state).await?;
            }
            None => {
                warn!(conversation_id = %conversation_id, escalation_id = %record.id, "Escalated conversation not in store");
            }
        }
        self.store.update_escalation(&record).await?;

        info!(
            conversation_id = %conversation_id,
            escalation_id = %record.id,
            resolved_by = %resolution.resolved_by,
            "Escalation resolved"
        );
        Ok(record)
    }

    /// Load a conversation.
    pub async fn conversation(&self, id: &ConversationId) -> Result<Option<ConversationState>, WorkflowError> {
        Ok(self.store.load_conversation(id).await?)
    }

    /// Escalations, optionally filtered by status, oldest first.
    pub async fn escalations(&self, status: Option<EscalationStatus>) -> Result<Vec<EscalationRecord>, WorkflowError> {
        Ok(self.store.escalations(status).await?)
    }

    /// Escalations still awaiting a human, oldest first.
    pub async fn pending_escalations(&self) -> Result<Vec<EscalationRecord>, WorkflowError> {
        self.escalations(Some(EscalationStatus::Pending)).await
    }

    /// Drain queued analytics rows.
    pub async fn shutdown(&self) {
        self.analytics.shutdown().await;
    }

    /// Whether a pending escalation holds this conversation. A failed lookup
    /// counts as pending when the conversation state itself is unknown.
    async fn awaiting_human(&self, id: &ConversationId, state_unknown: bool) -> bool {
        match self.store.escalations_for_conversation(id).await {
            Ok(records) => records.iter().any(EscalationRecord::is_pending),
            Err(e) => {
                warn!(conversation_id = %id, error = %e, "Could not check escalations");
                state_unknown
            }
        }
    }

    /// Pending escalations on the same conversation other than `record`.
    async fn other_pending(&self, record: &EscalationRecord) -> Result<usize, WorkflowError> {
        Ok(self
            .store
            .escalations_for_conversation(&record.conversation_id)
            .await?
            .iter()
            .filter(|r| r.is_pending() && r.id != record.id)
            .count())
    }

    /// A turn on a conversation awaiting human review. No service call, no
    /// transition, no new escalation.
    fn held_turn(&self, state: &ConversationState, text: &str, turn: u32) -> TurnResult {
        let classification = classify(&self.router.triggers, text, turn);
        let mut diagnostics = Vec::new();
        if classification.tier == Tier::Crisis {
            diagnostics.push(ErrorKind::CrisisDetected);
        }
        let decision = RoutingDecision {
            matched_triggers: classification.matched,
            tier: classification.tier,
            resulting_stage: Stage::EmergencyHandoff,
            target_specialist: None,
            topics: self.router.topics(text),
            diagnostics,
        };
        info!(conversation_id = %state.conversation_id, turn, "Conversation held for human review");
        TurnResult::from_message(self.crisis.holding_message(), decision, Stage::EmergencyHandoff)
    }

    async fn routed_turn(
        &self,
        state: &mut ConversationState,
        text: &str,
        turn: u32,
        use_specialist_workflow: bool,
    ) -> TurnResult {
        if let Err(e) = state.reset_for_turn() {
            warn!(conversation_id = %state.conversation_id, error = %e, "Could not reset stage");
        }

        let Routed { classification, decision } = self.router.route(text, turn, use_specialist_workflow);
        let stage = decision.resulting_stage;
        debug!(
            conversation_id = %state.conversation_id,
            turn,
            tier = %decision.tier,
            rule = ?classification.rule,
            stage = %stage,
            target = ?decision.target_specialist.as_ref().map(|s| s.as_str()),
            "Routed turn"
        );

        if stage == Stage::EmergencyHandoff {
            let matched: Vec<&str> = decision.matched_triggers.iter().map(String::as_str).collect();
            let reason = format!("crisis indicators: {}", matched.join(", "));
            return self.escalate(state, &reason, decision).await;
        }

        self.advance(state, stage);
        let target = decision
            .target_specialist
            .clone()
            .unwrap_or_else(SpecialistId::general);
        let summary = profile_summary(&state.metadata);

        if stage == Stage::EmpathyFirst {
            return self.empathy_turn(state, target, summary, decision).await;
        }

        let context = if stage == Stage::SupervisorMediated {
            InvocationContext::supervisor(SUPERVISOR_NOTES)
        } else {
            InvocationContext::default()
        }
        .with_profile_summary(summary);
        let outcome = self.adapter.invoke(&target, state.messages(), &context).await;
        self.advance(state, Stage::Resolved);
        TurnResult::from_outcome(outcome, decision, stage)
    }

    /// Empathy response first; then the specialist if the user is ready.
    async fn empathy_turn(
        &self,
        state: &mut ConversationState,
        target: SpecialistId,
        summary: Option<String>,
        decision: RoutingDecision,
    ) -> TurnResult {
        let context = InvocationContext::empathy(EMPATHY_NOTES).with_profile_summary(summary.clone());
        let empathy = self.adapter.invoke(&target, state.messages(), &context).await;

        if empathy.message.metadata.handoff_requested == Some(true) {
            let mut result = self.escalate(state, HANDOFF_REASON, decision).await;
            result.attempts = empathy.attempts;
            return result;
        }

        let ready = !empathy.exhausted
            && empathy
                .message
                .metadata
                .ready_for_specialist
                .unwrap_or(!decision.topics.is_empty() && decision.tier < Tier::High);
        if !ready {
            self.advance(state, Stage::Resolved);
            return TurnResult::from_outcome(empathy, decision, Stage::EmpathyFirst);
        }

        state.push_message(empathy.message.clone());
        self.advance(state, Stage::SpecialistDirect);
        let specialist = self
            .adapter
            .invoke(&target, state.messages(), &InvocationContext::default().with_profile_summary(summary))
            .await;
        self.advance(state, Stage::Resolved);

        let content = format!("{}\n\n{}", empathy.message.content, specialist.message.content);
        let attempts = empathy.attempts + specialist.attempts;
        let fallback_used = empathy.fallback_used || specialist.fallback_used;
        let empathy_error = empathy.error;

        let mut result = TurnResult::from_outcome(specialist, decision, Stage::EmpathyFirst);
        result.content = content;
        result.attempts = attempts;
        result.fallback_used = fallback_used;
        if let Some(kind) = empathy_error {
            note(&mut result.diagnostics, kind);
        }
        result
    }

    async fn escalate(&self, state: &mut ConversationState, reason: &str, decision: RoutingDecision) -> TurnResult {
        let outcome = self.crisis.escalate(state, reason).await;
        let mut result = TurnResult::from_message(outcome.message, decision, Stage::EmergencyHandoff);
        note(&mut result.diagnostics, ErrorKind::CrisisDetected);
        if !outcome.persisted {
            note(&mut result.diagnostics, ErrorKind::PersistenceUnavailable);
        }
        result
    }

    fn advance(&self, state: &mut ConversationState, to: Stage) {
        if let Err(e) = state.advance(to) {
            warn!(conversation_id = %state.conversation_id, error = %e, "Rejected stage transition");
        }
    }
}

fn note(diagnostics: &mut Vec<ErrorKind>, kind: ErrorKind) {
    if !diagnostics.contains(&kind) {
        diagnostics.push(kind);
    }
}

/// Caller-supplied context as a short bullet list for the specialist.
fn profile_summary(metadata: &serde_json::Map<String, serde_json::Value>) -> Option<String> {
    if metadata.is_empty() {
        return None;
    }
    let lines: Vec<String> = metadata
        .iter()
        .map(|(key, value)| match value {
            serde_json::Value::String(s) => format!("- {key}: {s}"),
            other => format!("- {key}: {other}"),
        })
        .collect();
    Some(lines.join("\n"))
}

/// Split text into groups of words, keeping whitespace so the chunks
/// concatenate back to the original.
fn word_chunks(text: &str, words_per_chunk: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut words = 0;
    for word in text.split_inclusive(char::is_whitespace) {
        current.push_str(word);
        words += 1;
        if words == words_per_chunk.max(1) {
            chunks.push(std::mem::take(&mut current));
            words = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
