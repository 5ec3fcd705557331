//! Crisis escalation.
//!
//! Crisis turns never reach the completion service. The user receives a
//! fixed, pre-approved safety message, an immediate-priority escalation is
//! opened for a human, and the conversation is held (crisis flag set) until
//! that human resolves it. Later turns get the fixed holding message.

use std::sync::Arc;

use compass_core::{
    ConversationState, ConversationStore, EscalationRecord, EscalationStatus, Message, MessageMetadata, Priority,
    SpecialistId,
};
use tracing::{error, info, warn};

/// Sent once, on the turn that triggers the escalation.
pub const SAFETY_MESSAGE: &str = "I'm really sorry you're going through this, and I'm glad you told me. \
Your safety matters most right now, so I'm bringing in a member of our support team.\n\n\
If you are in immediate danger, please call 911.\n\
You can call or text 988 to reach the 988 Suicide & Crisis Lifeline, any time, day or night.\n\
You can also text HOME to 741741 to reach the Crisis Text Line.\n\n\
Someone from our team will follow up with you here.";

/// Sent on every turn while the conversation awaits human review.
pub const HOLDING_MESSAGE: &str = "Thank you for your message. A member of our support team has been notified \
and will respond to you here as soon as possible.\n\n\
If you are in immediate danger, please call 911. You can call or text 988 (Suicide & Crisis Lifeline) \
or text HOME to 741741 (Crisis Text Line) at any time.";

/// What the handler did for one crisis turn.
#[derive(Debug, Clone)]
pub struct CrisisOutcome {
    pub message: Message,
    /// The open escalation for this conversation
    pub escalation: EscalationRecord,
    /// False if the escalation could not be written to the store
    pub persisted: bool,
}

/// Opens escalations and produces the fixed crisis messages.
pub struct CrisisHandler {
    store: Arc<dyn ConversationStore>,
}

impl CrisisHandler {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store }
    }

    /// Escalate a conversation: safety message, pending escalation, crisis flag.
    ///
    /// Reuses an escalation that is already pending for the conversation.
    pub async fn escalate(&self, state: &mut ConversationState, reason: &str) -> CrisisOutcome {
        let existing = match self.store.escalations_for_conversation(&state.conversation_id).await {
            Ok(records) => records
                .into_iter()
                .find(|r| r.status() == EscalationStatus::Pending),
            Err(e) => {
                warn!(conversation_id = %state.conversation_id, error = %e, "Could not check existing escalations");
                None
            }
        };

        let (escalation, persisted) = match existing {
            Some(record) => (record, true),
            None => {
                let record = EscalationRecord::open(
                    state.conversation_id.clone(),
                    state.user_id.clone(),
                    reason,
                    Priority::Immediate,
                );
                let persisted = match self.store.create_escalation(&record).await {
                    Ok(()) => true,
                    Err(e) => {
                        error!(
                            conversation_id = %state.conversation_id,
                            escalation_id = %record.id,
                            error = %e,
                            "Failed to persist escalation"
                        );
                        false
                    }
                };
                (record, persisted)
            }
        };

        state.enter_emergency_handoff();

        info!(
            conversation_id = %state.conversation_id,
            escalation_id = %escalation.id,
            reason,
            "Conversation escalated to human review"
        );

        CrisisOutcome {
            message: crisis_message(SAFETY_MESSAGE),
            escalation,
            persisted,
        }
    }

    /// The reply for turns arriving while the conversation is held.
    pub fn holding_message(&self) -> Message {
        crisis_message(HOLDING_MESSAGE)
    }
}

fn crisis_message(text: &str) -> Message {
    Message::from_specialist(SpecialistId::crisis_protocol(), text, MessageMetadata::default())
}
