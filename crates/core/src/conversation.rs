//! Per-conversation state and the routing stage machine.
//!
//! [`ConversationState`] is the explicit context object threaded through a
//! turn. Its `stage` and `crisis_flag` are private: they change only through
//! the validated methods below, which the workflow tracker drives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::TransitionError;
use crate::message::{ConversationId, Message, Role, UserId};
use crate::routing::SpecialistId;

/// Trait for status enums that represent state machines.
///
/// Implementors define valid transitions and get a validated
/// `transition_to` and `is_terminal` for free.
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    /// Returns true if the transition from `self` to `target` is valid.
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Returns all valid target states from the current state.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Performs the transition with validation.
    fn transition_to(&self, target: Self) -> Result<Self, TransitionError>;

    /// Checks if the current state has no outgoing automated transitions.
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}

/// Position of a conversation turn within the routing state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Initial,
    EmpathyFirst,
    SpecialistDirect,
    SupervisorMediated,
    SimpleResponse,
    EmergencyHandoff,
    Resolved,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::EmpathyFirst => "empathy_first",
            Self::SpecialistDirect => "specialist_direct",
            Self::SupervisorMediated => "supervisor_mediated",
            Self::SimpleResponse => "simple_response",
            Self::EmergencyHandoff => "emergency_handoff",
            Self::Resolved => "resolved",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StateMachine for Stage {
    fn can_transition_to(&self, target: &Self) -> bool {
        use Stage::*;
        matches!(
            (self, target),
            (Initial, EmpathyFirst)
                | (Initial, SpecialistDirect)
                | (Initial, SupervisorMediated)
                | (Initial, SimpleResponse)
                | (Initial, EmergencyHandoff)
                | (EmpathyFirst, SpecialistDirect)
                | (EmpathyFirst, EmergencyHandoff)
                | (EmpathyFirst, Resolved)
                | (SpecialistDirect, Resolved)
                | (SupervisorMediated, Resolved)
                | (SimpleResponse, Resolved)
                | (Resolved, Initial)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use Stage::*;
        match self {
            Initial => vec![
                EmpathyFirst,
                SpecialistDirect,
                SupervisorMediated,
                SimpleResponse,
                EmergencyHandoff,
            ],
            EmpathyFirst => vec![SpecialistDirect, EmergencyHandoff, Resolved],
            SpecialistDirect | SupervisorMediated | SimpleResponse => vec![Resolved],
            // Leaving a handoff is a human action, not an automated transition.
            EmergencyHandoff => vec![],
            Resolved => vec![Initial],
        }
    }

    fn transition_to(&self, target: Self) -> Result<Self, TransitionError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(TransitionError::Invalid {
                from: *self,
                to: target,
            })
        }
    }
}

/// Workflow state of one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub conversation_id: ConversationId,

    pub user_id: UserId,

    turn_count: u32,

    stage: Stage,

    crisis_flag: bool,

    /// Specialist that answered the most recent automated turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_specialist: Option<SpecialistId>,

    /// Free-form conversation metadata (client context, profile hints)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    #[serde(default)]
    messages: Vec<Message>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    /// Create a fresh conversation in the `initial` stage.
    pub fn new(conversation_id: ConversationId, user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            conversation_id,
            user_id,
            turn_count: 0,
            stage: Stage::Initial,
            crisis_flag: false,
            last_specialist: None,
            metadata: serde_json::Map::new(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn crisis_flag(&self) -> bool {
        self.crisis_flag
    }

    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The most recent user message, if any.
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }

    /// Record an incoming user message and count the turn.
    ///
    /// Returns the new turn count. Turns are counted even while the
    /// conversation is held for human review.
    pub fn push_user_message(&mut self, message: Message) -> u32 {
        self.turn_count += 1;
        self.push_message(message);
        self.turn_count
    }

    /// Append a message produced during the turn.
    pub fn push_message(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// Return the stage to `initial` for a new user message.
    ///
    /// Fails with [`TransitionError::HumanReviewRequired`] while the crisis
    /// flag is set.
    pub fn reset_for_turn(&mut self) -> Result<(), TransitionError> {
        if self.crisis_flag {
            return Err(TransitionError::HumanReviewRequired);
        }
        match self.stage {
            Stage::Initial => {}
            Stage::Resolved => self.stage = self.stage.transition_to(Stage::Initial)?,
            interrupted => {
                warn!(
                    conversation_id = %self.conversation_id,
                    stage = %interrupted,
                    "Previous turn did not reach a resting stage, resetting"
                );
                self.stage = Stage::Initial;
            }
        }
        Ok(())
    }

    /// Perform a validated automated stage transition.
    pub fn advance(&mut self, to: Stage) -> Result<(), TransitionError> {
        if self.crisis_flag {
            return Err(TransitionError::HumanReviewRequired);
        }
        self.stage = self.stage.transition_to(to)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Enter `emergency_handoff` and set the sticky crisis flag.
    ///
    /// Always succeeds: from a stage with no automated edge to handoff the
    /// stage is forced and a warning logged. Idempotent when the
    /// conversation is already in handoff.
    pub fn enter_emergency_handoff(&mut self) {
        self.crisis_flag = true;
        if self.stage != Stage::EmergencyHandoff {
            if !self.stage.can_transition_to(&Stage::EmergencyHandoff) {
                warn!(
                    conversation_id = %self.conversation_id,
                    stage = %self.stage,
                    "Forcing emergency handoff"
                );
            }
            self.stage = Stage::EmergencyHandoff;
        }
        self.updated_at = Utc::now();
    }

    /// Apply an external human resolution: clear the crisis flag and move
    /// `emergency_handoff` to `resolved`.
    pub fn resolve_by_human(&mut self) -> Result<(), TransitionError> {
        if self.stage != Stage::EmergencyHandoff && !self.crisis_flag {
            return Err(TransitionError::Invalid {
                from: self.stage,
                to: Stage::Resolved,
            });
        }
        self.crisis_flag = false;
        self.stage = Stage::Resolved;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ConversationState {
        ConversationState::new(ConversationId::from("c1"), UserId::from("u1"))
    }

    const ALL: [Stage; 7] = [
        Stage::Initial,
        Stage::EmpathyFirst,
        Stage::SpecialistDirect,
        Stage::SupervisorMediated,
        Stage::SimpleResponse,
        Stage::EmergencyHandoff,
        Stage::Resolved,
    ];

    #[test]
    fn can_transition_to_is_consistent_with_valid_transitions() {
        for from in ALL {
            for to in ALL {
                assert_eq!(
                    from.can_transition_to(&to),
                    from.valid_transitions().contains(&to),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn emergency_handoff_is_terminal_for_automation() {
        assert!(Stage::EmergencyHandoff.is_terminal());
        assert!(Stage::EmergencyHandoff.transition_to(Stage::Resolved).is_err());
        assert!(!Stage::Resolved.is_terminal());
    }

    #[test]
    fn empathy_first_exits() {
        assert_eq!(
            Stage::EmpathyFirst.valid_transitions(),
            vec![Stage::SpecialistDirect, Stage::EmergencyHandoff, Stage::Resolved]
        );
    }

    #[test]
    fn turn_cycle_returns_to_initial() {
        let mut s = state();
        s.push_user_message(Message::user("hello"));
        s.reset_for_turn().unwrap();
        s.advance(Stage::SimpleResponse).unwrap();
        s.advance(Stage::Resolved).unwrap();

        s.push_user_message(Message::user("again"));
        s.reset_for_turn().unwrap();
        assert_eq!(s.stage(), Stage::Initial);
        assert_eq!(s.turn_count(), 2);
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let mut s = state();
        let err = s.advance(Stage::Resolved).unwrap_err();
        assert_eq!(
            err,
            TransitionError::Invalid {
                from: Stage::Initial,
                to: Stage::Resolved
            }
        );
        assert_eq!(s.stage(), Stage::Initial);
    }

    #[test]
    fn crisis_flag_is_sticky_until_human_resolution() {
        let mut s = state();
        s.push_user_message(Message::user("help"));
        s.enter_emergency_handoff();
        assert!(s.crisis_flag());

        s.push_user_message(Message::user("are you there?"));
        assert_eq!(s.reset_for_turn(), Err(TransitionError::HumanReviewRequired));
        assert_eq!(s.advance(Stage::SimpleResponse), Err(TransitionError::HumanReviewRequired));
        assert!(s.crisis_flag());
        assert_eq!(s.stage(), Stage::EmergencyHandoff);

        s.resolve_by_human().unwrap();
        assert!(!s.crisis_flag());
        assert_eq!(s.stage(), Stage::Resolved);
        s.reset_for_turn().unwrap();
        assert_eq!(s.stage(), Stage::Initial);
    }

    #[test]
    fn human_resolution_requires_handoff() {
        let mut s = state();
        assert!(s.resolve_by_human().is_err());
    }

    #[test]
    fn empathy_can_escalate_to_handoff() {
        let mut s = state();
        s.advance(Stage::EmpathyFirst).unwrap();
        s.enter_emergency_handoff();
        assert_eq!(s.stage(), Stage::EmergencyHandoff);
    }

    #[test]
    fn handoff_is_forced_from_any_stage() {
        let mut s = state();
        s.advance(Stage::SimpleResponse).unwrap();
        assert!(!s.stage().can_transition_to(&Stage::EmergencyHandoff));

        s.enter_emergency_handoff();
        assert!(s.crisis_flag());
        assert_eq!(s.stage(), Stage::EmergencyHandoff);

        s.enter_emergency_handoff();
        assert!(s.crisis_flag());
        assert_eq!(s.stage(), Stage::EmergencyHandoff);
    }

    #[test]
    fn interrupted_turn_is_reset() {
        let mut s = state();
        s.advance(Stage::SpecialistDirect).unwrap();
        s.reset_for_turn().unwrap();
        assert_eq!(s.stage(), Stage::Initial);
    }

    #[test]
    fn state_serialization_keeps_private_fields() {
        let mut s = state();
        s.push_user_message(Message::user("hi"));
        s.enter_emergency_handoff();
        let json = serde_json::to_string(&s).unwrap();
        let back: ConversationState = serde_json::from_str(&json).unwrap();
        assert!(back.crisis_flag());
        assert_eq!(back.stage(), Stage::EmergencyHandoff);
        assert_eq!(back.messages().len(), 1);
    }
}
