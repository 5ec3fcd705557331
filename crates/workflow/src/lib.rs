//! # Compass Workflow
//!
//! Conversation-level orchestration on top of routing, specialists, the
//! store and analytics:
//!
//! - [`tracker`]: [`WorkflowTracker`], one turn from message to reply
//! - [`crisis`]: the crisis escalation handler and its fixed messages
//! - [`turn`]: request, response and streaming types
//! - [`locks`]: per-conversation serialization

pub mod crisis;
pub mod locks;
pub mod tracker;
pub mod turn;

pub use crisis::{CrisisHandler, CrisisOutcome, HOLDING_MESSAGE, SAFETY_MESSAGE};
pub use locks::ConversationLocks;
pub use tracker::WorkflowTracker;
pub use turn::{HumanResolution, TurnChunk, TurnRequest, TurnResponse};

use compass_core::{StoreError, TransitionError};

/// Failures of operator actions. Turn processing itself never fails.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Escalation not found: {0}")]
    EscalationNotFound(String),

    #[error("Escalation already resolved: {0}")]
    AlreadyResolved(String),

    #[error("Expert message must not be empty")]
    EmptyExpertMessage,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Transition error: {0}")]
    Transition(#[from] TransitionError),
}
