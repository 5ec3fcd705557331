//! # Compass Core
//!
//! Domain types, traits, and error definitions for the Compass routing and
//! crisis-escalation engine: the model every other crate implements against.
//!
//! ## Layout
//!
//! - [`message`]: the canonical, immutable conversation message
//! - [`conversation`]: per-conversation state and the stage machine
//! - [`routing`]: tiers, topics, specialist ids and routing decisions
//! - [`escalation`]: durable records of conversations awaiting a human
//! - [`provider`]: the completion-service capability contract
//! - [`store`]: the persistence contract
//!
//! Subsystems are defined as traits here and implemented in their own crates,
//! so tests can swap in stubs and the dependency graph points inward.

pub mod error;
pub mod message;
pub mod conversation;
pub mod routing;
pub mod escalation;
pub mod provider;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ErrorKind, ProviderError, Result, StoreError, TransitionError};
pub use message::{ConversationId, Message, MessageMetadata, Role, UserId};
pub use conversation::{ConversationState, Stage, StateMachine};
pub use routing::{RoutingDecision, SpecialistId, Tier, Topic};
pub use escalation::{EscalationRecord, EscalationStatus, Priority};
pub use provider::{CompletionPayload, CompletionRequest, CompletionResponse, CompletionService, GenerationConfig};
pub use store::{AnalyticsRow, ConversationStore, StoreStats};
