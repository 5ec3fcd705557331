//! # Compass Routing
//!
//! Turns a user message into a [`RoutingDecision`](compass_core::RoutingDecision):
//!
//! - [`triggers`]: keyword tables for emotional indicators and domain topics
//! - [`classifier`]: the empathy/crisis tier
//! - [`registry`]: specialist profiles and capability resolution
//! - [`decision`]: the stage decision table
//!
//! Everything here is pure over its inputs. The [`Router`] bundles the
//! read-only pieces so callers build them once and share them.

pub mod classifier;
pub mod decision;
pub mod registry;
pub mod triggers;

pub use classifier::{Classification, ClassificationRule, classify};
pub use decision::{RoutingInput, RoutingPolicy, decide};
pub use registry::{SpecialistProfile, SpecialistRegistry};
pub use triggers::{TriggerCategory, TriggerTable};

use compass_config::AppConfig;
use compass_core::{RoutingDecision, Topic};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Invalid specialist configuration.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Specialist id must not be empty")]
    EmptyId,

    #[error("Specialist '{specialist}' falls back to unknown specialist '{fallback}'")]
    UnknownFallback { specialist: String, fallback: String },
}

/// Trigger table, registry and policy, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct Router {
    pub triggers: TriggerTable,
    pub registry: Arc<SpecialistRegistry>,
    pub policy: RoutingPolicy,
}

/// A routed turn: the classifier output and the decision derived from it.
#[derive(Debug, Clone)]
pub struct Routed {
    pub classification: Classification,
    pub decision: RoutingDecision,
}

impl Router {
    pub fn new(triggers: TriggerTable, registry: SpecialistRegistry, policy: RoutingPolicy) -> Self {
        Self {
            triggers,
            registry: Arc::new(registry),
            policy,
        }
    }

    /// Build from application config.
    pub fn from_config(config: &AppConfig) -> Result<Self, RegistryError> {
        Ok(Self {
            triggers: TriggerTable::from_config(&config.routing),
            registry: Arc::new(SpecialistRegistry::from_config(&config.specialists)?),
            policy: RoutingPolicy::from(&config.routing),
        })
    }

    /// Domain topics in a message.
    pub fn topics(&self, text: &str) -> BTreeSet<Topic> {
        self.triggers.match_topics(text)
    }

    /// Classify and decide in one step.
    pub fn route(&self, text: &str, turn_count: u32, use_specialist_workflow: bool) -> Routed {
        let classification = classify(&self.triggers, text, turn_count);
        let topics = self.topics(text);
        let decision = decide(
            &RoutingInput {
                classification: &classification,
                use_specialist_workflow,
                turn_count,
                topics: &topics,
            },
            &self.policy,
            &self.registry,
        );
        Routed {
            classification,
            decision,
        }
    }
}
