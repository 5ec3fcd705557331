//! Routing decision engine.
//!
//! Decision table, first match wins:
//!
//! | condition                               | stage                 |
//! |-----------------------------------------|-----------------------|
//! | tier is crisis                          | `emergency_handoff`   |
//! | specialist workflow requested, or high  | `empathy_first`       |
//! | a domain topic matched                  | `specialist_direct`   |
//! | turn count above the threshold          | `supervisor_mediated` |
//! | otherwise                               | `simple_response`     |

use std::collections::BTreeSet;

use compass_config::RoutingConfig;
use compass_core::{ErrorKind, RoutingDecision, Stage, Tier, Topic};

use crate::classifier::Classification;
use crate::registry::SpecialistRegistry;

/// Tunable thresholds for the decision table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingPolicy {
    /// Turns after which a conversation goes to the supervisor
    pub multi_turn_threshold: u32,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self { multi_turn_threshold: 2 }
    }
}

impl From<&RoutingConfig> for RoutingPolicy {
    fn from(config: &RoutingConfig) -> Self {
        Self {
            multi_turn_threshold: config.multi_turn_threshold,
        }
    }
}

/// Everything the engine looks at for one turn.
#[derive(Debug, Clone)]
pub struct RoutingInput<'a> {
    pub classification: &'a Classification,
    pub use_specialist_workflow: bool,
    pub turn_count: u32,
    pub topics: &'a BTreeSet<Topic>,
}

/// Produce the routing decision for a turn.
pub fn decide(input: &RoutingInput<'_>, policy: &RoutingPolicy, registry: &SpecialistRegistry) -> RoutingDecision {
    let tier = input.classification.tier;
    let mut diagnostics = Vec::new();
    if input.classification.ambiguous {
        diagnostics.push(ErrorKind::ClassificationAmbiguous);
    }

    let stage = if tier == Tier::Crisis {
        Stage::EmergencyHandoff
    } else if input.use_specialist_workflow || tier == Tier::High {
        Stage::EmpathyFirst
    } else if !input.topics.is_empty() {
        Stage::SpecialistDirect
    } else if input.turn_count > policy.multi_turn_threshold {
        Stage::SupervisorMediated
    } else {
        Stage::SimpleResponse
    };

    let target_specialist = if stage == Stage::EmergencyHandoff {
        diagnostics.push(ErrorKind::CrisisDetected);
        None
    } else {
        let (profile, score) = registry.resolve_scored(input.topics);
        if score == 0 {
            diagnostics.push(ErrorKind::SpecialistUnresolved);
        }
        Some(profile.id.clone())
    };

    RoutingDecision {
        matched_triggers: input.classification.matched.clone(),
        tier,
        resulting_stage: stage,
        target_specialist,
        topics: input.topics.clone(),
        diagnostics,
    }
}
