//! Routing vocabulary: severity tiers, domain topics, specialist ids, and the
//! per-turn [`RoutingDecision`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::conversation::Stage;
use crate::error::ErrorKind;

/// Severity tier produced by the empathy/crisis classifier.
///
/// Ordered from least to most severe, so `tier >= Tier::High` reads naturally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    None,
    Moderate,
    High,
    Crisis,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Moderate => write!(f, "moderate"),
            Self::High => write!(f, "high"),
            Self::Crisis => write!(f, "crisis"),
        }
    }
}

/// Domain topic detected in a user message.
///
/// Declaration order is the tie-break priority used by specialist resolution:
/// veteran > international > environmental-justice > resume > general.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    Veteran,
    International,
    EnvironmentalJustice,
    Resume,
    General,
}

impl Topic {
    /// All topics in priority order.
    pub const PRIORITY: [Topic; 5] = [
        Topic::Veteran,
        Topic::International,
        Topic::EnvironmentalJustice,
        Topic::Resume,
        Topic::General,
    ];

    /// The capability tag this topic matches against.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Veteran => "veteran",
            Self::International => "international",
            Self::EnvironmentalJustice => "environmental-justice",
            Self::Resume => "resume",
            Self::General => "general",
        }
    }

    /// Parse a tag or topic name.
    pub fn parse(s: &str) -> Option<Self> {
        Self::PRIORITY
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
    }

    /// Position in the tie-break order (0 is highest priority).
    pub fn rank(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a specialist persona (or of a non-model responder such as
/// the crisis protocol or a human expert).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpecialistId(pub String);

impl SpecialistId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn veteran() -> Self {
        Self::new("veteran")
    }

    pub fn international() -> Self {
        Self::new("international")
    }

    pub fn environmental_justice() -> Self {
        Self::new("environmental-justice")
    }

    pub fn resume() -> Self {
        Self::new("resume")
    }

    pub fn general() -> Self {
        Self::new("general")
    }

    /// Attribution for the fixed safety messages.
    pub fn crisis_protocol() -> Self {
        Self::new("crisis-protocol")
    }

    /// Attribution for messages written by a human reviewer.
    pub fn human_expert() -> Self {
        Self::new("human-expert")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SpecialistId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Topic> for SpecialistId {
    fn from(topic: Topic) -> Self {
        Self::new(topic.as_str())
    }
}

/// The routing outcome for one turn. Immutable once produced; kept for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Emotional indicators that matched the message
    pub matched_triggers: BTreeSet<String>,

    /// Classifier tier
    pub tier: Tier,

    /// Stage the turn is routed to
    pub resulting_stage: Stage,

    /// Specialist that will answer; `None` only for emergency handoff
    pub target_specialist: Option<SpecialistId>,

    /// Domain topics detected in the message
    #[serde(default)]
    pub topics: BTreeSet<Topic>,

    /// Non-fatal conditions noted while deciding
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<ErrorKind>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_are_ordered_by_severity() {
        assert!(Tier::Crisis > Tier::High);
        assert!(Tier::High > Tier::Moderate);
        assert!(Tier::Moderate > Tier::None);
        assert_eq!(Tier::default(), Tier::None);
    }

    #[test]
    fn topic_priority_matches_declaration_order() {
        assert_eq!(Topic::Veteran.rank(), 0);
        assert_eq!(Topic::General.rank(), 4);
        let mut topics = vec![Topic::General, Topic::Resume, Topic::Veteran];
        topics.sort();
        assert_eq!(topics, vec![Topic::Veteran, Topic::Resume, Topic::General]);
    }

    #[test]
    fn topic_parse_accepts_tag_names() {
        assert_eq!(Topic::parse("environmental-justice"), Some(Topic::EnvironmentalJustice));
        assert_eq!(Topic::parse(" Veteran "), Some(Topic::Veteran));
        assert_eq!(Topic::parse("astronaut"), None);
    }

    #[test]
    fn specialist_id_from_topic() {
        assert_eq!(SpecialistId::from(Topic::EnvironmentalJustice), SpecialistId::environmental_justice());
    }
}
