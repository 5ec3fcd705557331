//! Empathy/crisis classifier.
//!
//! Maps the latest user message to a [`Tier`] with strict precedence:
//!
//! 1. any crisis indicator: `crisis`
//! 2. at least `high_priority_min` high-priority indicators: `high`
//! 3. any strong indicator: `high`
//! 4. a long message with at least one moderate indicator: `high`
//! 5. exactly one moderate indicator: `moderate`
//! 6. otherwise `none`
//!
//! Messages that fall between the rules (a lone high-priority indicator,
//! several moderate indicators) are classified `moderate` and flagged
//! ambiguous, which resolves to the safer of the neighbouring tiers.

use std::collections::BTreeSet;

use compass_core::Tier;
use serde::{Deserialize, Serialize};

use crate::triggers::{TriggerCategory, TriggerTable, normalize};

/// Which precedence rule produced the tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationRule {
    CrisisIndicator,
    HighPriorityCount,
    StrongIndicator,
    LongMessage,
    SingleModerate,
    Unmatched,
}

/// Classifier output for one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub tier: Tier,
    /// Every indicator found, across all categories
    pub matched: BTreeSet<String>,
    pub rule: ClassificationRule,
    /// The message did not fit a rule cleanly and was given the safer tier
    pub ambiguous: bool,
    /// Turn the message arrived on; recorded only
    pub turn_count: u32,
}

impl Classification {
    fn new(tier: Tier, rule: ClassificationRule, matched: BTreeSet<String>, turn_count: u32) -> Self {
        Self {
            tier,
            matched,
            rule,
            ambiguous: false,
            turn_count,
        }
    }
}

/// Classify a message. Pure and deterministic over its inputs.
pub fn classify(table: &TriggerTable, text: &str, turn_count: u32) -> Classification {
    let normalized = normalize(text);
    if normalized.is_empty() {
        return Classification::new(Tier::None, ClassificationRule::Unmatched, BTreeSet::new(), turn_count);
    }

    let crisis = table.matches(TriggerCategory::Crisis, &normalized);
    let high = table.matches(TriggerCategory::HighPriority, &normalized);
    let strong = table.matches(TriggerCategory::Strong, &normalized);
    let moderate = table.matches(TriggerCategory::Moderate, &normalized);

    let matched: BTreeSet<String> = crisis
        .iter()
        .chain(&high)
        .chain(&strong)
        .chain(&moderate)
        .map(|s| s.to_string())
        .collect();

    if !crisis.is_empty() {
        return Classification::new(Tier::Crisis, ClassificationRule::CrisisIndicator, matched, turn_count);
    }
    if high.len() >= table.high_priority_min {
        return Classification::new(Tier::High, ClassificationRule::HighPriorityCount, matched, turn_count);
    }
    if !strong.is_empty() {
        return Classification::new(Tier::High, ClassificationRule::StrongIndicator, matched, turn_count);
    }
    if text.chars().count() > table.long_message_chars && !moderate.is_empty() {
        return Classification::new(Tier::High, ClassificationRule::LongMessage, matched, turn_count);
    }
    if moderate.len() == 1 && high.is_empty() {
        return Classification::new(Tier::Moderate, ClassificationRule::SingleModerate, matched, turn_count);
    }
    if !moderate.is_empty() || !high.is_empty() {
        let mut c = Classification::new(Tier::Moderate, ClassificationRule::SingleModerate, matched, turn_count);
        c.ambiguous = true;
        return c;
    }
    Classification::new(Tier::None, ClassificationRule::Unmatched, matched, turn_count)
}
