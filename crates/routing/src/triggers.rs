//! Trigger tables: keyword sets mapped to severity categories and domain topics.
//!
//! This is the single rule table behind both the classifier and topic
//! detection. Built-in keywords can be extended from configuration; the
//! thresholds that turn counts into tiers live here too.

use std::collections::BTreeSet;

use compass_config::RoutingConfig;
use compass_core::Topic;
use tracing::warn;

/// Emotional-indicator categories, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerCategory {
    /// Any match means crisis
    Crisis,
    /// Several matches mean high
    HighPriority,
    /// A single match means high
    Strong,
    /// Mild distress
    Moderate,
}

const CRISIS: &[&str] = &[
    "suicide",
    "suicidal",
    "kill myself",
    "end it all",
    "end my life",
    "take my own life",
    "want to die",
    "wanna die",
    "hurt myself",
    "self-harm",
    "self harm",
    "no reason to live",
    "better off dead",
    "don't want to be here anymore",
];

const HIGH_PRIORITY: &[&str] = &[
    "hopeless",
    "desperate",
    "overwhelmed",
    "panic",
    "can't cope",
    "cannot cope",
    "depressed",
    "terrified",
    "lost everything",
    "breaking down",
    "worthless",
    "can't sleep",
    "evicted",
    "homeless",
];

const STRONG: &[&str] = &[
    "can't take it anymore",
    "cannot take it anymore",
    "falling apart",
    "at my breaking point",
    "at the end of my rope",
    "nothing is working",
    "completely lost",
    "giving up on everything",
];

const MODERATE: &[&str] = &[
    "stressed",
    "worried",
    "anxious",
    "frustrated",
    "nervous",
    "struggling",
    "confused",
    "discouraged",
    "stuck",
    "uncertain",
    "scared",
    "upset",
];

const VETERAN: &[&str] = &[
    "veteran",
    "veterans",
    "military",
    "army",
    "navy",
    "air force",
    "marine corps",
    "marines",
    "coast guard",
    "national guard",
    "service member",
    "dd-214",
    "dd214",
    "gi bill",
    "deployed",
];

const INTERNATIONAL: &[&str] = &[
    "international",
    "immigrant",
    "immigrated",
    "visa",
    "h-1b",
    "green card",
    "work permit",
    "foreign degree",
    "foreign credentials",
    "credential evaluation",
    "refugee",
    "asylum",
    "english as a second language",
];

const ENVIRONMENTAL_JUSTICE: &[&str] = &[
    "environmental justice",
    "frontline community",
    "frontline communities",
    "underserved",
    "disadvantaged community",
    "disadvantaged communities",
    "low-income community",
    "pollution",
    "community organizing",
    "equity",
];

const RESUME: &[&str] = &[
    "resume",
    "résumé",
    "cv",
    "cover letter",
    "linkedin",
    "job application",
    "interview",
    "portfolio",
];

const GENERAL: &[&str] = &[
    "career",
    "careers",
    "job",
    "jobs",
    "clean energy",
    "climate",
    "green job",
    "green jobs",
    "solar",
    "wind energy",
    "renewable",
    "sustainability",
    "internship",
    "apprenticeship",
    "salary",
    "hiring",
];

/// Keyword tables plus the thresholds the classifier applies to them.
#[derive(Debug, Clone)]
pub struct TriggerTable {
    crisis: Vec<String>,
    high_priority: Vec<String>,
    strong: Vec<String>,
    moderate: Vec<String>,
    topics: Vec<(Topic, Vec<String>)>,
    /// Characters above which one moderate indicator counts as high
    pub long_message_chars: usize,
    /// High-priority matches needed for the high tier
    pub high_priority_min: usize,
}

fn owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

impl TriggerTable {
    /// The built-in tables with default thresholds (500 chars, 2 matches).
    pub fn with_defaults() -> Self {
        Self {
            crisis: owned(CRISIS),
            high_priority: owned(HIGH_PRIORITY),
            strong: owned(STRONG),
            moderate: owned(MODERATE),
            topics: vec![
                (Topic::Veteran, owned(VETERAN)),
                (Topic::International, owned(INTERNATIONAL)),
                (Topic::EnvironmentalJustice, owned(ENVIRONMENTAL_JUSTICE)),
                (Topic::Resume, owned(RESUME)),
                (Topic::General, owned(GENERAL)),
            ],
            long_message_chars: 500,
            high_priority_min: 2,
        }
    }

    /// Built-in tables extended and tuned by configuration.
    pub fn from_config(config: &RoutingConfig) -> Self {
        let mut table = Self::with_defaults();
        table.long_message_chars = config.long_message_chars;
        table.high_priority_min = config.high_priority_min;
        table.extend(TriggerCategory::Crisis, &config.extra_crisis);
        table.extend(TriggerCategory::HighPriority, &config.extra_high_priority);
        table.extend(TriggerCategory::Strong, &config.extra_strong);
        table.extend(TriggerCategory::Moderate, &config.extra_moderate);
        for (tag, words) in &config.extra_topics {
            match Topic::parse(tag) {
                Some(topic) => table.extend_topic(topic, words),
                None => warn!(tag = %tag, "Ignoring keywords for unknown topic"),
            }
        }
        table
    }

    /// Add keywords to an indicator category.
    pub fn extend(&mut self, category: TriggerCategory, words: &[String]) {
        let list = self.list_mut(category);
        for w in words {
            let w = normalize(w);
            if !w.is_empty() && !list.contains(&w) {
                list.push(w);
            }
        }
    }

    /// Add keywords to a topic.
    pub fn extend_topic(&mut self, topic: Topic, words: &[String]) {
        if let Some((_, list)) = self.topics.iter_mut().find(|(t, _)| *t == topic) {
            for w in words {
                let w = normalize(w);
                if !w.is_empty() && !list.contains(&w) {
                    list.push(w);
                }
            }
        }
    }

    /// Keywords for a category.
    pub fn keywords(&self, category: TriggerCategory) -> &[String] {
        match category {
            TriggerCategory::Crisis => &self.crisis,
            TriggerCategory::HighPriority => &self.high_priority,
            TriggerCategory::Strong => &self.strong,
            TriggerCategory::Moderate => &self.moderate,
        }
    }

    fn list_mut(&mut self, category: TriggerCategory) -> &mut Vec<String> {
        match category {
            TriggerCategory::Crisis => &mut self.crisis,
            TriggerCategory::HighPriority => &mut self.high_priority,
            TriggerCategory::Strong => &mut self.strong,
            TriggerCategory::Moderate => &mut self.moderate,
        }
    }

    /// Indicators of `category` found as substrings of already-normalized text.
    pub fn matches<'a>(&'a self, category: TriggerCategory, normalized: &str) -> Vec<&'a str> {
        self.keywords(category)
            .iter()
            .filter(|k| normalized.contains(k.as_str()))
            .map(String::as_str)
            .collect()
    }

    /// Domain topics mentioned in a message (whole-word matching).
    pub fn match_topics(&self, text: &str) -> BTreeSet<Topic> {
        let normalized = normalize(text);
        self.topics
            .iter()
            .filter(|(_, words)| words.iter().any(|w| contains_phrase(&normalized, w)))
            .map(|(topic, _)| *topic)
            .collect()
    }
}

impl Default for TriggerTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Lowercase, fold typographic apostrophes, collapse whitespace.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_lowercase().replace(['\u{2019}', '\u{2018}'], "'"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// True if `phrase` occurs in `haystack` bounded by non-alphanumerics.
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    haystack.match_indices(phrase).any(|(start, _)| {
        let end = start + phrase.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn normalize_folds_case_and_apostrophes() {
        assert_eq!(normalize("I CAN\u{2019}T   Cope"), "i can't cope");
    }

    #[test]
    fn phrase_matching_respects_word_boundaries() {
        assert!(contains_phrase("update my cv please", "cv"));
        assert!(!contains_phrase("i shop at cvs", "cv"));
        assert!(contains_phrase("army.", "army"));
        assert!(!contains_phrase("swarmy", "army"));
    }

    #[test]
    fn topics_detected_in_veteran_solar_message() {
        let table = TriggerTable::with_defaults();
        let topics = table.match_topics("I'm a veteran interested in solar jobs");
        assert!(topics.contains(&Topic::Veteran));
        assert!(topics.contains(&Topic::General));
        assert!(!topics.contains(&Topic::Resume));
    }

    #[test]
    fn benign_small_talk_has_no_topics() {
        let table = TriggerTable::with_defaults();
        assert!(table.match_topics("Hello there, how are you?").is_empty());
        assert!(table.match_topics("").is_empty());
    }

    #[test]
    fn indicator_matching_is_substring_based() {
        let table = TriggerTable::with_defaults();
        let text = normalize("I panicked and felt hopeless");
        let hits = table.matches(TriggerCategory::HighPriority, &text);
        assert_eq!(hits, vec!["hopeless", "panic"]);
    }

    #[test]
    fn config_extends_tables_and_thresholds() {
        let config = RoutingConfig {
            long_message_chars: 300,
            extra_moderate: vec!["On Edge".into()],
            extra_topics: HashMap::from([
                ("veteran".to_string(), vec!["VA benefits".to_string()]),
                ("astronaut".to_string(), vec!["nasa".to_string()]),
            ]),
            ..RoutingConfig::default()
        };
        let table = TriggerTable::from_config(&config);
        assert_eq!(table.long_message_chars, 300);
        assert!(table.keywords(TriggerCategory::Moderate).contains(&"on edge".to_string()));
        assert!(table.match_topics("what about va benefits?").contains(&Topic::Veteran));
        assert!(table.match_topics("nasa").is_empty());
    }

    #[test]
    fn extend_skips_duplicates() {
        let mut table = TriggerTable::with_defaults();
        let before = table.keywords(TriggerCategory::Crisis).len();
        table.extend(TriggerCategory::Crisis, &["Suicide".into(), "".into()]);
        assert_eq!(table.keywords(TriggerCategory::Crisis).len(), before);
    }
}
