//! Specialist registry and capability resolution.
//!
//! The registry is built once at startup and shared read-only. Resolution is
//! total: a message with no overlapping capability tags resolves to the
//! `general` specialist, which every registry is required to contain.

use std::collections::{BTreeSet, HashMap};

use compass_config::SpecialistConfig;
use compass_core::{SpecialistId, Topic};
use serde::Serialize;
use tracing::debug;

use crate::RegistryError;

const GENERAL_INSTRUCTIONS: &str = "You are a friendly career guide for the clean energy and climate economy. \
Answer the user's question directly, suggest concrete next steps, and keep the tone warm and practical.";

const VETERAN_INSTRUCTIONS: &str = "You are a career specialist for military veterans entering the clean energy \
economy. Translate military experience and occupational specialties into civilian clean energy roles, point to \
veteran hiring programs, and be respectful of service.";

const INTERNATIONAL_INSTRUCTIONS: &str = "You are a career specialist for international professionals and \
immigrants. Help with credential evaluation, work authorization questions at a general level, and pathways into \
clean energy careers. Do not give legal advice.";

const EJ_INSTRUCTIONS: &str = "You are a career specialist for residents of environmental justice and frontline \
communities. Highlight local training programs, community-based organizations, and accessible entry points into \
clean energy work.";

const RESUME_INSTRUCTIONS: &str = "You are a resume and interview coach for clean energy jobs. Give specific, \
actionable feedback on resumes, cover letters, and interview preparation.";

const BRIEF: &str = "You are a helpful clean energy career assistant. Reply briefly and kindly to the user's latest \
message.";

/// A specialist persona. Static after startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpecialistProfile {
    pub id: SpecialistId,
    pub display_name: String,
    pub capability_tags: BTreeSet<String>,
    /// Specialist to retry with when this one fails; `None` only for general
    pub fallback_id: Option<SpecialistId>,
    /// Full system instructions
    pub instructions: String,
    /// Reduced instructions for the retry attempt
    pub brief: String,
}

impl SpecialistProfile {
    fn builtin(id: SpecialistId, name: &str, tags: &[&str], instructions: &str) -> Self {
        let fallback_id = (id != SpecialistId::general()).then(SpecialistId::general);
        Self {
            id,
            display_name: name.to_string(),
            capability_tags: tags.iter().map(|t| t.to_string()).collect(),
            fallback_id,
            instructions: instructions.to_string(),
            brief: BRIEF.to_string(),
        }
    }

    fn overlap(&self, topics: &BTreeSet<Topic>) -> usize {
        topics
            .iter()
            .filter(|t| self.capability_tags.contains(t.as_str()))
            .count()
    }
}

/// Read-only set of specialists with total resolution.
#[derive(Debug, Clone)]
pub struct SpecialistRegistry {
    profiles: Vec<SpecialistProfile>,
    by_id: HashMap<SpecialistId, usize>,
    general: usize,
}

impl SpecialistRegistry {
    /// The five built-in specialists.
    pub fn with_defaults() -> Self {
        let profiles = vec![
            SpecialistProfile::builtin(
                SpecialistId::veteran(),
                "Veterans Specialist",
                &["veteran", "military-skills"],
                VETERAN_INSTRUCTIONS,
            ),
            SpecialistProfile::builtin(
                SpecialistId::international(),
                "International Professionals Specialist",
                &["international", "credentials"],
                INTERNATIONAL_INSTRUCTIONS,
            ),
            SpecialistProfile::builtin(
                SpecialistId::environmental_justice(),
                "Environmental Justice Specialist",
                &["environmental-justice"],
                EJ_INSTRUCTIONS,
            ),
            SpecialistProfile::builtin(
                SpecialistId::resume(),
                "Resume Coach",
                &["resume", "interview"],
                RESUME_INSTRUCTIONS,
            ),
            SpecialistProfile::builtin(
                SpecialistId::general(),
                "Career Guide",
                &["general", "career-exploration"],
                GENERAL_INSTRUCTIONS,
            ),
        ];
        // Built-ins are valid by construction; general is the last entry.
        let by_id = index(&profiles);
        Self {
            general: profiles.len() - 1,
            profiles,
            by_id,
        }
    }

    /// Built-ins with configured entries replacing or adding specialists.
    ///
    /// Entries with an id matching a built-in override only the fields they
    /// set. Every fallback must name a registered specialist.
    pub fn from_config(entries: &[SpecialistConfig]) -> Result<Self, RegistryError> {
        let mut registry = Self::with_defaults();
        if entries.is_empty() {
            return Ok(registry);
        }

        for entry in entries {
            let id = SpecialistId::new(entry.id.trim());
            if id.as_str().is_empty() {
                return Err(RegistryError::EmptyId);
            }
            let existing = registry.by_id.get(&id).copied();
            let profile = match existing {
                Some(i) => &mut registry.profiles[i],
                None => {
                    registry.profiles.push(SpecialistProfile {
                        id: id.clone(),
                        display_name: id.to_string(),
                        capability_tags: BTreeSet::new(),
                        fallback_id: Some(SpecialistId::general()),
                        instructions: GENERAL_INSTRUCTIONS.to_string(),
                        brief: BRIEF.to_string(),
                    });
                    let i = registry.profiles.len() - 1;
                    registry.by_id.insert(id.clone(), i);
                    &mut registry.profiles[i]
                }
            };
            if !entry.capability_tags.is_empty() {
                profile.capability_tags = entry
                    .capability_tags
                    .iter()
                    .map(|t| t.trim().to_lowercase())
                    .collect();
            }
            if let Some(fallback) = &entry.fallback_id {
                profile.fallback_id = Some(SpecialistId::new(fallback.trim()));
            }
            if let Some(name) = &entry.display_name {
                profile.display_name = name.clone();
            }
            if let Some(instructions) = &entry.instructions {
                profile.instructions = instructions.clone();
            }
            if let Some(brief) = &entry.brief {
                profile.brief = brief.clone();
            }
            debug!(specialist = %id, "Applied specialist override");
        }

        let general = SpecialistId::general();
        for p in &mut registry.profiles {
            if p.id == general {
                p.fallback_id = None;
                continue;
            }
            if let Some(fallback) = &p.fallback_id
                && !registry.by_id.contains_key(fallback)
            {
                return Err(RegistryError::UnknownFallback {
                    specialist: p.id.to_string(),
                    fallback: fallback.to_string(),
                });
            }
        }

        Ok(registry)
    }

    /// Look up a specialist by id.
    pub fn get(&self, id: &SpecialistId) -> Option<&SpecialistProfile> {
        self.by_id.get(id).map(|&i| &self.profiles[i])
    }

    /// The catch-all specialist.
    pub fn general(&self) -> &SpecialistProfile {
        &self.profiles[self.general]
    }

    /// The profile to retry with after `id` fails. Unknown ids and general
    /// itself fall back to general.
    pub fn fallback_for(&self, id: &SpecialistId) -> &SpecialistProfile {
        self.get(id)
            .and_then(|p| p.fallback_id.as_ref())
            .and_then(|f| self.get(f))
            .unwrap_or_else(|| self.general())
    }

    /// Best specialist for a set of topics, with its overlap score.
    ///
    /// Highest overlap wins; ties go to the built-in priority order
    /// (veteran, international, environmental-justice, resume, general),
    /// then to registration order for custom specialists.
    pub fn resolve_scored(&self, topics: &BTreeSet<Topic>) -> (&SpecialistProfile, usize) {
        let best = self
            .profiles
            .iter()
            .enumerate()
            .map(|(i, p)| (p, p.overlap(topics), self.priority(i)))
            .filter(|(_, score, _)| *score > 0)
            .max_by(|a, b| a.1.cmp(&b.1).then(b.2.cmp(&a.2)));

        match best {
            Some((profile, score, _)) => (profile, score),
            None => (self.general(), 0),
        }
    }

    /// Best specialist id for a set of topics. Never fails.
    pub fn resolve(&self, topics: &BTreeSet<Topic>) -> SpecialistId {
        self.resolve_scored(topics).0.id.clone()
    }

    /// All specialists in registration order.
    pub fn list(&self) -> &[SpecialistProfile] {
        &self.profiles
    }

    fn priority(&self, index: usize) -> usize {
        let id = &self.profiles[index].id;
        Topic::PRIORITY
            .iter()
            .position(|t| id.as_str() == t.as_str())
            .unwrap_or(Topic::PRIORITY.len() + index)
    }
}

impl Default for SpecialistRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn index(profiles: &[SpecialistProfile]) -> HashMap<SpecialistId, usize> {
    profiles
        .iter()
        .enumerate()
        .map(|(i, p)| (p.id.clone(), i))
        .collect()
}
