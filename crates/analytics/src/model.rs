//! Running totals over recorded turns.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use compass_core::{AnalyticsRow, Tier};
use serde::{Deserialize, Serialize};

/// Aggregate view of every turn recorded since startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    /// Turns accepted into the queue.
    pub turns: u64,
    /// Turns per routing stage.
    pub by_stage: BTreeMap<String, u64>,
    /// Turns per answering specialist.
    pub by_specialist: BTreeMap<String, u64>,
    /// Turns answered by a retry or the fixed fallback message.
    pub fallbacks: u64,
    /// Turns classified as crisis.
    pub crises: u64,
    /// Non-fatal conditions noted, by kind.
    pub diagnostics: BTreeMap<String, u64>,
    /// Records dropped because the queue was full or closed.
    pub dropped: u64,
    /// Mean response latency in milliseconds.
    pub avg_latency_ms: f64,
    /// When the first turn was recorded.
    pub since: Option<DateTime<Utc>>,
}

/// Internal accumulator behind [`AnalyticsSummary`].
#[derive(Debug, Default)]
pub(crate) struct RunningTotals {
    turns: u64,
    by_stage: BTreeMap<String, u64>,
    by_specialist: BTreeMap<String, u64>,
    fallbacks: u64,
    crises: u64,
    diagnostics: BTreeMap<String, u64>,
    dropped: u64,
    total_latency_ms: u64,
    since: Option<DateTime<Utc>>,
}

impl RunningTotals {
    pub fn add(&mut self, row: &AnalyticsRow) {
        self.turns += 1;
        *self
            .by_stage
            .entry(row.decision.resulting_stage.to_string())
            .or_default() += 1;
        if let Some(specialist) = &row.specialist_used {
            *self.by_specialist.entry(specialist.to_string()).or_default() += 1;
        }
        if row.fallback_used {
            self.fallbacks += 1;
        }
        if row.decision.tier == Tier::Crisis {
            self.crises += 1;
        }
        for kind in &row.diagnostics {
            *self.diagnostics.entry(kind.to_string()).or_default() += 1;
        }
        self.total_latency_ms += row.latency_ms;
        self.since.get_or_insert(row.recorded_at);
    }

    pub fn drop_one(&mut self) {
        self.dropped += 1;
    }

    pub fn summary(&self) -> AnalyticsSummary {
        AnalyticsSummary {
            turns: self.turns,
            by_stage: self.by_stage.clone(),
            by_specialist: self.by_specialist.clone(),
            fallbacks: self.fallbacks,
            crises: self.crises,
            diagnostics: self.diagnostics.clone(),
            dropped: self.dropped,
            avg_latency_ms: if self.turns == 0 {
                0.0
            } else {
                self.total_latency_ms as f64 / self.turns as f64
            },
            since: self.since,
        }
    }
}
