//! Asynchronous, best-effort analytics for Compass.
//!
//! Every processed turn produces an [`AnalyticsRow`](compass_core::AnalyticsRow).
//! Rows go through a bounded queue to a single background worker, so the
//! response path never waits on analytics. Running totals are kept for
//! operators.

pub mod logger;
pub mod model;
pub mod sink;

pub use logger::AnalyticsLogger;
pub use model::AnalyticsSummary;
pub use sink::{AnalyticsSink, FanoutSink, StoreSink, TracingSink};

use compass_core::StoreError;

/// Errors from analytics sinks. Logged by the worker, never surfaced to callers.
#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error("sink error: {0}")]
    Sink(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
