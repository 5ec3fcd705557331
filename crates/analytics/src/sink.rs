//! Destinations for analytics rows.

use std::sync::Arc;

use async_trait::async_trait;
use compass_core::{AnalyticsRow, ConversationStore};
use tracing::info;

use crate::AnalyticsError;

/// Where the background worker writes rows.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    fn name(&self) -> &str;

    async fn write(&self, row: &AnalyticsRow) -> Result<(), AnalyticsError>;
}

/// Writes rows to the conversation store.
pub struct StoreSink {
    store: Arc<dyn ConversationStore>,
}

impl StoreSink {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AnalyticsSink for StoreSink {
    fn name(&self) -> &str {
        "store"
    }

    async fn write(&self, row: &AnalyticsRow) -> Result<(), AnalyticsError> {
        self.store.record_analytics(row).await?;
        Ok(())
    }
}

/// Emits each row as a structured `tracing` event on the `compass::analytics` target.
pub struct TracingSink;

#[async_trait]
impl AnalyticsSink for TracingSink {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn write(&self, row: &AnalyticsRow) -> Result<(), AnalyticsError> {
        let json = serde_json::to_string(row)?;
        info!(
            target: "compass::analytics",
            conversation_id = %row.conversation_id,
            turn = row.turn,
            stage = %row.decision.resulting_stage,
            tier = %row.decision.tier,
            latency_ms = row.latency_ms,
            row = %json,
            "Turn recorded"
        );
        Ok(())
    }
}

/// Writes to several sinks in order. A failing sink does not stop the rest;
/// the first error is returned.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn AnalyticsSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn AnalyticsSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl AnalyticsSink for FanoutSink {
    fn name(&self) -> &str {
        "fanout"
    }

    async fn write(&self, row: &AnalyticsRow) -> Result<(), AnalyticsError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.write(row).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
