//! The analytics logger: a bounded queue drained by one background task.
//!
//! [`AnalyticsLogger::record`] never blocks and never fails the caller. When
//! the queue is full or the worker has stopped, the row is dropped with a
//! warning (at-most-once delivery). Sink errors are logged and swallowed.

use std::sync::{Arc, Mutex, RwLock};

use compass_core::AnalyticsRow;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::model::{AnalyticsSummary, RunningTotals};
use crate::sink::AnalyticsSink;

/// Fire-and-forget analytics recorder.
pub struct AnalyticsLogger {
    tx: Mutex<Option<mpsc::Sender<AnalyticsRow>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    totals: RwLock<RunningTotals>,
}

impl AnalyticsLogger {
    /// Start the background worker. Must be called inside a Tokio runtime.
    pub fn spawn(sink: Arc<dyn AnalyticsSink>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<AnalyticsRow>(capacity.max(1));
        let worker = tokio::spawn(async move {
            while let Some(row) = rx.recv().await {
                if let Err(e) = sink.write(&row).await {
                    warn!(sink = sink.name(), conversation_id = %row.conversation_id, error = %e, "Analytics sink failed");
                }
            }
            debug!(sink = sink.name(), "Analytics worker stopped");
        });
        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            totals: RwLock::new(RunningTotals::default()),
        }
    }

    /// A logger that records nothing.
    pub fn disabled() -> Self {
        Self {
            tx: Mutex::new(None),
            worker: Mutex::new(None),
            totals: RwLock::new(RunningTotals::default()),
        }
    }

    /// Queue a row. Returns `false` if it was dropped.
    pub fn record(&self, row: AnalyticsRow) -> bool {
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = guard.as_ref() else {
            return false;
        };
        let mut totals = self.totals.write().unwrap_or_else(|e| e.into_inner());
        match tx.try_reserve() {
            Ok(permit) => {
                totals.add(&row);
                permit.send(row);
                true
            }
            Err(TrySendError::Full(())) => {
                totals.drop_one();
                warn!(conversation_id = %row.conversation_id, "Analytics queue full, dropping record");
                false
            }
            Err(TrySendError::Closed(())) => {
                totals.drop_one();
                warn!(conversation_id = %row.conversation_id, "Analytics worker gone, dropping record");
                false
            }
        }
    }

    /// Running totals over accepted rows.
    pub fn summary(&self) -> AnalyticsSummary {
        self.totals.read().unwrap_or_else(|e| e.into_inner()).summary()
    }

    /// Close the queue and wait for the worker to drain it.
    pub async fn shutdown(&self) {
        drop(self.tx.lock().unwrap_or_else(|e| e.into_inner()).take());
        let worker = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(worker) = worker
            && let Err(e) = worker.await
        {
            warn!(error = %e, "Analytics worker panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AnalyticsError;
    use crate::sink::{FanoutSink, StoreSink, TracingSink};
    use async_trait::async_trait;
    use compass_core::{ConversationId, ConversationStore, RoutingDecision, Stage, Tier, UserId};
    use compass_store::InMemoryStore;
    use tokio::sync::Notify;

    fn row(turn: u32) -> AnalyticsRow {
        let decision = RoutingDecision {
            matched_triggers: Default::default(),
            tier: Tier::None,
            resulting_stage: Stage::SimpleResponse,
            target_specialist: None,
            topics: Default::default(),
            diagnostics: vec![],
        };
        AnalyticsRow::new(ConversationId::from("c1"), UserId::from("u1"), turn, decision, Stage::Resolved)
    }

    struct FailingSink;

    #[async_trait]
    impl AnalyticsSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        async fn write(&self, _row: &AnalyticsRow) -> Result<(), AnalyticsError> {
            Err(AnalyticsError::Sink("disk full".into()))
        }
    }

    /// Signals when it picks up a row, then never finishes writing it.
    struct StuckSink {
        picked_up: Arc<Notify>,
    }

    #[async_trait]
    impl AnalyticsSink for StuckSink {
        fn name(&self) -> &str {
            "stuck"
        }

        async fn write(&self, _row: &AnalyticsRow) -> Result<(), AnalyticsError> {
            self.picked_up.notify_one();
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn rows_reach_the_store() {
        let store = Arc::new(InMemoryStore::new());
        let logger = AnalyticsLogger::spawn(Arc::new(StoreSink::new(store.clone())), 16);

        assert!(logger.record(row(1)));
        assert!(logger.record(row(2)));
        logger.shutdown().await;

        let rows = store.analytics_for(&ConversationId::from("c1")).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(logger.summary().turns, 2);
    }

    #[tokio::test]
    async fn sink_failures_are_swallowed() {
        let logger = AnalyticsLogger::spawn(Arc::new(FailingSink), 4);
        assert!(logger.record(row(1)));
        logger.shutdown().await;
        assert_eq!(logger.summary().turns, 1);
    }

    #[tokio::test]
    async fn full_queue_drops_records() {
        let picked_up = Arc::new(Notify::new());
        let logger = AnalyticsLogger::spawn(
            Arc::new(StuckSink {
                picked_up: picked_up.clone(),
            }),
            1,
        );

        // First row is held by the sink, second fills the queue.
        assert!(logger.record(row(1)));
        picked_up.notified().await;
        assert!(logger.record(row(2)));
        assert!(!logger.record(row(3)));

        let summary = logger.summary();
        assert_eq!(summary.turns, 2);
        assert_eq!(summary.dropped, 1);
    }

    #[tokio::test]
    async fn record_after_shutdown_is_dropped() {
        let logger = AnalyticsLogger::spawn(Arc::new(TracingSink), 4);
        logger.shutdown().await;
        assert!(!logger.record(row(1)));
    }

    #[tokio::test]
    async fn fanout_writes_every_sink_despite_failures() {
        let store = Arc::new(InMemoryStore::new());
        let sink = FanoutSink::new(vec![
            Arc::new(FailingSink),
            Arc::new(StoreSink::new(store.clone())),
        ]);
        assert!(sink.write(&row(1)).await.is_err());
        assert_eq!(store.stats().await.unwrap().analytics_rows, 1);
    }

    #[test]
    fn disabled_logger_records_nothing() {
        let logger = AnalyticsLogger::disabled();
        assert!(!logger.record(row(1)));
        assert_eq!(logger.summary().turns, 0);
    }
}
