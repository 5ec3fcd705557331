pub mod chat;
pub mod classify;
pub mod escalations;
pub mod onboard;
pub mod specialists;
pub mod status;

use std::sync::Arc;

use async_trait::async_trait;
use compass_analytics::{AnalyticsLogger, AnalyticsSink, FanoutSink, StoreSink, TracingSink};
use compass_config::AppConfig;
use compass_core::{CompletionRequest, CompletionResponse, CompletionService, ProviderError};
use compass_routing::Router;
use compass_specialists::SpecialistAdapter;
use compass_workflow::WorkflowTracker;
use tracing::debug;

/// Load config with a readable error.
pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

/// Wire the tracker from config around a completion service.
pub fn build_tracker(
    config: &AppConfig,
    service: Arc<dyn CompletionService>,
) -> Result<Arc<WorkflowTracker>, Box<dyn std::error::Error>> {
    let router = Arc::new(Router::from_config(config)?);
    let store = compass_store::open(config)?;
    let adapter = Arc::new(SpecialistAdapter::from_config(service, router.registry.clone(), config));

    let analytics = if config.analytics.enabled {
        let mut sinks: Vec<Arc<dyn AnalyticsSink>> = vec![Arc::new(StoreSink::new(store.clone()))];
        if config.analytics.tracing_sink {
            sinks.push(Arc::new(TracingSink));
        }
        AnalyticsLogger::spawn(Arc::new(FanoutSink::new(sinks)), config.analytics.queue_capacity)
    } else {
        AnalyticsLogger::disabled()
    };

    debug!(
        timeout_secs = adapter.timeout().as_secs(),
        store = store.name(),
        specialists = router.registry.list().len(),
        "Workflow tracker ready"
    );
    Ok(Arc::new(WorkflowTracker::new(router, adapter, store, Arc::new(analytics))))
}

/// Stands in for the completion service in operator commands that never
/// route a turn.
pub struct OfflineService;

#[async_trait]
impl CompletionService for OfflineService {
    fn name(&self) -> &str {
        "offline"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        Err(ProviderError::NotConfigured("offline".into()))
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(false)
    }
}
