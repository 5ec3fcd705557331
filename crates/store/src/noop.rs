//! No-op store: persistence disabled.

use async_trait::async_trait;
use compass_core::{
    AnalyticsRow, ConversationId, ConversationState, ConversationStore, EscalationRecord, EscalationStatus,
    StoreError, StoreStats, UserId,
};

/// A store that keeps nothing. Every conversation starts fresh each turn.
pub struct NoopStore;

#[async_trait]
impl ConversationStore for NoopStore {
    fn name(&self) -> &str {
        "none"
    }

    async fn load_conversation(&self, _id: &ConversationId) -> Result<Option<ConversationState>, StoreError> {
        Ok(None)
    }

    async fn save_conversation(&self, _state: &ConversationState) -> Result<(), StoreError> {
        Ok(())
    }

    async fn conversations_for_user(&self, _user_id: &UserId) -> Result<Vec<ConversationState>, StoreError> {
        Ok(Vec::new())
    }

    async fn create_escalation(&self, _record: &EscalationRecord) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get_escalation(&self, _id: &str) -> Result<Option<EscalationRecord>, StoreError> {
        Ok(None)
    }

    async fn update_escalation(&self, record: &EscalationRecord) -> Result<(), StoreError> {
        Err(StoreError::NotFound(format!("escalation {}", record.id)))
    }

    async fn escalations(&self, _status: Option<EscalationStatus>) -> Result<Vec<EscalationRecord>, StoreError> {
        Ok(Vec::new())
    }

    async fn escalations_for_conversation(&self, _id: &ConversationId) -> Result<Vec<EscalationRecord>, StoreError> {
        Ok(Vec::new())
    }

    async fn record_analytics(&self, _row: &AnalyticsRow) -> Result<(), StoreError> {
        Ok(())
    }

    async fn analytics_for(&self, _id: &ConversationId) -> Result<Vec<AnalyticsRow>, StoreError> {
        Ok(Vec::new())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        Ok(StoreStats::default())
    }
}
