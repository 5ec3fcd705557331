//! In-memory store, useful for tests and ephemeral sessions.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use compass_core::{
    AnalyticsRow, ConversationId, ConversationState, ConversationStore, EscalationRecord, EscalationStatus,
    StoreError, StoreStats, UserId,
};
use tokio::sync::RwLock;

/// The three record collections. Shared with the file backend, which
/// mirrors them to disk.
#[derive(Debug, Clone, Default)]
pub(crate) struct Tables {
    pub conversations: BTreeMap<ConversationId, ConversationState>,
    pub escalations: Vec<EscalationRecord>,
    pub analytics: Vec<AnalyticsRow>,
}

impl Tables {
    pub fn conversations_for_user(&self, user_id: &UserId) -> Vec<ConversationState> {
        self.conversations
            .values()
            .filter(|c| &c.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn insert_escalation(&mut self, record: &EscalationRecord) {
        match self.escalations.iter_mut().find(|e| e.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => self.escalations.push(record.clone()),
        }
    }

    pub fn update_escalation(&mut self, record: &EscalationRecord) -> Result<(), StoreError> {
        let existing = self
            .escalations
            .iter_mut()
            .find(|e| e.id == record.id)
            .ok_or_else(|| StoreError::NotFound(format!("escalation {}", record.id)))?;
        *existing = record.clone();
        Ok(())
    }

    pub fn escalations(&self, status: Option<EscalationStatus>) -> Vec<EscalationRecord> {
        let mut out: Vec<_> = self
            .escalations
            .iter()
            .filter(|e| status.is_none_or(|s| e.status() == s))
            .cloned()
            .collect();
        out.sort_by_key(|e| e.created_at);
        out
    }

    pub fn escalations_for_conversation(&self, id: &ConversationId) -> Vec<EscalationRecord> {
        let mut out: Vec<_> = self
            .escalations
            .iter()
            .filter(|e| &e.conversation_id == id)
            .cloned()
            .collect();
        out.sort_by_key(|e| e.created_at);
        out
    }

    pub fn analytics_for(&self, id: &ConversationId) -> Vec<AnalyticsRow> {
        self.analytics
            .iter()
            .filter(|r| &r.conversation_id == id)
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> StoreStats {
        let pending = self.escalations.iter().filter(|e| e.is_pending()).count();
        StoreStats {
            conversations: self.conversations.len(),
            pending_escalations: pending,
            resolved_escalations: self.escalations.len() - pending,
            analytics_rows: self.analytics.len(),
        }
    }
}

/// A store that keeps everything in process memory.
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load_conversation(&self, id: &ConversationId) -> Result<Option<ConversationState>, StoreError> {
        Ok(self.tables.read().await.conversations.get(id).cloned())
    }

    async fn save_conversation(&self, state: &ConversationState) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .conversations
            .insert(state.conversation_id.clone(), state.clone());
        Ok(())
    }

    async fn conversations_for_user(&self, user_id: &UserId) -> Result<Vec<ConversationState>, StoreError> {
        Ok(self.tables.read().await.conversations_for_user(user_id))
    }

    async fn create_escalation(&self, record: &EscalationRecord) -> Result<(), StoreError> {
        self.tables.write().await.insert_escalation(record);
        Ok(())
    }

    async fn get_escalation(&self, id: &str) -> Result<Option<EscalationRecord>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .escalations
            .iter()
            .find(|e| e.id == id)
            .cloned())
    }

    async fn update_escalation(&self, record: &EscalationRecord) -> Result<(), StoreError> {
        self.tables.write().await.update_escalation(record)
    }

    async fn escalations(&self, status: Option<EscalationStatus>) -> Result<Vec<EscalationRecord>, StoreError> {
        Ok(self.tables.read().await.escalations(status))
    }

    async fn escalations_for_conversation(&self, id: &ConversationId) -> Result<Vec<EscalationRecord>, StoreError> {
        Ok(self.tables.read().await.escalations_for_conversation(id))
    }

    async fn record_analytics(&self, row: &AnalyticsRow) -> Result<(), StoreError> {
        self.tables.write().await.analytics.push(row.clone());
        Ok(())
    }

    async fn analytics_for(&self, id: &ConversationId) -> Result<Vec<AnalyticsRow>, StoreError> {
        Ok(self.tables.read().await.analytics_for(id))
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        Ok(self.tables.read().await.stats())
    }
}
