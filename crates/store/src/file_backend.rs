//! File-based store: JSON documents in a data directory.
//!
//! Layout under the data directory:
//!
//! - `conversations.json`: every conversation, keyed by id
//! - `escalations.json`: every escalation record
//! - `analytics.jsonl`: one analytics row per line, append-only
//!
//! Records are loaded into memory on creation and the affected file is
//! flushed on every mutation.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use compass_core::{
    AnalyticsRow, ConversationId, ConversationState, ConversationStore, EscalationRecord, EscalationStatus,
    StoreError, StoreStats, UserId,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::in_memory::Tables;

const CONVERSATIONS: &str = "conversations.json";
const ESCALATIONS: &str = "escalations.json";
const ANALYTICS: &str = "analytics.jsonl";

/// A store persisted as JSON files in one directory.
pub struct FileStore {
    dir: PathBuf,
    tables: Arc<RwLock<Tables>>,
}

impl FileStore {
    /// Open (or lazily create) a store in `dir`.
    ///
    /// Missing files start empty. Corrupted records are skipped, and a
    /// damaged file is copied to `<name>.corrupt` before the next write
    /// can replace it.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let tables = Tables {
            conversations: load_records::<ConversationState>(&dir.join(CONVERSATIONS))
                .into_iter()
                .map(|state| (state.conversation_id.clone(), state))
                .collect::<BTreeMap<_, _>>(),
            escalations: load_records(&dir.join(ESCALATIONS)),
            analytics: load_jsonl(&dir.join(ANALYTICS)),
        };
        debug!(
            dir = %dir.display(),
            conversations = tables.conversations.len(),
            escalations = tables.escalations.len(),
            "File store loaded"
        );
        Self {
            dir,
            tables: Arc::new(RwLock::new(tables)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| StoreError::Unavailable(format!("Failed to create data directory: {e}")))
    }

    fn write_json<T: Serialize>(&self, file: &str, value: &T) -> Result<(), StoreError> {
        self.ensure_dir()?;
        let body = serde_json::to_string_pretty(value)
            .map_err(|e| StoreError::Storage(format!("Failed to serialize {file}: {e}")))?;
        // Atomic replace.
        let path = self.dir.join(file);
        let tmp = self.dir.join(format!("{file}.tmp"));
        std::fs::write(&tmp, body)
            .and_then(|_| std::fs::rename(&tmp, &path))
            .map_err(|e| StoreError::Unavailable(format!("Failed to write {file}: {e}")))
    }

    fn append_line<T: Serialize>(&self, file: &str, value: &T) -> Result<(), StoreError> {
        self.ensure_dir()?;
        let line = serde_json::to_string(value)
            .map_err(|e| StoreError::Storage(format!("Failed to serialize {file} row: {e}")))?;
        let mut handle = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(file))
            .map_err(|e| StoreError::Unavailable(format!("Failed to open {file}: {e}")))?;
        writeln!(handle, "{line}").map_err(|e| StoreError::Unavailable(format!("Failed to append to {file}: {e}")))
    }
}

/// Records from a JSON object (values) or array document.
fn load_records<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    if content.trim().is_empty() {
        return Vec::new();
    }
    let items: Vec<serde_json::Value> = match serde_json::from_str(&content) {
        Ok(serde_json::Value::Object(map)) => map.into_iter().map(|(_, value)| value).collect(),
        Ok(serde_json::Value::Array(items)) => items,
        Ok(_) => {
            warn!(path = %path.display(), "Store file is not an object or array");
            keep_damaged(path);
            return Vec::new();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring corrupted store file");
            keep_damaged(path);
            return Vec::new();
        }
    };

    let mut damaged = false;
    let records: Vec<T> = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping corrupted record");
                damaged = true;
                None
            }
        })
        .collect();
    if damaged {
        keep_damaged(path);
    }
    records
}

fn keep_damaged(path: &Path) {
    let mut aside = path.as_os_str().to_owned();
    aside.push(".corrupt");
    let aside = PathBuf::from(aside);
    match std::fs::copy(path, &aside) {
        Ok(_) => warn!(path = %aside.display(), "Kept a copy of the damaged store file"),
        Err(e) => warn!(path = %path.display(), error = %e, "Could not copy damaged store file aside"),
    }
}

fn load_jsonl(path: &Path) -> Vec<AnalyticsRow> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<AnalyticsRow>(line) {
            Ok(row) => Some(row),
            Err(e) => {
                warn!(error = %e, "Skipping corrupted analytics row");
                None
            }
        })
        .collect()
}

#[async_trait]
impl ConversationStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn load_conversation(&self, id: &ConversationId) -> Result<Option<ConversationState>, StoreError> {
        Ok(self.tables.read().await.conversations.get(id).cloned())
    }

    async fn save_conversation(&self, state: &ConversationState) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables
            .conversations
            .insert(state.conversation_id.clone(), state.clone());
        self.write_json(CONVERSATIONS, &tables.conversations)
    }

    async fn conversations_for_user(&self, user_id: &UserId) -> Result<Vec<ConversationState>, StoreError> {
        Ok(self.tables.read().await.conversations_for_user(user_id))
    }

    async fn create_escalation(&self, record: &EscalationRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.insert_escalation(record);
        self.write_json(ESCALATIONS, &tables.escalations)
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
        let mut tables = self.tables.write().await;
        tables.update_escalation(record)?;
        self.write_json(ESCALATIONS, &tables.escalations)
    }

    async fn escalations(&self, status: Option<EscalationStatus>) -> Result<Vec<EscalationRecord>, StoreError> {
        Ok(self.tables.read().await.escalations(status))
    }

    async fn escalations_for_conversation(&self, id: &ConversationId) -> Result<Vec<EscalationRecord>, StoreError> {
        Ok(self.tables.read().await.escalations_for_conversation(id))
    }

    async fn record_analytics(&self, row: &AnalyticsRow) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        self.append_line(ANALYTICS, row)?;
        tables.analytics.push(row.clone());
        Ok(())
    }

    async fn analytics_for(&self, id: &ConversationId) -> Result<Vec<AnalyticsRow>, StoreError> {
        Ok(self.tables.read().await.analytics_for(id))
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        Ok(self.tables.read().await.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compass_core::{Message, Priority, RoutingDecision, Stage, Tier};

    fn decision() -> RoutingDecision {
        RoutingDecision {
            matched_triggers: Default::default(),
            tier: Tier::Moderate,
            resulting_stage: Stage::SpecialistDirect,
            target_specialist: None,
            topics: Default::default(),
            diagnostics: vec![],
        }
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        let escalation_id = {
            let store = FileStore::new(dir.path());
            let mut state = ConversationState::new(ConversationId::from("c1"), UserId::from("u1"));
            state.push_user_message(Message::user("I'm a veteran"));
            state.advance(Stage::SpecialistDirect).unwrap();
            store.save_conversation(&state).await.unwrap();

            let record = EscalationRecord::open(
                ConversationId::from("c1"),
                UserId::from("u1"),
                "crisis indicators: suicide",
                Priority::Immediate,
            );
            store.create_escalation(&record).await.unwrap();

            let row = AnalyticsRow::new(
                ConversationId::from("c1"),
                UserId::from("u1"),
                1,
                decision(),
                Stage::Resolved,
            );
            store.record_analytics(&row).await.unwrap();
            record.id
        };

        let reopened = FileStore::new(dir.path());
        let state = reopened
            .load_conversation(&ConversationId::from("c1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.stage(), Stage::SpecialistDirect);
        assert_eq!(state.messages()[0].content, "I'm a veteran");
        assert!(reopened.get_escalation(&escalation_id).await.unwrap().unwrap().is_pending());
        assert_eq!(reopened.analytics_for(&ConversationId::from("c1")).await.unwrap().len(), 1);

        let stats = reopened.stats().await.unwrap();
        assert_eq!(stats.conversations, 1);
        assert_eq!(stats.pending_escalations, 1);
        assert_eq!(stats.analytics_rows, 1);
    }

    #[tokio::test]
    async fn resolution_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let mut record = EscalationRecord::open(
            ConversationId::from("c1"),
            UserId::from("u1"),
            "reason",
            Priority::Immediate,
        );
        store.create_escalation(&record).await.unwrap();
        record.resolve("dr-lee", "Called the user");
        store.update_escalation(&record).await.unwrap();

        let reopened = FileStore::new(dir.path());
        let stored = reopened.get_escalation(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.status(), EscalationStatus::Resolved);
        assert_eq!(stored.resolved_by(), Some("dr-lee"));
    }

    #[tokio::test]
    async fn missing_directory_starts_empty_and_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = FileStore::new(&nested);
        assert_eq!(store.stats().await.unwrap(), StoreStats::default());

        let state = ConversationState::new(ConversationId::from("c1"), UserId::from("u1"));
        store.save_conversation(&state).await.unwrap();
        assert!(nested.join(CONVERSATIONS).exists());
    }

    #[tokio::test]
    async fn corrupted_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONVERSATIONS), "{not json").unwrap();
        std::fs::write(dir.path().join(ANALYTICS), "garbage\n\n").unwrap();

        let store = FileStore::new(dir.path());
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.conversations, 0);
        assert_eq!(stats.analytics_rows, 0);

        let state = ConversationState::new(ConversationId::from("c1"), UserId::from("u1"));
        store.save_conversation(&state).await.unwrap();
        let kept = std::fs::read_to_string(dir.path().join("conversations.json.corrupt")).unwrap();
        assert_eq!(kept, "{not json");
        assert_eq!(FileStore::new(dir.path()).stats().await.unwrap().conversations, 1);
    }

    #[tokio::test]
    async fn one_bad_conversation_does_not_drop_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::new(dir.path());
            for id in ["c1", "c2"] {
                let mut state = ConversationState::new(ConversationId::from(id), UserId::from("u1"));
                state.push_user_message(Message::user("hello"));
                store.save_conversation(&state).await.unwrap();
            }
        }

        let path = dir.path().join(CONVERSATIONS);
        let mut doc: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        doc["c2"] = serde_json::json!({ "conversation_id": 7 });
        std::fs::write(&path, doc.to_string()).unwrap();

        let store = FileStore::new(dir.path());
        assert!(store.load_conversation(&ConversationId::from("c1")).await.unwrap().is_some());
        assert!(store.load_conversation(&ConversationId::from("c2")).await.unwrap().is_none());
        assert!(dir.path().join("conversations.json.corrupt").exists());
    }
}
