//! Per-conversation serialization.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use compass_core::ConversationId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

const PRUNE_ABOVE: usize = 1024;

/// One async mutex per conversation. Turns for the same conversation run
/// one at a time; different conversations never contend.
#[derive(Default)]
pub struct ConversationLocks {
    locks: Mutex<HashMap<ConversationId, Arc<AsyncMutex<()>>>>,
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a conversation.
    pub async fn lock(&self, id: &ConversationId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            if locks.len() > PRUNE_ABOVE {
                // Idle entries are referenced only by the map.
                locks.retain(|_, l| Arc::strong_count(l) > 1);
            }
            Arc::clone(locks.entry(id.clone()).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of tracked conversations.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_conversation_is_serialized() {
        let locks = Arc::new(ConversationLocks::new());
        let id = ConversationId::from("c1");
        let guard = locks.lock(&id).await;

        let waiter = {
            let locks = locks.clone();
            let id = id.clone();
            tokio::spawn(async move {
                let _g = locks.lock(&id).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn different_conversations_do_not_contend() {
        let locks = ConversationLocks::new();
        let _a = locks.lock(&ConversationId::from("a")).await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.lock(&ConversationId::from("b"))).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }
}
