//! Per-conversation update lock.
//!
//! Serializes summary updates for one conversation inside this process.
//! Writers in other processes are caught by the store's optimistic version.

use ragline_core::message::ConversationId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

#[derive(Default)]
pub struct ConversationLocks {
    locks: Mutex<HashMap<ConversationId, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `conversation`.
    pub async fn acquire(&self, conversation: &ConversationId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Entries nobody holds or waits on
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks.entry(conversation.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

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
        let conv = ConversationId::from("c1");
        let guard = locks.acquire(&conv).await;

        let waiter = {
            let locks = locks.clone();
            let conv = conv.clone();
            tokio::spawn(async move {
                let _g = locks.acquire(&conv).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn other_conversations_do_not_wait() {
        let locks = ConversationLocks::new();
        let _a = locks.acquire(&ConversationId::from("a")).await;
        let _b = locks.acquire(&ConversationId::from("b")).await;
    }

    #[tokio::test]
    async fn released_entries_are_pruned() {
        let locks = ConversationLocks::new();
        for i in 0..10 {
            let _g = locks.acquire(&ConversationId::from(format!("c{i}"))).await;
        }
        assert!(locks.len() <= 1);
    }
}
