//! In-memory stores, useful for testing and CLI dry runs.

use async_trait::async_trait;
use chrono::Utc;
use ragline_core::chunk::{ChunkType, KnowledgeChunk, TenantId};
use ragline_core::error::StoreError;
use ragline_core::message::{ConversationId, SessionMemory};
use ragline_core::store::{KnowledgeStore, SessionStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Knowledge chunks kept in a Vec, in insertion order.
pub struct InMemoryKnowledgeStore {
    chunks: Arc<RwLock<Vec<KnowledgeChunk>>>,
}

impl InMemoryKnowledgeStore {
    pub fn new() -> Self {
        Self {
            chunks: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryKnowledgeStore {
    fn default() -> Self {
        Self::new()
    }
}

fn matches(chunk: &KnowledgeChunk, tenant: &TenantId, chunk_type: ChunkType) -> bool {
    &chunk.tenant_id == tenant && chunk.chunk_type == chunk_type
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn insert(&self, mut chunk: KnowledgeChunk) -> Result<String, StoreError> {
        if chunk.id.is_empty() {
            chunk.id = Uuid::new_v4().to_string();
        }
        let id = chunk.id.clone();
        let mut chunks = self.chunks.write().await;
        chunks.retain(|c| c.id != id);
        chunks.push(chunk);
        Ok(id)
    }

    async fn delete_source(
        &self,
        tenant: &TenantId,
        chunk_type: ChunkType,
        source_id: &str,
    ) -> Result<usize, StoreError> {
        let mut chunks = self.chunks.write().await;
        let before = chunks.len();
        chunks.retain(|c| {
            !(matches(c, tenant, chunk_type) && c.source_id.as_deref() == Some(source_id))
        });
        Ok(before - chunks.len())
    }

    async fn delete_type(
        &self,
        tenant: &TenantId,
        chunk_type: ChunkType,
    ) -> Result<usize, StoreError> {
        let mut chunks = self.chunks.write().await;
        let before = chunks.len();
        chunks.retain(|c| !matches(c, tenant, chunk_type));
        Ok(before - chunks.len())
    }

    async fn list(
        &self,
        tenant: &TenantId,
        chunk_type: ChunkType,
    ) -> Result<Vec<KnowledgeChunk>, StoreError> {
        let chunks = self.chunks.read().await;
        Ok(chunks
            .iter()
            .filter(|c| matches(c, tenant, chunk_type))
            .cloned()
            .collect())
    }

    async fn list_source(
        &self,
        tenant: &TenantId,
        chunk_type: ChunkType,
        source_id: &str,
    ) -> Result<Vec<KnowledgeChunk>, StoreError> {
        let chunks = self.chunks.read().await;
        Ok(chunks
            .iter()
            .filter(|c| matches(c, tenant, chunk_type) && c.source_id.as_deref() == Some(source_id))
            .cloned()
            .collect())
    }

    async fn recent(
        &self,
        tenant: &TenantId,
        chunk_type: ChunkType,
        limit: usize,
    ) -> Result<Vec<KnowledgeChunk>, StoreError> {
        let chunks = self.chunks.read().await;
        // Reverse insertion order first so equal timestamps keep newest-first.
        let mut matching: Vec<KnowledgeChunk> = chunks
            .iter()
            .rev()
            .filter(|c| matches(c, tenant, chunk_type))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn count(
        &self,
        tenant: &TenantId,
        chunk_type: Option<ChunkType>,
    ) -> Result<usize, StoreError> {
        let chunks = self.chunks.read().await;
        Ok(chunks
            .iter()
            .filter(|c| &c.tenant_id == tenant && chunk_type.is_none_or(|t| c.chunk_type == t))
            .count())
    }
}

/// Session memories keyed by conversation.
pub struct InMemorySessionStore {
    memories: Arc<RwLock<HashMap<ConversationId, SessionMemory>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            memories: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get_or_create(
        &self,
        conversation: &ConversationId,
        tenant: &TenantId,
    ) -> Result<SessionMemory, StoreError> {
        let mut memories = self.memories.write().await;
        Ok(memories
            .entry(conversation.clone())
            .or_insert_with(|| SessionMemory::new(conversation.clone(), tenant.clone()))
            .clone())
    }

    async fn get(&self, conversation: &ConversationId) -> Result<Option<SessionMemory>, StoreError> {
        Ok(self.memories.read().await.get(conversation).cloned())
    }

    async fn save(&self, mut memory: SessionMemory) -> Result<SessionMemory, StoreError> {
        let mut memories = self.memories.write().await;
        let stored_version = memories
            .get(&memory.conversation_id)
            .map(|m| m.version)
            .unwrap_or(0);
        if stored_version != memory.version {
            return Err(StoreError::Conflict {
                key: memory.conversation_id.to_string(),
                expected: memory.version,
                found: stored_version,
            });
        }
        memory.version += 1;
        memory.updated_at = Utc::now();
        memories.insert(memory.conversation_id.clone(), memory.clone());
        Ok(memory)
    }

    async fn clear(&self, conversation: &ConversationId) -> Result<bool, StoreError> {
        Ok(self.memories.write().await.remove(conversation).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragline_core::testing::chunk;

    fn tenant() -> TenantId {
        TenantId::from("shop_1")
    }

    #[tokio::test]
    async fn delete_source_is_scoped() {
        let store = InMemoryKnowledgeStore::new();
        store.insert(chunk("shop_1", ChunkType::Faq, "f1", "a")).await.unwrap();
        store.insert(chunk("shop_1", ChunkType::Faq, "f2", "b")).await.unwrap();
        store.insert(chunk("shop_1", ChunkType::Product, "f1", "c")).await.unwrap();
        store.insert(chunk("shop_2", ChunkType::Faq, "f1", "d")).await.unwrap();

        let deleted = store.delete_source(&tenant(), ChunkType::Faq, "f1").await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.count(&tenant(), None).await.unwrap(), 2);
        assert_eq!(store.count(&TenantId::from("shop_2"), None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn recent_is_newest_first() {
        let store = InMemoryKnowledgeStore::new();
        for title in ["old", "mid", "new"] {
            store.insert(chunk("shop_1", ChunkType::Faq, title, title)).await.unwrap();
        }
        let recent = store.recent(&tenant(), ChunkType::Faq, 2).await.unwrap();
        let titles: Vec<_> = recent.iter().map(|c| c.section_title.as_str()).collect();
        assert_eq!(titles, vec!["new", "mid"]);
    }

    #[tokio::test]
    async fn count_by_type() {
        let store = InMemoryKnowledgeStore::new();
        store.insert(chunk("shop_1", ChunkType::Faq, "a", "a")).await.unwrap();
        store.insert(chunk("shop_1", ChunkType::Product, "b", "b")).await.unwrap();
        assert_eq!(store.count(&tenant(), Some(ChunkType::Faq)).await.unwrap(), 1);
        assert_eq!(store.delete_type(&tenant(), ChunkType::Product).await.unwrap(), 1);
        assert_eq!(store.count(&tenant(), None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn session_save_bumps_version() {
        let store = InMemorySessionStore::new();
        let conv = ConversationId::from("c1");
        let mut mem = store.get_or_create(&conv, &tenant()).await.unwrap();
        assert_eq!(mem.version, 0);

        mem.replace_summary("first".into(), 5);
        let saved = store.save(mem).await.unwrap();
        assert_eq!(saved.version, 1);
        assert_eq!(store.get(&conv).await.unwrap().unwrap().cumulative_summary, "first");
    }

    #[tokio::test]
    async fn stale_save_conflicts() {
        let store = InMemorySessionStore::new();
        let conv = ConversationId::from("c1");
        let a = store.get_or_create(&conv, &tenant()).await.unwrap();
        let b = a.clone();
        store.save(a).await.unwrap();
        let err = store.save(b).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { expected: 0, found: 1, .. }));
    }

    #[tokio::test]
    async fn clear_removes_memory() {
        let store = InMemorySessionStore::new();
        let conv = ConversationId::from("c1");
        store.get_or_create(&conv, &tenant()).await.unwrap();
        assert!(store.clear(&conv).await.unwrap());
        assert!(!store.clear(&conv).await.unwrap());
        assert!(store.get(&conv).await.unwrap().is_none());
    }
}
