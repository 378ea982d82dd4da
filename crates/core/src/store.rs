//! Persistence and cache traits.
//!
//! The host application owns the actual tables; the pipeline only needs
//! create/filter/delete over chunks, get-or-create/save over session memory,
//! and a string-keyed TTL cache.
//!
//! Implementations: in-memory (tests, CLI dry runs), SQLite.

use crate::chunk::{ChunkType, KnowledgeChunk, TenantId};
use crate::error::StoreError;
use crate::message::{ConversationId, SessionMemory};
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Persist a chunk and return its ID.
    async fn insert(&self, chunk: KnowledgeChunk) -> Result<String, StoreError>;

    /// Delete every chunk built from one source record. Returns the number deleted.
    async fn delete_source(
        &self,
        tenant: &TenantId,
        chunk_type: ChunkType,
        source_id: &str,
    ) -> Result<usize, StoreError>;

    /// Delete every chunk of a type for a tenant. Returns the number deleted.
    async fn delete_type(&self, tenant: &TenantId, chunk_type: ChunkType)
    -> Result<usize, StoreError>;

    /// All chunks of a type for a tenant.
    async fn list(
        &self,
        tenant: &TenantId,
        chunk_type: ChunkType,
    ) -> Result<Vec<KnowledgeChunk>, StoreError>;

    /// Chunks built from one source record, in chunk order.
    async fn list_source(
        &self,
        tenant: &TenantId,
        chunk_type: ChunkType,
        source_id: &str,
    ) -> Result<Vec<KnowledgeChunk>, StoreError>;

    /// Most recently created chunks of a type, newest first.
    async fn recent(
        &self,
        tenant: &TenantId,
        chunk_type: ChunkType,
        limit: usize,
    ) -> Result<Vec<KnowledgeChunk>, StoreError>;

    /// Chunk count for a tenant, optionally restricted to one type.
    async fn count(
        &self,
        tenant: &TenantId,
        chunk_type: Option<ChunkType>,
    ) -> Result<usize, StoreError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch the session memory for a conversation, creating an empty one if absent.
    async fn get_or_create(
        &self,
        conversation: &ConversationId,
        tenant: &TenantId,
    ) -> Result<SessionMemory, StoreError>;

    async fn get(&self, conversation: &ConversationId) -> Result<Option<SessionMemory>, StoreError>;

    /// Save with an optimistic version check.
    ///
    /// `memory.version` must equal the stored version; the returned record
    /// carries the bumped version. A mismatch yields `StoreError::Conflict`.
    async fn save(&self, memory: SessionMemory) -> Result<SessionMemory, StoreError>;

    /// Remove the memory for a conversation. Returns whether one existed.
    async fn clear(&self, conversation: &ConversationId) -> Result<bool, StoreError>;
}

/// A string-keyed TTL cache holding JSON values.
///
/// Operations are infallible: a cache miss is always an acceptable answer.
pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> Option<serde_json::Value>;

    fn set(&self, key: &str, value: serde_json::Value, ttl: Duration);

    fn delete(&self, key: &str);
}

/// Cache key of the per-tenant knowledge statistics entry.
pub fn knowledge_stats_key(tenant: &TenantId) -> String {
    format!("knowledge_stats:{}", tenant.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_key_is_tenant_scoped() {
        assert_eq!(
            knowledge_stats_key(&TenantId::from("shop_42")),
            "knowledge_stats:shop_42"
        );
    }
}
