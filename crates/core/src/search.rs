//! Hybrid search trait: lexical + vector retrieval per knowledge source.

use crate::chunk::{ChunkType, KnowledgeChunk, TenantId};
use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Which signals a search should use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Vector similarity only
    Dense,
    /// Keyword (BM25-style) only
    Sparse,
    /// Weighted combination of both (default)
    #[default]
    Hybrid,
}

/// A search over one tenant's chunks of one type.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: String,
    pub tenant_id: TenantId,
    pub chunk_type: ChunkType,
    /// Query embedding; may be empty for sparse searches
    pub embedding: Vec<f32>,
    pub top_k: usize,
    /// Optional cap on the summed token estimate of returned hits
    pub token_budget: Option<usize>,
    pub mode: SearchMode,
}

/// A scored search candidate. `score` is in [0, 1], higher is better.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: KnowledgeChunk,
    pub score: f32,
}

#[async_trait]
pub trait HybridSearch: Send + Sync {
    async fn hybrid_search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, StoreError>;
}
