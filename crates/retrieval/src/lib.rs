//! Retrieval for ragline.
//!
//! - [`router`]: deterministic intent and source routing with token budgets
//! - [`retriever`]: baseline context retriever with a recent-chunks fallback
//! - [`pipeline`]: production RAG (overfetch, fuse, rerank, budget fit)
//!
//! Both retrievers implement [`ContextRetrieval`] and never fail: the worst
//! case is an empty `RetrievalResult` tagged `failed`.

pub mod analysis;
pub mod pipeline;
pub mod retriever;
pub mod router;

use async_trait::async_trait;
use ragline_core::chunk::{ChunkType, RetrievalResult, TenantId};
use ragline_core::error::{ProviderError, StoreError};
use ragline_core::routing::RoutingDecision;

pub use analysis::{QueryAnalysis, analyze_query};
pub use pipeline::ProductionRag;
pub use retriever::ContextRetriever;
pub use router::QueryRouter;

/// Everything a retriever needs for one query.
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub query: String,
    pub tenant: TenantId,
    pub primary_source: ChunkType,
    pub secondary_sources: Vec<ChunkType>,
    pub primary_budget: usize,
    pub secondary_budget: usize,
    pub routing: Option<RoutingDecision>,
}

impl RetrievalRequest {
    /// Build a request from a routing decision.
    pub fn from_decision(query: impl Into<String>, tenant: TenantId, decision: &RoutingDecision) -> Self {
        Self {
            query: query.into(),
            tenant,
            primary_source: decision.primary_source,
            secondary_sources: decision.secondary_sources.clone(),
            primary_budget: decision.token_budgets.primary,
            secondary_budget: decision.token_budgets.secondary,
            routing: Some(decision.clone()),
        }
    }
}

/// Failures inside a retrieval stage. Never escapes a `ContextRetrieval`.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("query embedding failed: {0}")]
    Embedding(#[from] ProviderError),

    #[error("search failed: {0}")]
    Search(#[from] StoreError),
}

#[async_trait]
pub trait ContextRetrieval: Send + Sync {
    fn name(&self) -> &str;

    async fn retrieve_context(&self, request: &RetrievalRequest) -> RetrievalResult;
}
