//! Baseline context retriever.
//!
//! Normalize and embed the query, hybrid-search the primary source and
//! (budget permitting) every secondary source, drop low-similarity hits.
//! Any failure downgrades to the most recent chunks per source; if even
//! that fails the result is empty and tagged `failed`.

use crate::{ContextRetrieval, RetrievalError, RetrievalRequest};
use async_trait::async_trait;
use ragline_config::RetrievalConfig;
use ragline_core::chunk::{ChunkType, ContextChunk, RetrievalMethod, RetrievalResult, TenantId};
use ragline_core::error::StoreError;
use ragline_core::provider::{Embedder, EmbeddingTask};
use ragline_core::search::{HybridSearch, SearchMode, SearchQuery};
use ragline_core::store::KnowledgeStore;
use ragline_knowledge::Normalizer;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ContextRetriever {
    embedder: Arc<dyn Embedder>,
    search: Arc<dyn HybridSearch>,
    store: Arc<dyn KnowledgeStore>,
    normalizer: Normalizer,
    config: RetrievalConfig,
}

impl ContextRetriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        search: Arc<dyn HybridSearch>,
        store: Arc<dyn KnowledgeStore>,
        normalizer: Normalizer,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            search,
            store,
            normalizer,
            config: config.clone(),
        }
    }

    async fn search_source(
        &self,
        request: &RetrievalRequest,
        query: &str,
        embedding: &[f32],
        chunk_type: ChunkType,
        top_k: usize,
        budget: usize,
    ) -> Result<Vec<ContextChunk>, StoreError> {
        let hits = self
            .search
            .hybrid_search(&SearchQuery {
                text: query.to_string(),
                tenant_id: request.tenant.clone(),
                chunk_type,
                embedding: embedding.to_vec(),
                top_k,
                token_budget: Some(budget),
                mode: SearchMode::Hybrid,
            })
            .await?;

        let before = hits.len();
        let kept: Vec<ContextChunk> = hits
            .into_iter()
            .filter(|hit| hit.score >= self.config.min_similarity)
            .map(|hit| hit.chunk.to_context(hit.score))
            .collect();
        if kept.len() < before {
            debug!(
                source = %chunk_type,
                dropped = before - kept.len(),
                min_similarity = self.config.min_similarity,
                "Low-similarity hits discarded"
            );
        }
        Ok(kept)
    }

    async fn semantic_search(&self, request: &RetrievalRequest) -> Result<RetrievalResult, RetrievalError> {
        let query = self.normalizer.normalize(&request.query);
        let embedding = self.embedder.embed(&query, EmbeddingTask::RetrievalQuery).await?;

        let primary = self
            .search_source(
                request,
                &query,
                &embedding,
                request.primary_source,
                self.config.primary_top_k,
                request.primary_budget,
            )
            .await?;

        let mut secondary = Vec::new();
        if request.secondary_budget > self.config.secondary_budget_floor {
            for &source in &request.secondary_sources {
                match self
                    .search_source(
                        request,
                        &query,
                        &embedding,
                        source,
                        self.config.secondary_top_k,
                        request.secondary_budget,
                    )
                    .await
                {
                    Ok(chunks) => secondary.extend(chunks),
                    Err(e) => warn!(source = %source, error = %e, "Secondary source search failed, skipping"),
                }
            }
        } else if !request.secondary_sources.is_empty() {
            debug!(
                secondary_budget = request.secondary_budget,
                floor = self.config.secondary_budget_floor,
                "Secondary budget below floor, secondary retrieval skipped"
            );
        }

        Ok(RetrievalResult::new(primary, secondary, RetrievalMethod::SemanticSearch))
    }

    async fn recent_context(
        &self,
        tenant: &TenantId,
        chunk_type: ChunkType,
        limit: usize,
    ) -> Result<Vec<ContextChunk>, StoreError> {
        Ok(self
            .store
            .recent(tenant, chunk_type, limit)
            .await?
            .iter()
            .map(|c| c.to_context(self.config.fallback_score))
            .collect())
    }

    async fn try_fallback_recent(&self, request: &RetrievalRequest) -> Result<RetrievalResult, StoreError> {
        let primary = self
            .recent_context(&request.tenant, request.primary_source, self.config.fallback_primary_limit)
            .await?;
        let mut secondary = Vec::new();
        for &source in &request.secondary_sources {
            secondary.extend(
                self.recent_context(&request.tenant, source, self.config.fallback_secondary_limit)
                    .await?,
            );
        }
        Ok(RetrievalResult::new(primary, secondary, RetrievalMethod::FallbackRecent))
    }

    /// Most recent chunks per source with a fixed placeholder score.
    pub async fn fallback_recent(&self, request: &RetrievalRequest) -> RetrievalResult {
        match self.try_fallback_recent(request).await {
            Ok(result) => result,
            Err(e) => {
                warn!(tenant = %request.tenant, error = %e, "Recent-chunks fallback failed");
                RetrievalResult::empty(RetrievalMethod::Failed)
            }
        }
    }
}

#[async_trait]
impl ContextRetrieval for ContextRetriever {
    fn name(&self) -> &str {
        "context_retriever"
    }

    async fn retrieve_context(&self, request: &RetrievalRequest) -> RetrievalResult {
        let result = match self.semantic_search(request).await {
            Ok(result) => result,
            Err(e) => {
                warn!(tenant = %request.tenant, error = %e, "Retrieval degraded to recent chunks");
                self.fallback_recent(request).await
            }
        };
        info!(
            tenant = %request.tenant,
            method = %result.retrieval_method,
            chunks = result.total_chunks,
            "Context retrieved"
        );
        result
    }
}
