//! Production RAG pipeline.
//!
//! Same contract as [`ContextRetriever`](crate::ContextRetriever), six stages:
//! 1. Query analysis (complexity, language)
//! 2. Overfetch: dense for the primary source, sparse for up to N secondaries
//! 3. Fusion: concatenate and dedupe by chunk ID, first occurrence wins
//!    (the similarity floor applies to dense primary hits before fusion)
//! 4. Optional rerank, model chosen by complexity
//! 5. Greedy fit into primary + secondary budget, stop at first overflow
//! 6. Re-partition into primary / secondary by chunk type
//!
//! A stage that fails outright hands the whole request to the baseline.

use crate::analysis::{QueryAnalysis, analyze_query};
use crate::{ContextRetrieval, RetrievalError, RetrievalRequest};
use async_trait::async_trait;
use futures::future::join_all;
use ragline_config::{PipelineConfig, RetrievalConfig};
use ragline_core::chunk::{ChunkType, RetrievalMethod, RetrievalResult};
use ragline_core::provider::{Embedder, EmbeddingTask, RerankModel, Reranker};
use ragline_core::search::{HybridSearch, SearchHit, SearchMode, SearchQuery};
use ragline_core::token::{RETRIEVAL_WORD_MULTIPLIER, estimate_from_words};
use ragline_knowledge::Normalizer;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ProductionRag {
    embedder: Arc<dyn Embedder>,
    search: Arc<dyn HybridSearch>,
    reranker: Option<Arc<dyn Reranker>>,
    baseline: Arc<dyn ContextRetrieval>,
    normalizer: Normalizer,
    config: PipelineConfig,
    min_similarity: f32,
    secondary_budget_floor: usize,
}

impl ProductionRag {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        search: Arc<dyn HybridSearch>,
        baseline: Arc<dyn ContextRetrieval>,
        normalizer: Normalizer,
        config: &PipelineConfig,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            search,
            reranker: None,
            baseline,
            normalizer,
            config: config.clone(),
            min_similarity: retrieval.min_similarity,
            secondary_budget_floor: retrieval.secondary_budget_floor,
        }
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    fn query(
        &self,
        request: &RetrievalRequest,
        text: &str,
        embedding: &[f32],
        chunk_type: ChunkType,
        top_k: usize,
        mode: SearchMode,
    ) -> SearchQuery {
        SearchQuery {
            text: text.to_string(),
            tenant_id: request.tenant.clone(),
            chunk_type,
            embedding: embedding.to_vec(),
            top_k,
            token_budget: None,
            mode,
        }
    }

    // ── Stage 2 ──────────────────────────────────────────────────────────

    async fn overfetch(
        &self,
        request: &RetrievalRequest,
        text: &str,
        embedding: &[f32],
    ) -> Result<Vec<SearchHit>, RetrievalError> {
        let primary_query = self.query(
            request,
            text,
            embedding,
            request.primary_source,
            self.config.dense_top_k,
            SearchMode::Dense,
        );
        let mut candidates = self.search.hybrid_search(&primary_query).await?;
        // Cosine floor on dense hits only; sparse scores are max-normalized BM25
        if self.config.apply_min_similarity {
            candidates.retain(|hit| hit.score >= self.min_similarity);
        }

        if request.secondary_budget <= self.secondary_budget_floor {
            return Ok(candidates);
        }

        let secondary_queries: Vec<SearchQuery> = request
            .secondary_sources
            .iter()
            .filter(|s| **s != request.primary_source)
            .take(self.config.max_secondary_sources)
            .map(|&source| {
                self.query(request, text, embedding, source, self.config.sparse_top_k, SearchMode::Sparse)
            })
            .collect();

        let results = join_all(secondary_queries.iter().map(|q| self.search.hybrid_search(q))).await;
        for (query, result) in secondary_queries.iter().zip(results) {
            match result {
                Ok(hits) => candidates.extend(hits),
                Err(e) => warn!(source = %query.chunk_type, error = %e, "Secondary overfetch failed, skipping"),
            }
        }
        Ok(candidates)
    }

    // ── Stage 3 ──────────────────────────────────────────────────────────

    fn fuse(&self, candidates: Vec<SearchHit>) -> Vec<SearchHit> {
        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .filter(|hit| seen.insert(hit.chunk.id.clone()))
            .collect()
    }

    // ── Stage 4 ──────────────────────────────────────────────────────────

    async fn rerank(&self, query: &str, analysis: &QueryAnalysis, mut candidates: Vec<SearchHit>) -> Vec<SearchHit> {
        let reranker = match &self.reranker {
            Some(r) if self.config.rerank_enabled && candidates.len() > self.config.rerank_min_candidates => r,
            _ => {
                candidates.truncate(self.config.final_top_k);
                return candidates;
            }
        };

        let model = if analysis.complexity >= self.config.complexity_threshold {
            RerankModel::Large
        } else {
            RerankModel::Base
        };
        let documents: Vec<String> = candidates
            .iter()
            .map(|hit| format!("{}\n{}", hit.chunk.section_title, hit.chunk.full_text))
            .collect();

        match reranker
            .rerank(query, &documents, self.config.final_top_k, model)
            .await
        {
            Ok(scores) => {
                let mut slots: Vec<Option<SearchHit>> = candidates.into_iter().map(Some).collect();
                let reranked: Vec<SearchHit> = scores
                    .into_iter()
                    .filter_map(|s| {
                        let mut hit = slots.get_mut(s.index)?.take()?;
                        hit.score = s.score;
                        Some(hit)
                    })
                    .take(self.config.final_top_k)
                    .collect();
                debug!(?model, kept = reranked.len(), "Candidates reranked");
                reranked
            }
            Err(e) => {
                warn!(error = %e, ?model, "Rerank failed, keeping fused order");
                candidates.truncate(self.config.final_top_k);
                candidates
            }
        }
    }

    // ── Stage 5 ──────────────────────────────────────────────────────────

    fn fit_budget(&self, candidates: Vec<SearchHit>, budget: usize) -> Vec<SearchHit> {
        let mut used = 0;
        let mut kept = Vec::new();
        for hit in candidates {
            let cost = estimate_from_words(hit.chunk.word_count, RETRIEVAL_WORD_MULTIPLIER);
            if used + cost > budget {
                break;
            }
            used += cost;
            kept.push(hit);
        }
        kept
    }

    async fn run(&self, request: &RetrievalRequest) -> Result<RetrievalResult, RetrievalError> {
        let analysis = analyze_query(&request.query, &self.normalizer);
        let text = self.normalizer.normalize(&request.query);
        let embedding = self.embedder.embed(&text, EmbeddingTask::RetrievalQuery).await?;

        let candidates = self.overfetch(request, &text, &embedding).await?;
        let fetched = candidates.len();
        let fused = self.fuse(candidates);
        let unique = fused.len();
        let ranked = self.rerank(&text, &analysis, fused).await;
        let fitted = self.fit_budget(ranked, request.primary_budget + request.secondary_budget);

        let (primary, secondary): (Vec<SearchHit>, Vec<SearchHit>) = fitted
            .into_iter()
            .partition(|hit| hit.chunk.chunk_type == request.primary_source);

        debug!(
            fetched,
            unique,
            primary = primary.len(),
            secondary = secondary.len(),
            complexity = analysis.complexity,
            "Production RAG stages complete"
        );
        Ok(RetrievalResult::new(
            primary.iter().map(|h| h.chunk.to_context(h.score)).collect(),
            secondary.iter().map(|h| h.chunk.to_context(h.score)).collect(),
            RetrievalMethod::ProductionRag,
        ))
    }
}

#[async_trait]
impl ContextRetrieval for ProductionRag {
    fn name(&self) -> &str {
        "production_rag"
    }

    async fn retrieve_context(&self, request: &RetrievalRequest) -> RetrievalResult {
        match self.run(request).await {
            Ok(result) => {
                info!(
                    tenant = %request.tenant,
                    method = %result.retrieval_method,
                    chunks = result.total_chunks,
                    "Context retrieved"
                );
                result
            }
            Err(e) => {
                warn!(tenant = %request.tenant, error = %e, "Production RAG failed, delegating to baseline");
                self.baseline.retrieve_context(request).await
            }
        }
    }
}
