//! Local hybrid search over any `KnowledgeStore`.
//!
//! Loads the tenant's chunks of the requested type, scores them by cosine
//! similarity (best of tldr and full-text embedding) and by max-normalized
//! BM25 over title + tldr + text, then fuses the two with configurable weights.
//! Suitable for per-tenant knowledge bases of a few thousand chunks.

use crate::lexical::bm25_scores;
use crate::vector::{dense_score, max_normalize, weighted_fusion};
use async_trait::async_trait;
use ragline_config::RetrievalConfig;
use ragline_core::error::StoreError;
use ragline_core::search::{HybridSearch, SearchHit, SearchMode, SearchQuery};
use ragline_core::store::KnowledgeStore;
use ragline_core::token::{RETRIEVAL_WORD_MULTIPLIER, estimate_from_words};
use std::sync::Arc;
use tracing::debug;

pub struct LocalHybridSearch {
    store: Arc<dyn KnowledgeStore>,
    vector_weight: f32,
    keyword_weight: f32,
}

impl LocalHybridSearch {
    pub fn new(store: Arc<dyn KnowledgeStore>, vector_weight: f32, keyword_weight: f32) -> Self {
        Self {
            store,
            vector_weight,
            keyword_weight,
        }
    }

    pub fn from_config(store: Arc<dyn KnowledgeStore>, config: &RetrievalConfig) -> Self {
        Self::new(store, config.vector_weight, config.keyword_weight)
    }
}

/// Keep hits in order while their summed token estimate fits `budget`.
fn fit_budget(hits: Vec<SearchHit>, budget: usize) -> Vec<SearchHit> {
    let mut used = 0;
    let mut kept = Vec::with_capacity(hits.len());
    for hit in hits {
        let cost = estimate_from_words(hit.chunk.word_count, RETRIEVAL_WORD_MULTIPLIER);
        if used + cost > budget {
            break;
        }
        used += cost;
        kept.push(hit);
    }
    kept
}

#[async_trait]
impl HybridSearch for LocalHybridSearch {
    async fn hybrid_search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, StoreError> {
        let chunks = self.store.list(&query.tenant_id, query.chunk_type).await?;
        if chunks.is_empty() || query.top_k == 0 {
            return Ok(Vec::new());
        }

        // Hybrid without a query vector degrades to sparse.
        let mode = match query.mode {
            SearchMode::Hybrid | SearchMode::Dense if query.embedding.is_empty() => {
                SearchMode::Sparse
            }
            mode => mode,
        };

        let sparse: Vec<f32> = if mode == SearchMode::Dense {
            vec![0.0; chunks.len()]
        } else {
            let documents: Vec<String> = chunks
                .iter()
                .map(|c| format!("{} {} {}", c.section_title, c.tldr, c.full_text))
                .collect();
            let mut scores = bm25_scores(&query.text, &documents);
            max_normalize(&mut scores);
            scores
        };

        let mut hits: Vec<SearchHit> = chunks
            .into_iter()
            .zip(sparse)
            .map(|(chunk, sparse)| {
                let score = match mode {
                    SearchMode::Sparse => sparse,
                    SearchMode::Dense => {
                        dense_score(&query.embedding, &chunk.tldr_embedding, &chunk.full_embedding)
                    }
                    SearchMode::Hybrid => weighted_fusion(
                        dense_score(&query.embedding, &chunk.tldr_embedding, &chunk.full_embedding),
                        sparse,
                        self.vector_weight,
                        self.keyword_weight,
                    ),
                };
                SearchHit { chunk, score }
            })
            .filter(|hit| hit.score > 0.0)
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(query.top_k);
        if let Some(budget) = query.token_budget {
            hits = fit_budget(hits, budget);
        }

        debug!(
            tenant = %query.tenant_id,
            source = %query.chunk_type,
            ?mode,
            hits = hits.len(),
            "Hybrid search complete"
        );
        Ok(hits)
    }
}
