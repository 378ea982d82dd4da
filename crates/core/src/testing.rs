//! Shared test doubles for the model and search traits.
//!
//! Compiled for this crate's tests and, behind the `test-util` feature, for
//! the tests of every other workspace crate.

use crate::chunk::{ChunkType, KnowledgeChunk, TenantId};
use crate::error::{ProviderError, StoreError};
use crate::provider::{
    ChatModel, Completion, CompletionRequest, Embedder, EmbeddingTask, RerankModel, RerankScore,
    Reranker,
};
use crate::search::{HybridSearch, SearchHit, SearchQuery};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Dimension of `KeywordEmbedder` vectors.
pub const KEYWORD_DIM: usize = 64;

fn bucket(word: &str) -> usize {
    // FNV-1a, stable across runs
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in word.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % KEYWORD_DIM as u64) as usize
}

/// Deterministic bag-of-words embedder: texts sharing words get similar vectors.
#[derive(Default)]
pub struct KeywordEmbedder {
    calls: Mutex<usize>,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    /// The vector this embedder returns for `text`.
    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; KEYWORD_DIM];
        for word in text.split_whitespace() {
            let word: String = word
                .chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect();
            if !word.is_empty() {
                v[bucket(&word)] += 1.0;
            }
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn name(&self) -> &str {
        "keyword_mock"
    }

    async fn embed(&self, text: &str, _task: EmbeddingTask) -> Result<Vec<f32>, ProviderError> {
        *self.calls.lock().unwrap() += 1;
        Ok(Self::vector(text))
    }
}

/// An embedder that always fails, optionally only for texts containing a marker.
#[derive(Default)]
pub struct FailingEmbedder {
    only_containing: Option<String>,
    calls: Mutex<usize>,
}

impl FailingEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail only for texts containing `marker`; embed everything else like `KeywordEmbedder`.
    pub fn when_contains(marker: &str) -> Self {
        Self {
            only_containing: Some(marker.to_string()),
            calls: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Embedder for FailingEmbedder {
    fn name(&self) -> &str {
        "failing_mock"
    }

    async fn embed(&self, text: &str, _task: EmbeddingTask) -> Result<Vec<f32>, ProviderError> {
        *self.calls.lock().unwrap() += 1;
        match &self.only_containing {
            Some(marker) if !text.contains(marker.as_str()) => Ok(KeywordEmbedder::vector(text)),
            _ => Err(ProviderError::Network("embedding service unreachable".into())),
        }
    }
}

/// A chat model that replays scripted outcomes in order.
///
/// Once the script runs out, every call returns `default_reply`.
pub struct ScriptedChatModel {
    script: Mutex<Vec<Result<Completion, ProviderError>>>,
    default_reply: String,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedChatModel {
    pub fn new(script: Vec<Result<Completion, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script),
            default_reply: r#"{"summary": "Customer asked about products.", "topics": []}"#.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `text`.
    pub fn always(text: &str) -> Self {
        let mut model = Self::new(Vec::new());
        model.default_reply = text.to_string();
        model
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            return Ok(Completion::text(model, self.default_reply.clone()));
        }
        script.remove(0).map(|mut c| {
            if c.model.is_empty() {
                c.model = model;
            }
            c
        })
    }
}

/// One recorded `hybrid_search` call.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCall {
    pub chunk_type: ChunkType,
    pub top_k: usize,
}

/// A search backend returning preset hits per chunk type.
#[derive(Default)]
pub struct StaticSearch {
    hits: HashMap<ChunkType, Vec<SearchHit>>,
    failing: Vec<ChunkType>,
    calls: Mutex<Vec<SearchCall>>,
}

impl StaticSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hit(mut self, chunk: KnowledgeChunk, score: f32) -> Self {
        self.hits
            .entry(chunk.chunk_type)
            .or_default()
            .push(SearchHit { chunk, score });
        self
    }

    /// Make searches of `chunk_type` fail.
    pub fn failing(mut self, chunk_type: ChunkType) -> Self {
        self.failing.push(chunk_type);
        self
    }

    pub fn calls(&self) -> Vec<SearchCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HybridSearch for StaticSearch {
    async fn hybrid_search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, StoreError> {
        self.calls.lock().unwrap().push(SearchCall {
            chunk_type: query.chunk_type,
            top_k: query.top_k,
        });
        if self.failing.contains(&query.chunk_type) {
            return Err(StoreError::QueryFailed("search index offline".into()));
        }
        let mut hits = self
            .hits
            .get(&query.chunk_type)
            .cloned()
            .unwrap_or_default();
        hits.retain(|h| h.chunk.tenant_id == query.tenant_id);
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(query.top_k);
        Ok(hits)
    }
}

/// A reranker that reverses the candidate order, or fails.
pub struct ReversingReranker {
    fail: bool,
    models: Mutex<Vec<RerankModel>>,
}

impl ReversingReranker {
    pub fn new() -> Self {
        Self {
            fail: false,
            models: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            models: Mutex::new(Vec::new()),
        }
    }

    /// Models requested so far.
    pub fn models(&self) -> Vec<RerankModel> {
        self.models.lock().unwrap().clone()
    }
}

impl Default for ReversingReranker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Reranker for ReversingReranker {
    fn name(&self) -> &str {
        "reversing_mock"
    }

    async fn rerank(
        &self,
        _query: &str,
        documents: &[String],
        top_k: usize,
        model: RerankModel,
    ) -> Result<Vec<RerankScore>, ProviderError> {
        self.models.lock().unwrap().push(model);
        if self.fail {
            return Err(ProviderError::Timeout("rerank".into()));
        }
        let n = documents.len();
        Ok((0..n)
            .rev()
            .take(top_k)
            .enumerate()
            .map(|(rank, index)| RerankScore {
                index,
                score: 1.0 - rank as f32 / n.max(1) as f32,
            })
            .collect())
    }
}

/// A chunk with a source ID equal to its title, for concise fixtures.
pub fn chunk(tenant: &str, chunk_type: ChunkType, title: &str, text: &str) -> KnowledgeChunk {
    KnowledgeChunk::new(TenantId::from(tenant), chunk_type, title, text).with_source(title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keyword_embedder_is_deterministic() {
        let embedder = KeywordEmbedder::new();
        let a = embedder.embed("Red Shoes", EmbeddingTask::RetrievalQuery).await.unwrap();
        let b = embedder.embed("red shoes!", EmbeddingTask::RetrievalDocument).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(embedder.call_count(), 2);
    }

    #[tokio::test]
    async fn static_search_filters_and_records() {
        let search = StaticSearch::new()
            .with_hit(chunk("t1", ChunkType::Faq, "a", "x"), 0.2)
            .with_hit(chunk("t1", ChunkType::Faq, "b", "y"), 0.9)
            .with_hit(chunk("t2", ChunkType::Faq, "c", "z"), 0.99);
        let hits = search
            .hybrid_search(&SearchQuery {
                text: "q".into(),
                tenant_id: TenantId::from("t1"),
                chunk_type: ChunkType::Faq,
                embedding: vec![],
                top_k: 5,
                token_budget: None,
                mode: Default::default(),
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.section_title, "b");
        assert_eq!(search.calls().len(), 1);
    }

    #[tokio::test]
    async fn scripted_model_falls_back_to_default() {
        let model = ScriptedChatModel::new(vec![Ok(Completion::blocked(""))]);
        let first = model.complete(CompletionRequest::new("m1", "p")).await.unwrap();
        assert!(first.is_blocked());
        assert_eq!(first.model, "m1");
        let second = model.complete(CompletionRequest::new("m2", "p")).await.unwrap();
        assert!(!second.is_blocked());
        assert_eq!(model.call_count(), 2);
    }
}
