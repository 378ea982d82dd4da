//! Model-service traits: the abstraction over embedding, chat and rerank backends.
//!
//! The pipeline treats every model as a black box behind one of these traits.
//! Implementations: OpenAI-compatible HTTP clients, `/rerank` HTTP endpoints,
//! and scripted doubles for tests.

use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What an embedding is going to be used for. Some embedding models use
/// different projections for stored documents and search queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingTask {
    RetrievalDocument,
    RetrievalQuery,
}

/// Produces a dense vector for a text.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    async fn embed(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>, ProviderError>;
}

/// A single-turn chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The model to use (e.g., "gpt-4o-mini")
    pub model: String,

    /// Optional system instruction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// The user prompt
    pub prompt: String,

    /// Temperature (0.0 = deterministic)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Ask the backend for a JSON object response
    #[serde(default)]
    pub json_response: bool,
}

fn default_temperature() -> f32 {
    0.3
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: None,
            prompt: prompt.into(),
            temperature: default_temperature(),
            max_tokens: None,
            json_response: false,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn json(mut self) -> Self {
        self.json_response = true;
        self
    }

    /// Same request against a different model.
    pub fn for_model(&self, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..self.clone()
        }
    }
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    /// The backend withheld content for safety reasons
    ContentFilter,
    Other,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A chat completion result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub finish_reason: FinishReason,
    /// Which model actually responded
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl Completion {
    pub fn text(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finish_reason: FinishReason::Stop,
            model: model.into(),
            usage: None,
        }
    }

    pub fn blocked(model: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            finish_reason: FinishReason::ContentFilter,
            model: model.into(),
            usage: None,
        }
    }

    /// No usable content: either a safety block or an empty body.
    pub fn is_blocked(&self) -> bool {
        self.finish_reason == FinishReason::ContentFilter || self.text.trim().is_empty()
    }
}

/// Single-turn chat completion backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError>;
}

/// Reranker capacity variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankModel {
    Base,
    Large,
}

/// One reranked document: its index in the request and the new score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RerankScore {
    pub index: usize,
    pub score: f32,
}

/// Cross-encoder reranker.
#[async_trait]
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;

    /// Score `documents` against `query`, returning at most `top_k` entries
    /// ordered by descending score.
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_k: usize,
        model: RerankModel,
    ) -> Result<Vec<RerankScore>, ProviderError>;
}
