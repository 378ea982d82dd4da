//! Knowledge chunk domain types.
//!
//! A `KnowledgeChunk` is the persisted, retrievable unit of tenant knowledge.
//! A `ContextChunk` is the slimmer view of a chunk that retrieval hands to
//! the budget controller and, eventually, to prompt assembly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of the tenant (business account) owning knowledge and conversations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of source a chunk was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Faq,
    Product,
    Website,
    Manual,
}

impl ChunkType {
    pub const ALL: [ChunkType; 4] = [
        ChunkType::Faq,
        ChunkType::Product,
        ChunkType::Website,
        ChunkType::Manual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::Faq => "faq",
            ChunkType::Product => "product",
            ChunkType::Website => "website",
            ChunkType::Manual => "manual",
        }
    }

    /// Whether sources of this type are long documents that get windowed.
    pub fn is_document(&self) -> bool {
        matches!(self, ChunkType::Website | ChunkType::Manual)
    }
}

impl std::fmt::Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChunkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "faq" => Ok(ChunkType::Faq),
            "product" => Ok(ChunkType::Product),
            "website" | "page" => Ok(ChunkType::Website),
            "manual" => Ok(ChunkType::Manual),
            other => Err(format!("unknown chunk type: {other}")),
        }
    }
}

/// A persisted unit of retrievable knowledge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    /// Unique chunk ID
    pub id: String,

    /// Owning tenant
    pub tenant_id: TenantId,

    /// Source kind
    pub chunk_type: ChunkType,

    /// ID of the originating record (FAQ id, product id, page id...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,

    /// Groups several chunks cut from one source document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,

    pub section_title: String,

    pub full_text: String,

    /// Short extractive summary of `full_text`
    pub tldr: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tldr_embedding: Vec<f32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub full_embedding: Vec<f32>,

    /// ISO language code ("fa", "en")
    pub language: String,

    pub word_count: usize,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    pub created_at: DateTime<Utc>,
}

impl KnowledgeChunk {
    /// Create a chunk with a fresh ID and no embeddings.
    pub fn new(
        tenant_id: TenantId,
        chunk_type: ChunkType,
        section_title: impl Into<String>,
        full_text: impl Into<String>,
    ) -> Self {
        let full_text = full_text.into();
        let word_count = full_text.split_whitespace().count();
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id,
            chunk_type,
            source_id: None,
            document_id: None,
            section_title: section_title.into(),
            full_text,
            tldr: String::new(),
            tldr_embedding: Vec::new(),
            full_embedding: Vec::new(),
            language: "en".into(),
            word_count,
            metadata: serde_json::Map::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_source(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    /// The stored content hash, if ingestion recorded one.
    pub fn content_hash(&self) -> Option<&str> {
        self.metadata.get("content_hash").and_then(|v| v.as_str())
    }

    /// View this chunk as retrieval output with the given relevance score.
    pub fn to_context(&self, score: f32) -> ContextChunk {
        ContextChunk {
            chunk_id: Some(self.id.clone()),
            title: self.section_title.clone(),
            content: self.full_text.clone(),
            chunk_type: self.chunk_type,
            score,
            source_id: self.source_id.clone(),
            word_count: self.word_count,
        }
    }
}

/// A retrieved chunk as handed to budgeting and prompt assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextChunk {
    /// Persisted chunk ID (absent for synthetic context)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,

    pub title: String,

    pub content: String,

    #[serde(rename = "type")]
    pub chunk_type: ChunkType,

    /// Relevance score (similarity, fused, or reranker score)
    pub score: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,

    #[serde(default)]
    pub word_count: usize,
}

/// How a `RetrievalResult` was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMethod {
    SemanticSearch,
    ProductionRag,
    FallbackRecent,
    Failed,
}

impl RetrievalMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMethod::SemanticSearch => "semantic_search",
            RetrievalMethod::ProductionRag => "production_rag",
            RetrievalMethod::FallbackRecent => "fallback_recent",
            RetrievalMethod::Failed => "failed",
        }
    }

    /// Whether the result came from a degraded path.
    pub fn is_degraded(&self) -> bool {
        matches!(self, RetrievalMethod::FallbackRecent | RetrievalMethod::Failed)
    }
}

impl std::fmt::Display for RetrievalMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the context retrievers. Every field is always present;
/// callers branch on empty lists, never on missing keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub primary_context: Vec<ContextChunk>,
    pub secondary_context: Vec<ContextChunk>,
    pub sources_used: Vec<ChunkType>,
    pub total_chunks: usize,
    pub retrieval_method: RetrievalMethod,
}

impl RetrievalResult {
    /// An empty result tagged with `method`.
    pub fn empty(method: RetrievalMethod) -> Self {
        Self {
            primary_context: Vec::new(),
            secondary_context: Vec::new(),
            sources_used: Vec::new(),
            total_chunks: 0,
            retrieval_method: method,
        }
    }

    /// Build a result, deriving `total_chunks` and `sources_used` from the buckets.
    pub fn new(
        primary_context: Vec<ContextChunk>,
        secondary_context: Vec<ContextChunk>,
        method: RetrievalMethod,
    ) -> Self {
        let mut sources_used: Vec<ChunkType> = Vec::new();
        for chunk in primary_context.iter().chain(secondary_context.iter()) {
            if !sources_used.contains(&chunk.chunk_type) {
                sources_used.push(chunk.chunk_type);
            }
        }
        let total_chunks = primary_context.len() + secondary_context.len();
        Self {
            primary_context,
            secondary_context,
            sources_used,
            total_chunks,
            retrieval_method: method,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_chunks == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(chunk_type: ChunkType, title: &str) -> ContextChunk {
        ContextChunk {
            chunk_id: Some(title.into()),
            title: title.into(),
            content: format!("content of {title}"),
            chunk_type,
            score: 0.5,
            source_id: None,
            word_count: 3,
        }
    }

    #[test]
    fn chunk_type_roundtrips_through_str() {
        for t in ChunkType::ALL {
            assert_eq!(t.as_str().parse::<ChunkType>().unwrap(), t);
        }
        assert_eq!("page".parse::<ChunkType>().unwrap(), ChunkType::Website);
        assert!("blog".parse::<ChunkType>().is_err());
    }

    #[test]
    fn tenant_id_converts_from_str_and_string() {
        let borrowed = TenantId::from("shop-1");
        let owned: TenantId = String::from("shop-1").into();
        assert_eq!(borrowed, owned);
        assert_eq!(owned.as_str(), "shop-1");
    }

    #[test]
    fn new_chunk_counts_words() {
        let chunk = KnowledgeChunk::new(
            TenantId::from("t1"),
            ChunkType::Faq,
            "Shipping",
            "Q: Do you ship?\n\nA: Yes, nationwide.",
        );
        assert_eq!(chunk.word_count, 7);
        assert!(chunk.content_hash().is_none());
        assert!(!chunk.id.is_empty());
    }

    #[test]
    fn result_derives_totals_and_sources() {
        let result = RetrievalResult::new(
            vec![ctx(ChunkType::Product, "a"), ctx(ChunkType::Product, "b")],
            vec![ctx(ChunkType::Faq, "c")],
            RetrievalMethod::SemanticSearch,
        );
        assert_eq!(result.total_chunks, 3);
        assert_eq!(result.sources_used, vec![ChunkType::Product, ChunkType::Faq]);
    }

    #[test]
    fn empty_result_serializes_every_field() {
        let json = serde_json::to_value(RetrievalResult::empty(RetrievalMethod::Failed)).unwrap();
        assert_eq!(json["total_chunks"], 0);
        assert_eq!(json["retrieval_method"], "failed");
        assert!(json["primary_context"].as_array().unwrap().is_empty());
        assert!(json["secondary_context"].as_array().unwrap().is_empty());
    }

    #[test]
    fn context_chunk_uses_type_key() {
        let json = serde_json::to_string(&ctx(ChunkType::Website, "about")).unwrap();
        assert!(json.contains("\"type\":\"website\""));
    }
}
