//! # ragline core
//!
//! Domain types, traits, and error definitions for the ragline context pipeline.
//! This crate has **no I/O dependencies**: it defines the domain model that
//! the store, provider, retrieval, session and engine crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Testing with the doubles in [`testing`]
//! - Clean dependency graph (all crates depend inward on core)

pub mod chunk;
pub mod error;
pub mod message;
pub mod provider;
pub mod routing;
pub mod search;
pub mod store;
pub mod token;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// Re-export key types at crate root for ergonomics
pub use chunk::{ChunkType, ContextChunk, KnowledgeChunk, RetrievalMethod, RetrievalResult, TenantId};
pub use error::{Error, ProviderError, Result, StoreError};
pub use message::{ConversationId, ConversationMessage, Role, SessionMemory};
pub use provider::{ChatModel, Completion, CompletionRequest, Embedder, EmbeddingTask, Reranker};
pub use routing::{Intent, RoutingDecision, TokenBudgets};
pub use search::{HybridSearch, SearchHit, SearchMode, SearchQuery};
pub use store::{Cache, KnowledgeStore, SessionStore};
pub use token::TokenCounter;
