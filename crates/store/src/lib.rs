//! Persistence backends for ragline.
//!
//! - `in_memory`: Vec/HashMap stores for tests and dry runs
//! - `sqlite`: SQLite via sqlx (feature `sqlite`, on by default)
//! - `hybrid`: dense + BM25 search over any `KnowledgeStore`
//! - `cache`: moka-backed TTL cache

pub mod cache;
pub mod hybrid;
pub mod in_memory;
pub mod lexical;
pub mod vector;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use cache::{CacheStats, TtlCache};
pub use hybrid::LocalHybridSearch;
pub use in_memory::{InMemoryKnowledgeStore, InMemorySessionStore};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
