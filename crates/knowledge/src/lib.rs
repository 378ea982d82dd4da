//! Knowledge ingestion for ragline.
//!
//! Turns tenant records (FAQs, products, website pages, manual prompts)
//! into embedded `KnowledgeChunk`s, either in bulk or one record at a time.

pub mod chunker;
pub mod ingest;
pub mod normalize;
pub mod sources;
pub mod stats;
pub mod tldr;

pub use chunker::{chunk_paragraphs, chunk_text, split_sentences};
pub use ingest::{IngestError, IngestionReport, KnowledgeIngestor, RecordOutcome, SourceReport};
pub use normalize::Normalizer;
pub use sources::{
    FaqRecord, InMemoryCatalog, KnowledgeBundle, ManualRecord, PageRecord, ProductRecord,
    SourceCatalog, SourceRecord,
};
pub use stats::{KnowledgeStats, KnowledgeStatsService};
pub use tldr::extract_tldr;
