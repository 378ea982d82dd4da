//! Knowledge ingestion: bulk and incremental.
//!
//! Every path goes through `ingest_record`:
//! 1. Normalize the canonical text and hash it
//! 2. Skip the record if its stored chunks carry the same hash
//! 3. Delete the record's existing chunks
//! 4. Window long documents under a shared `document_id`
//! 5. tldr + two embeddings per chunk; a chunk whose embedding fails is skipped
//! 6. Invalidate the tenant's knowledge-stats cache entry

use crate::chunker::chunk_text;
use crate::normalize::Normalizer;
use crate::sources::{FaqRecord, ManualRecord, PageRecord, ProductRecord, SourceCatalog, SourceRecord};
use crate::stats::{KnowledgeStats, KnowledgeStatsService};
use crate::tldr::extract_tldr;
use ragline_config::{CacheConfig, ChunkingConfig};
use ragline_core::chunk::{ChunkType, KnowledgeChunk, TenantId};
use ragline_core::error::{ProviderError, StoreError};
use ragline_core::provider::{Embedder, EmbeddingTask};
use ragline_core::store::{Cache, KnowledgeStore};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no chunk of source {source_id} could be embedded: {cause}")]
    NothingEmbedded {
        source_id: String,
        cause: ProviderError,
    },
}

/// What happened to one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Written { chunks: usize, failed: usize },
    Unchanged,
}

/// Per-source line of an ingestion report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub chunks: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Records left alone because their content did not change
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct IngestionReport {
    pub sources: BTreeMap<ChunkType, SourceReport>,
}

impl IngestionReport {
    pub fn total_chunks(&self) -> usize {
        self.sources.values().map(|s| s.chunks).sum()
    }

    pub fn all_succeeded(&self) -> bool {
        self.sources.values().all(|s| s.success)
    }
}

/// SHA-256 of the normalized canonical text, hex encoded.
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

pub struct KnowledgeIngestor {
    store: Arc<dyn KnowledgeStore>,
    embedder: Arc<dyn Embedder>,
    stats: KnowledgeStatsService,
    normalizer: Normalizer,
    config: ChunkingConfig,
}

impl KnowledgeIngestor {
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        embedder: Arc<dyn Embedder>,
        cache: Arc<dyn Cache>,
        chunking: &ChunkingConfig,
        cache_config: &CacheConfig,
    ) -> Self {
        let stats = KnowledgeStatsService::new(store.clone(), cache, cache_config.stats_ttl());
        Self {
            store,
            embedder,
            stats,
            normalizer: Normalizer::from_config(chunking),
            config: chunking.clone(),
        }
    }

    /// The stats service sharing this ingestor's store and cache.
    pub fn stats_service(&self) -> KnowledgeStatsService {
        self.stats.clone()
    }

    pub async fn knowledge_stats(&self, tenant: &TenantId) -> Result<KnowledgeStats, StoreError> {
        self.stats.get(tenant).await
    }

    // ── Incremental ──────────────────────────────────────────────────────

    pub async fn chunk_faq(&self, tenant: &TenantId, record: &FaqRecord) -> bool {
        self.chunk_one(tenant, record).await
    }

    pub async fn chunk_product(&self, tenant: &TenantId, record: &ProductRecord) -> bool {
        self.chunk_one(tenant, record).await
    }

    pub async fn chunk_page(&self, tenant: &TenantId, record: &PageRecord) -> bool {
        self.chunk_one(tenant, record).await
    }

    pub async fn chunk_manual(&self, tenant: &TenantId, record: &ManualRecord) -> bool {
        self.chunk_one(tenant, record).await
    }

    async fn chunk_one<R: SourceRecord>(&self, tenant: &TenantId, record: &R) -> bool {
        match self.ingest_record(tenant, record, true).await {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    tenant = %tenant,
                    source = %R::CHUNK_TYPE,
                    source_id = record.source_id(),
                    error = %e,
                    "Incremental chunking failed"
                );
                false
            }
        }
    }

    /// Remove a deleted record's chunks.
    pub async fn delete_source(
        &self,
        tenant: &TenantId,
        chunk_type: ChunkType,
        source_id: &str,
    ) -> Result<usize, StoreError> {
        let deleted = self.store.delete_source(tenant, chunk_type, source_id).await?;
        self.stats.invalidate(tenant);
        info!(tenant = %tenant, source = %chunk_type, source_id, deleted, "Source chunks deleted");
        Ok(deleted)
    }

    // ── Bulk ─────────────────────────────────────────────────────────────

    /// Ingest every record of each requested source type.
    ///
    /// With `force_recreate` the tenant's chunks of each type are purged
    /// first and every record is rebuilt; otherwise unchanged records are
    /// skipped. A failing record never aborts its siblings.
    pub async fn ingest_user_knowledge(
        &self,
        tenant: &TenantId,
        catalog: &dyn SourceCatalog,
        sources: &[ChunkType],
        force_recreate: bool,
    ) -> IngestionReport {
        let mut report = IngestionReport::default();
        for &chunk_type in sources {
            if report.sources.contains_key(&chunk_type) {
                continue;
            }
            let source_report = match chunk_type {
                ChunkType::Faq => match catalog.faqs(tenant).await {
                    Ok(records) => self.ingest_all(tenant, &records, force_recreate).await,
                    Err(e) => catalog_failure(e),
                },
                ChunkType::Product => match catalog.products(tenant).await {
                    Ok(records) => self.ingest_all(tenant, &records, force_recreate).await,
                    Err(e) => catalog_failure(e),
                },
                ChunkType::Website => match catalog.pages(tenant).await {
                    Ok(records) => self.ingest_all(tenant, &records, force_recreate).await,
                    Err(e) => catalog_failure(e),
                },
                ChunkType::Manual => match catalog.manuals(tenant).await {
                    Ok(records) => self.ingest_all(tenant, &records, force_recreate).await,
                    Err(e) => catalog_failure(e),
                },
            };
            info!(
                tenant = %tenant,
                source = %chunk_type,
                chunks = source_report.chunks,
                skipped = source_report.skipped,
                success = source_report.success,
                "Source ingested"
            );
            report.sources.insert(chunk_type, source_report);
        }
        report
    }

    async fn ingest_all<R: SourceRecord>(
        &self,
        tenant: &TenantId,
        records: &[R],
        force_recreate: bool,
    ) -> SourceReport {
        let mut report = SourceReport {
            success: true,
            ..Default::default()
        };

        if force_recreate {
            match self.store.delete_type(tenant, R::CHUNK_TYPE).await {
                Ok(purged) => {
                    self.stats.invalidate(tenant);
                    debug!(tenant = %tenant, source = %R::CHUNK_TYPE, purged, "Purged before rebuild");
                }
                Err(e) => return catalog_failure(e),
            }
        }

        let mut failures = Vec::new();
        for record in records {
            match self.ingest_record(tenant, record, !force_recreate).await {
                Ok(RecordOutcome::Written { chunks, .. }) => report.chunks += chunks,
                Ok(RecordOutcome::Unchanged) => report.skipped += 1,
                Err(e) => failures.push(format!("{}: {e}", record.source_id())),
            }
        }

        if !failures.is_empty() {
            report.success = false;
            report.error = Some(format!(
                "{} of {} records failed; first: {}",
                failures.len(),
                records.len(),
                failures[0]
            ));
        }
        report
    }

    // ── Core ─────────────────────────────────────────────────────────────

    /// Rebuild the chunks of one record.
    pub async fn ingest_record<R: SourceRecord>(
        &self,
        tenant: &TenantId,
        record: &R,
        skip_unchanged: bool,
    ) -> Result<RecordOutcome, IngestError> {
        let chunk_type = R::CHUNK_TYPE;
        let source_id = record.source_id();
        let text = self.normalizer.normalize(&record.canonical_text());
        let hash = content_hash(&text);

        if skip_unchanged {
            let existing = self.store.list_source(tenant, chunk_type, source_id).await?;
            if is_complete(&existing, &hash) {
                debug!(tenant = %tenant, source = %chunk_type, source_id, "Source unchanged, skipping");
                return Ok(RecordOutcome::Unchanged);
            }
            if !existing.is_empty() {
                debug!(tenant = %tenant, source = %chunk_type, source_id, "Source stale or partial, rebuilding");
            }
        }

        let deleted = self.store.delete_source(tenant, chunk_type, source_id).await?;
        if deleted > 0 {
            self.stats.invalidate(tenant);
        }

        let pieces = if chunk_type.is_document() {
            chunk_text(&text, self.config.chunk_size, self.config.overlap)
        } else {
            vec![text.clone()]
        };
        let total = pieces.len();
        let document_id = chunk_type.is_document().then(|| Uuid::new_v4().to_string());
        let language = self.normalizer.language(&text);
        let title = record.title();

        let mut written = 0;
        let mut last_error = None;
        for (index, piece) in pieces.into_iter().enumerate() {
            let section_title = if total > 1 {
                format!("{title} ({}/{total})", index + 1)
            } else {
                title.clone()
            };
            let tldr = extract_tldr(&piece, self.config.tldr_max_words);

            let embeddings = match self.embed_pair(&tldr, &piece).await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(
                        tenant = %tenant,
                        source = %chunk_type,
                        source_id,
                        chunk_index = index,
                        error = %e,
                        "Embedding failed, chunk skipped"
                    );
                    last_error = Some(e);
                    continue;
                }
            };

            let mut chunk = KnowledgeChunk::new(tenant.clone(), chunk_type, section_title, piece)
                .with_source(source_id);
            chunk.document_id = document_id.clone();
            chunk.tldr = tldr;
            chunk.tldr_embedding = embeddings.0;
            chunk.full_embedding = embeddings.1;
            chunk.language = language.to_string();
            chunk.metadata.insert("content_hash".into(), hash.clone().into());
            chunk.metadata.insert("chunk_index".into(), index.into());
            chunk.metadata.insert("chunk_total".into(), total.into());

            self.store.insert(chunk).await?;
            written += 1;
        }

        if written > 0 {
            self.stats.invalidate(tenant);
        }

        let failed = total - written;
        match last_error {
            Some(cause) if written == 0 => Err(IngestError::NothingEmbedded {
                source_id: source_id.to_string(),
                cause,
            }),
            _ => {
                debug!(tenant = %tenant, source = %chunk_type, source_id, written, failed, "Record chunked");
                Ok(RecordOutcome::Written {
                    chunks: written,
                    failed,
                })
            }
        }
    }

    async fn embed_pair(&self, tldr: &str, full: &str) -> Result<(Vec<f32>, Vec<f32>), ProviderError> {
        let tldr_embedding = self.embedder.embed(tldr, EmbeddingTask::RetrievalDocument).await?;
        let full_embedding = self.embedder.embed(full, EmbeddingTask::RetrievalDocument).await?;
        Ok((tldr_embedding, full_embedding))
    }
}

/// True when `existing` holds every chunk of the record at `hash`.
///
/// A record whose earlier ingestion lost chunks to embedding failures is
/// never complete, so the next run rebuilds it.
fn is_complete(existing: &[KnowledgeChunk], hash: &str) -> bool {
    let Some(total) = existing
        .first()
        .and_then(|c| c.metadata.get("chunk_total"))
        .and_then(|v| v.as_u64())
    else {
        return false;
    };
    if existing.len() as u64 != total || existing.iter().any(|c| c.content_hash() != Some(hash)) {
        return false;
    }
    let mut seen = vec![false; existing.len()];
    for chunk in existing {
        match chunk.metadata.get("chunk_index").and_then(|v| v.as_u64()) {
            Some(index) if index < total && !seen[index as usize] => seen[index as usize] = true,
            _ => return false,
        }
    }
    true
}

fn catalog_failure(error: StoreError) -> SourceReport {
    SourceReport {
        chunks: 0,
        success: false,
        error: Some(error.to_string()),
        skipped: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{InMemoryCatalog, KnowledgeBundle};
    use ragline_core::testing::{FailingEmbedder, KeywordEmbedder};
    use ragline_store::{InMemoryKnowledgeStore, TtlCache};

    struct Fixture {
        store: Arc<InMemoryKnowledgeStore>,
        cache: Arc<TtlCache>,
        ingestor: KnowledgeIngestor,
    }

    fn fixture_with(embedder: Arc<dyn Embedder>, chunking: ChunkingConfig) -> Fixture {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let cache = Arc::new(TtlCache::default());
        let ingestor = KnowledgeIngestor::new(
            store.clone(),
            embedder,
            cache.clone(),
            &chunking,
            &CacheConfig::default(),
        );
        Fixture {
            store,
            cache,
            ingestor,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(KeywordEmbedder::new()), ChunkingConfig::default())
    }

    fn tenant() -> TenantId {
        TenantId::from("shop_1")
    }

    fn product(id: &str, price: &str) -> ProductRecord {
        ProductRecord {
            id: id.into(),
            name: "Trail Runner".into(),
            product_type: Some("Shoes".into()),
            description: "Light running shoe for rocky trails.".into(),
            price: Some(price.into()),
            ..Default::default()
        }
    }

    fn faq(id: &str, question: &str) -> FaqRecord {
        FaqRecord {
            id: id.into(),
            question: question.into(),
            answer: "Yes, within three business days.".into(),
        }
    }

    #[tokio::test]
    async fn chunk_product_is_idempotent() {
        let f = fixture();
        let p = product("p1", "40 USD");
        assert!(f.ingestor.chunk_product(&tenant(), &p).await);
        let once = f.store.list(&tenant(), ChunkType::Product).await.unwrap();

        assert!(f.ingestor.chunk_product(&tenant(), &p).await);
        let twice = f.store.list(&tenant(), ChunkType::Product).await.unwrap();

        assert_eq!(once.len(), 1);
        assert_eq!(twice.len(), once.len());
        assert_eq!(twice[0].full_text, once[0].full_text);
        assert!(once[0].full_text.starts_with("Product: Trail Runner\nType: Shoes"));
        assert_eq!(once[0].tldr_embedding.len(), ragline_core::testing::KEYWORD_DIM);
        assert!(!once[0].full_embedding.is_empty());
    }

    #[tokio::test]
    async fn changed_record_replaces_chunks() {
        let f = fixture();
        f.ingestor.chunk_product(&tenant(), &product("p1", "40 USD")).await;
        f.ingestor.chunk_product(&tenant(), &product("p1", "45 USD")).await;
        let chunks = f.store.list(&tenant(), ChunkType::Product).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].full_text.contains("45 USD"));
    }

    #[tokio::test]
    async fn long_pages_share_document_id() {
        let chunking = ChunkingConfig {
            chunk_size: 20,
            overlap: 5,
            ..Default::default()
        };
        let f = fixture_with(Arc::new(KeywordEmbedder::new()), chunking);
        let page = PageRecord {
            id: "about".into(),
            title: "About us".into(),
            url: None,
            content: (0..60).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" "),
        };
        assert!(f.ingestor.chunk_page(&tenant(), &page).await);

        let chunks = f.store.list_source(&tenant(), ChunkType::Website, "about").await.unwrap();
        assert!(chunks.len() > 1);
        let doc = chunks[0].document_id.clone().unwrap();
        assert!(chunks.iter().all(|c| c.document_id.as_deref() == Some(doc.as_str())));
        assert_eq!(chunks[0].metadata["chunk_index"], 0);
        assert_eq!(chunks[0].metadata["chunk_total"], chunks.len());
        assert!(chunks.iter().all(|c| c.tldr.split_whitespace().count() <= 50));
    }

    #[tokio::test]
    async fn partial_document_is_rebuilt_on_next_run() {
        let chunking = ChunkingConfig {
            chunk_size: 20,
            overlap: 5,
            ..Default::default()
        };
        let f = fixture_with(Arc::new(FailingEmbedder::when_contains("word45")), chunking.clone());
        let page = PageRecord {
            id: "about".into(),
            title: "About us".into(),
            url: None,
            content: (0..60).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" "),
        };
        assert!(f.ingestor.chunk_page(&tenant(), &page).await);
        let partial = f.store.list_source(&tenant(), ChunkType::Website, "about").await.unwrap();
        let total = partial[0].metadata["chunk_total"].as_u64().unwrap() as usize;
        assert!(partial.len() < total);

        let healthy = KnowledgeIngestor::new(
            f.store.clone(),
            Arc::new(KeywordEmbedder::new()),
            f.cache.clone(),
            &chunking,
            &CacheConfig::default(),
        );
        let outcome = healthy.ingest_record(&tenant(), &page, true).await.unwrap();
        assert!(matches!(outcome, RecordOutcome::Written { failed: 0, .. }));

        let repaired = f.store.list_source(&tenant(), ChunkType::Website, "about").await.unwrap();
        assert_eq!(repaired.len(), total);
        assert!(matches!(
            healthy.ingest_record(&tenant(), &page, true).await.unwrap(),
            RecordOutcome::Unchanged
        ));
    }

    #[tokio::test]
    async fn embedding_failure_skips_only_that_record() {
        let f = fixture_with(
            Arc::new(FailingEmbedder::when_contains("refund")),
            ChunkingConfig::default(),
        );
        let bundle = KnowledgeBundle {
            faqs: vec![
                faq("f1", "Do you ship abroad?"),
                faq("f2", "How do I get a refund?"),
                faq("f3", "Are you open on Fridays?"),
            ],
            ..Default::default()
        };
        let catalog = InMemoryCatalog::new().with_bundle(tenant(), bundle);

        let report = f
            .ingestor
            .ingest_user_knowledge(&tenant(), &catalog, &[ChunkType::Faq], false)
            .await;

        let faq_report = &report.sources[&ChunkType::Faq];
        assert_eq!(faq_report.chunks, 2);
        assert!(!faq_report.success);
        assert!(faq_report.error.as_deref().unwrap().contains("f2"));
        assert_eq!(f.store.count(&tenant(), Some(ChunkType::Faq)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn bulk_rerun_skips_unchanged_and_force_rebuilds() {
        let f = fixture();
        let bundle = KnowledgeBundle {
            faqs: vec![faq("f1", "Do you ship abroad?")],
            products: vec![product("p1", "40 USD")],
            ..Default::default()
        };
        let catalog = InMemoryCatalog::new().with_bundle(tenant(), bundle);
        let sources = [ChunkType::Faq, ChunkType::Product];

        let first = f.ingestor.ingest_user_knowledge(&tenant(), &catalog, &sources, false).await;
        assert_eq!(first.total_chunks(), 2);
        assert!(first.all_succeeded());

        let second = f.ingestor.ingest_user_knowledge(&tenant(), &catalog, &sources, false).await;
        assert_eq!(second.total_chunks(), 0);
        assert_eq!(second.sources[&ChunkType::Faq].skipped, 1);

        // An orphan chunk whose record no longer exists
        f.store
            .insert(ragline_core::testing::chunk("shop_1", ChunkType::Faq, "gone", "old"))
            .await
            .unwrap();
        let forced = f.ingestor.ingest_user_knowledge(&tenant(), &catalog, &sources, true).await;
        assert_eq!(forced.total_chunks(), 2);
        assert_eq!(f.store.count(&tenant(), None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn report_serializes_per_source() {
        let f = fixture();
        let catalog = InMemoryCatalog::new();
        let report = f
            .ingestor
            .ingest_user_knowledge(&tenant(), &catalog, &[ChunkType::Manual], false)
            .await;
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["manual"]["chunks"], 0);
        assert_eq!(json["manual"]["success"], true);
        assert!(json["manual"].get("error").is_none());
    }

    #[tokio::test]
    async fn writes_invalidate_stats() {
        let f = fixture();
        let before = f.ingestor.knowledge_stats(&tenant()).await.unwrap();
        assert_eq!(before.total, 0);

        f.ingestor.chunk_faq(&tenant(), &faq("f1", "Do you ship?")).await;
        let after = f.ingestor.knowledge_stats(&tenant()).await.unwrap();
        assert_eq!(after.count(ChunkType::Faq), 1);

        f.ingestor.delete_source(&tenant(), ChunkType::Faq, "f1").await.unwrap();
        assert_eq!(f.ingestor.knowledge_stats(&tenant()).await.unwrap().total, 0);
        assert!(f.cache.stats().misses >= 3);
    }

    #[tokio::test]
    async fn persian_text_is_normalized_before_storage() {
        let f = fixture();
        let record = FaqRecord {
            id: "f1".into(),
            question: "ارسال به كيش دارید؟".into(),
            answer: "بله، ۳ روزه".into(),
        };
        assert!(f.ingestor.chunk_faq(&tenant(), &record).await);
        let chunks = f.store.list(&tenant(), ChunkType::Faq).await.unwrap();
        assert_eq!(chunks[0].language, "fa");
        assert!(chunks[0].full_text.contains("کیش"));
        assert!(chunks[0].full_text.contains("3 روزه"));
    }
}
