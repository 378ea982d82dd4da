//! `ragline ingest`: chunk and embed a tenant's knowledge bundle.

use super::runtime::{CliResult, load_config, open_stores};
use ragline_core::chunk::{ChunkType, TenantId};
use ragline_knowledge::{InMemoryCatalog, IngestionReport, KnowledgeBundle, KnowledgeIngestor};
use ragline_providers::build_from_settings;
use std::path::Path;
use tracing::info;

pub async fn run(config_path: Option<&Path>, tenant: &str, file: &Path, force: bool) -> CliResult {
    let config = load_config(config_path)?;
    let json = std::fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {}: {e}", file.display()))?;
    let bundle = KnowledgeBundle::from_json(&json)?;

    let services = build_from_settings(&config.provider)?;
    let stores = open_stores(&config).await?;
    let ingestor = KnowledgeIngestor::new(
        stores.knowledge,
        services.embedder,
        stores.cache,
        &config.chunking,
        &config.cache,
    );

    let tenant = TenantId::from(tenant);
    let report = ingest_bundle(&ingestor, &tenant, bundle, force).await;
    print_report(&tenant, &report);

    if !report.all_succeeded() {
        return Err("Some sources failed to ingest".into());
    }
    Ok(())
}

/// Ingest every source type present in `bundle`.
pub async fn ingest_bundle(
    ingestor: &KnowledgeIngestor,
    tenant: &TenantId,
    bundle: KnowledgeBundle,
    force: bool,
) -> IngestionReport {
    let catalog = InMemoryCatalog::new().with_bundle(tenant.clone(), bundle);
    let report = ingestor
        .ingest_user_knowledge(tenant, &catalog, &ChunkType::ALL, force)
        .await;
    info!(
        tenant = %tenant,
        chunks = report.total_chunks(),
        success = report.all_succeeded(),
        "Bundle ingested"
    );
    report
}

fn print_report(tenant: &TenantId, report: &IngestionReport) {
    println!("Ingestion report for {tenant}");
    println!("------------------------------");
    for (chunk_type, source) in &report.sources {
        let status = if source.success { "ok" } else { "FAILED" };
        println!(
            "  {:<8} {:>4} chunks  {:>4} unchanged  {status}",
            chunk_type.as_str(),
            source.chunks,
            source.skipped
        );
        if let Some(error) = &source.error {
            println!("           {error}");
        }
    }
    println!("  total    {:>4} chunks", report.total_chunks());
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragline_config::{CacheConfig, ChunkingConfig};
    use ragline_core::store::KnowledgeStore;
    use ragline_core::testing::KeywordEmbedder;
    use ragline_store::{InMemoryKnowledgeStore, TtlCache};
    use std::sync::Arc;

    const BUNDLE: &str = r#"{
        "faqs": [{"id": "f1", "question": "Do you ship abroad?", "answer": "Only within the country."}],
        "products": [{"id": "p1", "name": "Rain jacket", "type": "outerwear", "price": "55 dollars"}]
    }"#;

    #[tokio::test]
    async fn bundle_file_is_ingested_and_reingest_is_skipped() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let ingestor = KnowledgeIngestor::new(
            store.clone(),
            Arc::new(KeywordEmbedder::new()),
            Arc::new(TtlCache::default()),
            &ChunkingConfig::default(),
            &CacheConfig::default(),
        );
        let tenant = TenantId::from("shop-9");

        let bundle = KnowledgeBundle::from_json(BUNDLE).unwrap();
        let report = ingest_bundle(&ingestor, &tenant, bundle.clone(), false).await;
        assert!(report.all_succeeded());
        assert_eq!(report.total_chunks(), 2);
        assert_eq!(store.count(&tenant, None).await.unwrap(), 2);

        let again = ingest_bundle(&ingestor, &tenant, bundle, false).await;
        assert_eq!(again.total_chunks(), 0);
        assert_eq!(again.sources[&ChunkType::Faq].skipped, 1);
        assert_eq!(store.count(&tenant, None).await.unwrap(), 2);
    }
}
