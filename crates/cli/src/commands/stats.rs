//! `ragline stats`: per-source chunk counts for a tenant.

use super::runtime::{CliResult, load_config, open_stores};
use ragline_core::chunk::TenantId;
use ragline_knowledge::{KnowledgeStats, KnowledgeStatsService};
use std::path::Path;

pub async fn run(config_path: Option<&Path>, tenant: &str) -> CliResult {
    let config = load_config(config_path)?;
    let stores = open_stores(&config).await?;
    let service = KnowledgeStatsService::new(stores.knowledge, stores.cache, config.cache.stats_ttl());

    let tenant = TenantId::from(tenant);
    let stats = service.get(&tenant).await?;
    print!("{}", format_stats(&tenant, &stats));

    if config.store.backend == "sqlite" {
        let db_path = config.store.database_path();
        if let Ok(meta) = std::fs::metadata(&db_path) {
            println!("  DB file:  {} ({:.1} KB)", db_path.display(), meta.len() as f64 / 1024.0);
        }
    }
    Ok(())
}

pub fn format_stats(tenant: &TenantId, stats: &KnowledgeStats) -> String {
    let mut out = format!("Knowledge for {tenant}\n");
    for (chunk_type, count) in &stats.counts {
        out.push_str(&format!("  {:<8} {count:>5}\n", chunk_type.as_str()));
    }
    out.push_str(&format!("  {:<8} {:>5}\n", "total", stats.total));
    if stats.total == 0 {
        out.push_str("  (empty: run `ragline ingest` first)\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragline_core::chunk::ChunkType;

    #[test]
    fn formats_counts_and_total() {
        let mut stats = KnowledgeStats::default();
        stats.counts.insert(ChunkType::Faq, 3);
        stats.counts.insert(ChunkType::Product, 2);
        stats.total = 5;

        let out = format_stats(&TenantId::from("shop-1"), &stats);
        assert!(out.starts_with("Knowledge for shop-1\n"));
        assert!(out.contains("faq"));
        assert!(out.contains("total        5"));
        assert!(!out.contains("empty"));
    }

    #[test]
    fn empty_tenant_gets_a_hint() {
        let out = format_stats(&TenantId::from("new"), &KnowledgeStats::default());
        assert!(out.contains("ragline ingest"));
    }
}
