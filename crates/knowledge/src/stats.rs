//! Cached per-tenant knowledge statistics.
//!
//! The router reads these to demote empty sources; ingestion invalidates the
//! entry whenever it writes or deletes chunks.

use ragline_core::chunk::{ChunkType, TenantId};
use ragline_core::error::StoreError;
use ragline_core::store::{Cache, KnowledgeStore, knowledge_stats_key};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Chunk counts per source type for one tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeStats {
    pub counts: BTreeMap<ChunkType, usize>,
    pub total: usize,
}

impl KnowledgeStats {
    pub fn count(&self, chunk_type: ChunkType) -> usize {
        self.counts.get(&chunk_type).copied().unwrap_or(0)
    }

    pub fn has(&self, chunk_type: ChunkType) -> bool {
        self.count(chunk_type) > 0
    }
}

#[derive(Clone)]
pub struct KnowledgeStatsService {
    store: Arc<dyn KnowledgeStore>,
    cache: Arc<dyn Cache>,
    ttl: Duration,
}

impl KnowledgeStatsService {
    pub fn new(store: Arc<dyn KnowledgeStore>, cache: Arc<dyn Cache>, ttl: Duration) -> Self {
        Self { store, cache, ttl }
    }

    /// Cached stats, computed from the store on a miss.
    pub async fn get(&self, tenant: &TenantId) -> Result<KnowledgeStats, StoreError> {
        let key = knowledge_stats_key(tenant);
        if let Some(value) = self.cache.get(&key) {
            match serde_json::from_value::<KnowledgeStats>(value) {
                Ok(stats) => return Ok(stats),
                Err(e) => debug!(tenant = %tenant, error = %e, "Discarding malformed stats entry"),
            }
        }

        let mut stats = KnowledgeStats::default();
        for chunk_type in ChunkType::ALL {
            let n = self.store.count(tenant, Some(chunk_type)).await?;
            stats.counts.insert(chunk_type, n);
            stats.total += n;
        }

        if let Ok(value) = serde_json::to_value(&stats) {
            self.cache.set(&key, value, self.ttl);
        }
        debug!(tenant = %tenant, total = stats.total, "Knowledge stats computed");
        Ok(stats)
    }

    pub fn invalidate(&self, tenant: &TenantId) {
        self.cache.delete(&knowledge_stats_key(tenant));
    }
}
