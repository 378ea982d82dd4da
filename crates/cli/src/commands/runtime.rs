//! Shared wiring for commands: config loading, stores and model services.

use ragline_config::AppConfig;
use ragline_core::store::{Cache, KnowledgeStore, SessionStore};
use ragline_core::token::TokenCounter;
use ragline_store::{InMemoryKnowledgeStore, InMemorySessionStore, SqliteStore, TtlCache};
use std::path::Path;
use std::sync::Arc;

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Load the config from `path` (or the default location) with env overrides.
pub fn load_config(path: Option<&Path>) -> CliResult<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    };
    Ok(config.map_err(|e| format!("Failed to load config: {e}"))?)
}

pub struct Stores {
    pub knowledge: Arc<dyn KnowledgeStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub cache: Arc<dyn Cache>,
}

/// Open the configured backend. `in_memory` lives only for this process.
pub async fn open_stores(config: &AppConfig) -> CliResult<Stores> {
    let cache: Arc<dyn Cache> = Arc::new(TtlCache::from_config(&config.cache));
    match config.store.backend.as_str() {
        "in_memory" => Ok(Stores {
            knowledge: Arc::new(InMemoryKnowledgeStore::new()),
            sessions: Arc::new(InMemorySessionStore::new()),
            cache,
        }),
        "sqlite" => {
            let path = config.store.database_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let db = Arc::new(SqliteStore::new(&format!("sqlite://{}", path.display())).await?);
            Ok(Stores {
                knowledge: db.clone(),
                sessions: db,
                cache,
            })
        }
        other => Err(format!("Unknown store backend '{other}' (expected sqlite or in_memory)").into()),
    }
}

/// Token counter from config: BPE when built with `bpe` and a tokenizer is set.
pub fn token_counter(config: &AppConfig) -> Arc<TokenCounter> {
    #[cfg(feature = "bpe")]
    if let Some(path) = &config.provider.tokenizer_path {
        return Arc::new(TokenCounter::from_tokenizer_file(
            path,
            ragline_core::token::BUDGET_WORD_MULTIPLIER,
        ));
    }
    #[cfg(not(feature = "bpe"))]
    let _ = config;
    Arc::new(TokenCounter::default())
}
