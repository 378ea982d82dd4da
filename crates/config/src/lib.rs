//! Configuration loading, validation, and management for ragline.
//!
//! Loads configuration from `~/.ragline/config.toml` with environment
//! variable overrides. Validates all settings at startup.
//!
//! Every threshold and budget the pipeline uses lives here. Components take
//! the section they need by reference at construction time and never mutate it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.ragline/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model service endpoints and credentials
    #[serde(default)]
    pub provider: ProviderSettings,

    /// Knowledge and session persistence
    #[serde(default)]
    pub store: StoreConfig,

    /// Knowledge-stats cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Chunking and normalization
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Baseline context retriever
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Production RAG pipeline
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Token budget controller
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Session memory
    #[serde(default)]
    pub session: SessionConfig,
}

fn default_true() -> bool {
    true
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

// ── Provider ──────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Retried once when the chat model withholds content
    #[serde(default = "default_fallback_chat_model")]
    pub fallback_chat_model: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Base URL of a `/rerank` endpoint; reranking is off when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_url: Option<String>,

    #[serde(default = "default_rerank_base_model")]
    pub rerank_base_model: String,

    #[serde(default = "default_rerank_large_model")]
    pub rerank_large_model: String,

    /// Per-call timeout for embedding, chat and rerank requests
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// `tokenizer.json` for exact token counts (requires the `bpe` feature)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer_path: Option<PathBuf>,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_chat_model() -> String {
    "gpt-4o-mini".into()
}
fn default_fallback_chat_model() -> String {
    "gpt-4o".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_rerank_base_model() -> String {
    "bge-reranker-base".into()
}
fn default_rerank_large_model() -> String {
    "bge-reranker-large".into()
}
fn default_timeout_secs() -> u64 {
    20
}

impl ProviderSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            chat_model: default_chat_model(),
            fallback_chat_model: default_fallback_chat_model(),
            embedding_model: default_embedding_model(),
            rerank_url: None,
            rerank_base_model: default_rerank_base_model(),
            rerank_large_model: default_rerank_large_model(),
            timeout_secs: default_timeout_secs(),
            tokenizer_path: None,
        }
    }
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("chat_model", &self.chat_model)
            .field("fallback_chat_model", &self.fallback_chat_model)
            .field("embedding_model", &self.embedding_model)
            .field("rerank_url", &self.rerank_url)
            .field("rerank_base_model", &self.rerank_base_model)
            .field("rerank_large_model", &self.rerank_large_model)
            .field("timeout_secs", &self.timeout_secs)
            .field("tokenizer_path", &self.tokenizer_path)
            .finish()
    }
}

// ── Store & cache ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "sqlite" or "in_memory"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// SQLite database file; defaults to `~/.ragline/ragline.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_store_backend() -> String {
    "sqlite".into()
}

impl StoreConfig {
    pub fn database_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("ragline.db"))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Lifetime of the per-tenant knowledge-stats entry
    #[serde(default = "default_stats_ttl_secs")]
    pub stats_ttl_secs: u64,

    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
}

fn default_stats_ttl_secs() -> u64 {
    3600
}
fn default_max_entries() -> u64 {
    10_000
}

impl CacheConfig {
    pub fn stats_ttl(&self) -> Duration {
        Duration::from_secs(self.stats_ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stats_ttl_secs: default_stats_ttl_secs(),
            max_entries: default_max_entries(),
        }
    }
}

// ── Chunking ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Words per window for long documents
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Words shared by consecutive windows
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,

    #[serde(default = "default_tldr_max_words")]
    pub tldr_max_words: usize,

    /// Fraction of sampled letters that must be Arabic-script to normalize
    #[serde(default = "default_script_threshold")]
    pub script_threshold: f32,

    /// Letters sampled for script detection
    #[serde(default = "default_script_sample")]
    pub script_sample: usize,
}

fn default_chunk_size() -> usize {
    300
}
fn default_chunk_overlap() -> usize {
    50
}
fn default_tldr_max_words() -> usize {
    50
}
fn default_script_threshold() -> f32 {
    0.3
}
fn default_script_sample() -> usize {
    500
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_chunk_overlap(),
            tldr_max_words: default_tldr_max_words(),
            script_threshold: default_script_threshold(),
            script_sample: default_script_sample(),
        }
    }
}

// ── Retrieval ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_primary_top_k")]
    pub primary_top_k: usize,

    #[serde(default = "default_secondary_top_k")]
    pub secondary_top_k: usize,

    /// Secondary sources are searched only when their budget exceeds this
    #[serde(default = "default_secondary_budget_floor")]
    pub secondary_budget_floor: usize,

    /// Candidates scoring below this are discarded
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,

    #[serde(default = "default_fallback_primary_limit")]
    pub fallback_primary_limit: usize,

    #[serde(default = "default_fallback_secondary_limit")]
    pub fallback_secondary_limit: usize,

    /// Placeholder score of fallback chunks
    #[serde(default = "default_fallback_score")]
    pub fallback_score: f32,

    /// Weight of vector similarity in hybrid scores
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f32,

    /// Weight of keyword relevance in hybrid scores
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f32,
}

fn default_primary_top_k() -> usize {
    5
}
fn default_secondary_top_k() -> usize {
    3
}
fn default_secondary_budget_floor() -> usize {
    50
}
fn default_min_similarity() -> f32 {
    0.1
}
fn default_fallback_primary_limit() -> usize {
    3
}
fn default_fallback_secondary_limit() -> usize {
    2
}
fn default_fallback_score() -> f32 {
    0.5
}
fn default_vector_weight() -> f32 {
    0.7
}
fn default_keyword_weight() -> f32 {
    0.3
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            primary_top_k: default_primary_top_k(),
            secondary_top_k: default_secondary_top_k(),
            secondary_budget_floor: default_secondary_budget_floor(),
            min_similarity: default_min_similarity(),
            fallback_primary_limit: default_fallback_primary_limit(),
            fallback_secondary_limit: default_fallback_secondary_limit(),
            fallback_score: default_fallback_score(),
            vector_weight: default_vector_weight(),
            keyword_weight: default_keyword_weight(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Use the production pipeline instead of the baseline retriever
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_dense_top_k")]
    pub dense_top_k: usize,

    #[serde(default = "default_sparse_top_k")]
    pub sparse_top_k: usize,

    #[serde(default = "default_max_secondary_sources")]
    pub max_secondary_sources: usize,

    #[serde(default = "default_true")]
    pub rerank_enabled: bool,

    /// Rerank only when more unique candidates than this remain
    #[serde(default = "default_rerank_min_candidates")]
    pub rerank_min_candidates: usize,

    /// Candidates kept after reranking (or its fallback)
    #[serde(default = "default_final_top_k")]
    pub final_top_k: usize,

    /// Complexity at or above which the large reranker is used
    #[serde(default = "default_complexity_threshold")]
    pub complexity_threshold: f32,

    /// Apply `retrieval.min_similarity` to dense primary hits before fusion
    #[serde(default = "default_true")]
    pub apply_min_similarity: bool,
}

fn default_dense_top_k() -> usize {
    20
}
fn default_sparse_top_k() -> usize {
    15
}
fn default_max_secondary_sources() -> usize {
    3
}
fn default_rerank_min_candidates() -> usize {
    5
}
fn default_final_top_k() -> usize {
    8
}
fn default_complexity_threshold() -> f32 {
    0.6
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dense_top_k: default_dense_top_k(),
            sparse_top_k: default_sparse_top_k(),
            max_secondary_sources: default_max_secondary_sources(),
            rerank_enabled: true,
            rerank_min_candidates: default_rerank_min_candidates(),
            final_top_k: default_final_top_k(),
            complexity_threshold: default_complexity_threshold(),
            apply_min_similarity: true,
        }
    }
}

// ── Budget ────────────────────────────────────────────────────────────────

/// Per-section token budgets, tuned for Persian-heavy prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Hard ceiling for the whole prompt
    #[serde(default = "default_max_total_tokens")]
    pub max_total_tokens: usize,

    #[serde(default = "default_safety_margin")]
    pub safety_margin: usize,

    #[serde(default = "default_system_prompt_tokens")]
    pub system_prompt: usize,

    #[serde(default = "default_bio_context_tokens")]
    pub bio_context: usize,

    #[serde(default = "default_customer_info_tokens")]
    pub customer_info: usize,

    #[serde(default = "default_conversation_tokens")]
    pub conversation: usize,

    #[serde(default = "default_primary_context_tokens")]
    pub primary_context: usize,

    #[serde(default = "default_secondary_context_tokens")]
    pub secondary_context: usize,

    /// The user query is truncated beyond this
    #[serde(default = "default_user_query_tokens")]
    pub user_query: usize,

    /// Below this knowledge headroom the conversation is shrunk
    #[serde(default = "default_min_knowledge_tokens")]
    pub min_knowledge_tokens: usize,

    #[serde(default = "default_conversation_shrink")]
    pub conversation_shrink: usize,

    /// Share of knowledge headroom given to primary context
    #[serde(default = "default_primary_share")]
    pub primary_share: f32,

    /// Items considered per knowledge bucket
    #[serde(default = "default_max_context_items")]
    pub max_context_items: usize,

    /// A system prompt paragraph containing any of these is a critical rule
    #[serde(default = "default_critical_markers")]
    pub critical_markers: Vec<String>,
}

fn default_max_total_tokens() -> usize {
    2200
}
fn default_safety_margin() -> usize {
    50
}
fn default_system_prompt_tokens() -> usize {
    700
}
fn default_bio_context_tokens() -> usize {
    60
}
fn default_customer_info_tokens() -> usize {
    30
}
fn default_conversation_tokens() -> usize {
    250
}
fn default_primary_context_tokens() -> usize {
    600
}
fn default_secondary_context_tokens() -> usize {
    510
}
fn default_user_query_tokens() -> usize {
    150
}
fn default_min_knowledge_tokens() -> usize {
    100
}
fn default_conversation_shrink() -> usize {
    100
}
fn default_primary_share() -> f32 {
    0.75
}
fn default_max_context_items() -> usize {
    20
}
fn default_critical_markers() -> Vec<String> {
    vec!["ANTI-HALLUCINATION".into(), "LINK RULES".into()]
}

impl BudgetConfig {
    /// Ceiling minus safety margin: what allocation may actually spend.
    pub fn usable_tokens(&self) -> usize {
        self.max_total_tokens.saturating_sub(self.safety_margin)
    }

    /// Tokens left for knowledge once every fixed section is reserved.
    pub fn knowledge_available(&self) -> usize {
        self.usable_tokens()
            .saturating_sub(self.system_prompt)
            .saturating_sub(self.bio_context)
            .saturating_sub(self.customer_info)
            .saturating_sub(self.conversation)
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_total_tokens: default_max_total_tokens(),
            safety_margin: default_safety_margin(),
            system_prompt: default_system_prompt_tokens(),
            bio_context: default_bio_context_tokens(),
            customer_info: default_customer_info_tokens(),
            conversation: default_conversation_tokens(),
            primary_context: default_primary_context_tokens(),
            secondary_context: default_secondary_context_tokens(),
            user_query: default_user_query_tokens(),
            min_knowledge_tokens: default_min_knowledge_tokens(),
            conversation_shrink: default_conversation_shrink(),
            primary_share: default_primary_share(),
            max_context_items: default_max_context_items(),
            critical_markers: default_critical_markers(),
        }
    }
}

// ── Session memory ────────────────────────────────────────────────────────

/// Which session memory manager builds conversation context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryVersion {
    /// Rolling single summary
    V1,
    /// Multi-tier summaries
    #[default]
    V2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub version: MemoryVersion,

    /// New messages needed before the summary is refreshed
    #[serde(default = "default_update_every")]
    pub update_every: usize,

    /// Trailing messages kept verbatim by the rolling summary
    #[serde(default = "default_verbatim_recent")]
    pub verbatim_recent: usize,

    /// New content shorter than this is not worth summarizing
    #[serde(default = "default_min_new_chars")]
    pub min_new_chars: usize,

    #[serde(default = "default_summary_max_output_tokens")]
    pub summary_max_output_tokens: u32,

    /// Hard cap applied to every stored rolling summary
    #[serde(default = "default_summary_cap_tokens")]
    pub summary_cap_tokens: usize,

    /// Raw model output shorter than this is replaced by `generic_summary`
    #[serde(default = "default_min_raw_summary_chars")]
    pub min_raw_summary_chars: usize,

    #[serde(default = "default_generic_summary")]
    pub generic_summary: String,

    /// Transcripts longer than this many lines are summarized in windows
    #[serde(default = "default_long_conversation_lines")]
    pub long_conversation_lines: usize,

    #[serde(default = "default_window_size")]
    pub window_size: usize,

    #[serde(default = "default_max_windows")]
    pub max_windows: usize,

    /// Partial summaries joined when the merge call is rate limited
    #[serde(default = "default_merge_fallback_partials")]
    pub merge_fallback_partials: usize,

    #[serde(default)]
    pub tiers: TierConfig,
}

fn default_update_every() -> usize {
    5
}
fn default_verbatim_recent() -> usize {
    3
}
fn default_min_new_chars() -> usize {
    100
}
fn default_summary_max_output_tokens() -> u32 {
    120
}
fn default_summary_cap_tokens() -> usize {
    150
}
fn default_min_raw_summary_chars() -> usize {
    20
}
fn default_generic_summary() -> String {
    "Customer is in an ongoing conversation about the business's products and services.".into()
}
fn default_long_conversation_lines() -> usize {
    50
}
fn default_window_size() -> usize {
    15
}
fn default_max_windows() -> usize {
    20
}
fn default_merge_fallback_partials() -> usize {
    3
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            version: MemoryVersion::default(),
            update_every: default_update_every(),
            verbatim_recent: default_verbatim_recent(),
            min_new_chars: default_min_new_chars(),
            summary_max_output_tokens: default_summary_max_output_tokens(),
            summary_cap_tokens: default_summary_cap_tokens(),
            min_raw_summary_chars: default_min_raw_summary_chars(),
            generic_summary: default_generic_summary(),
            long_conversation_lines: default_long_conversation_lines(),
            window_size: default_window_size(),
            max_windows: default_max_windows(),
            merge_fallback_partials: default_merge_fallback_partials(),
            tiers: TierConfig::default(),
        }
    }
}

/// Sizes and budgets of the multi-tier memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    #[serde(default = "default_verbatim_messages")]
    pub verbatim_messages: usize,
    #[serde(default = "default_verbatim_tokens")]
    pub verbatim_tokens: usize,

    #[serde(default = "default_recent_messages")]
    pub recent_messages: usize,
    #[serde(default = "default_recent_tokens")]
    pub recent_tokens: usize,

    #[serde(default = "default_mid_messages")]
    pub mid_messages: usize,
    #[serde(default = "default_mid_tokens")]
    pub mid_tokens: usize,

    #[serde(default = "default_old_tokens")]
    pub old_tokens: usize,

    #[serde(default = "default_key_facts_tokens")]
    pub key_facts_tokens: usize,
    #[serde(default = "default_key_facts_min")]
    pub key_facts_min: usize,
    #[serde(default = "default_key_facts_max")]
    pub key_facts_max: usize,

    /// Messages sampled from each of the beginning, middle and end
    #[serde(default = "default_key_facts_sample")]
    pub key_facts_sample: usize,
}

fn default_verbatim_messages() -> usize {
    5
}
fn default_verbatim_tokens() -> usize {
    400
}
fn default_recent_messages() -> usize {
    10
}
fn default_recent_tokens() -> usize {
    200
}
fn default_mid_messages() -> usize {
    35
}
fn default_mid_tokens() -> usize {
    250
}
fn default_old_tokens() -> usize {
    200
}
fn default_key_facts_tokens() -> usize {
    150
}
fn default_key_facts_min() -> usize {
    3
}
fn default_key_facts_max() -> usize {
    7
}
fn default_key_facts_sample() -> usize {
    10
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            verbatim_messages: default_verbatim_messages(),
            verbatim_tokens: default_verbatim_tokens(),
            recent_messages: default_recent_messages(),
            recent_tokens: default_recent_tokens(),
            mid_messages: default_mid_messages(),
            mid_tokens: default_mid_tokens(),
            old_tokens: default_old_tokens(),
            key_facts_tokens: default_key_facts_tokens(),
            key_facts_min: default_key_facts_min(),
            key_facts_max: default_key_facts_max(),
            key_facts_sample: default_key_facts_sample(),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from the default path (~/.ragline/config.toml).
    ///
    /// Environment variables override the file:
    /// - `RAGLINE_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `RAGLINE_API_URL`
    /// - `RAGLINE_CHAT_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_path())
    }

    /// Load `path` and apply the same environment overrides as [`AppConfig::load`].
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// The default config file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("RAGLINE_API_KEY").or_else(|| {
            self.provider
                .api_key
                .is_none()
                .then(|| lookup("OPENAI_API_KEY"))
                .flatten()
        }) {
            self.provider.api_key = Some(key);
        }
        if let Some(url) = lookup("RAGLINE_API_URL") {
            self.provider.api_url = url;
        }
        if let Some(model) = lookup("RAGLINE_CHAT_MODEL") {
            self.provider.chat_model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ragline")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunking.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "chunking.chunk_size must be > 0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.chunking.script_threshold) {
            return Err(ConfigError::ValidationError(
                "chunking.script_threshold must be between 0.0 and 1.0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.retrieval.min_similarity) {
            return Err(ConfigError::ValidationError(
                "retrieval.min_similarity must be between 0.0 and 1.0".into(),
            ));
        }

        if self.retrieval.vector_weight + self.retrieval.keyword_weight <= 0.0 {
            return Err(ConfigError::ValidationError(
                "vector_weight + keyword_weight must be > 0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.budget.primary_share) {
            return Err(ConfigError::ValidationError(
                "budget.primary_share must be between 0.0 and 1.0".into(),
            ));
        }

        let b = &self.budget;
        let reserved = b.system_prompt + b.bio_context + b.customer_info + b.conversation;
        if reserved + b.user_query > b.usable_tokens() {
            return Err(ConfigError::ValidationError(format!(
                "fixed sections need {} tokens but only {} are usable under the ceiling",
                reserved + b.user_query,
                b.usable_tokens()
            )));
        }

        if self.session.update_every == 0 {
            return Err(ConfigError::ValidationError(
                "session.update_every must be > 0".into(),
            ));
        }

        if self.session.tiers.key_facts_min > self.session.tiers.key_facts_max {
            return Err(ConfigError::ValidationError(
                "session.tiers.key_facts_min must not exceed key_facts_max".into(),
            ));
        }

        if self.provider.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "provider.timeout_secs must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string (for `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.budget.max_total_tokens, 2200);
        assert_eq!(config.retrieval.primary_top_k, 5);
        assert_eq!(config.session.version, MemoryVersion::V2);
    }

    #[test]
    fn knowledge_available_with_defaults() {
        assert_eq!(BudgetConfig::default().knowledge_available(), 1110);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.budget.system_prompt, config.budget.system_prompt);
        assert_eq!(parsed.session.tiers.mid_messages, 35);
        assert_eq!(parsed.budget.critical_markers, config.budget.critical_markers);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[budget]
max_total_tokens = 3000

[session]
version = "v1"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.budget.max_total_tokens, 3000);
        assert_eq!(config.budget.system_prompt, 700);
        assert_eq!(config.session.version, MemoryVersion::V1);
        assert_eq!(config.chunking.chunk_size, 300);
    }

    #[test]
    fn oversized_fixed_sections_rejected() {
        let mut config = AppConfig::default();
        config.budget.system_prompt = 2100;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fixed sections"));
    }

    #[test]
    fn invalid_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[budget\nmax_total_tokens = ").unwrap();
        assert!(matches!(
            AppConfig::load_from(file.path()),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.provider.chat_model, "gpt-4o-mini");
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-openai"),
            ("RAGLINE_CHAT_MODEL", "local-model"),
        ]
        .into_iter()
        .collect();
        let mut config = AppConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.provider.api_key.as_deref(), Some("sk-openai"));
        assert_eq!(config.provider.chat_model, "local-model");

        // RAGLINE_API_KEY wins over a file key; OPENAI_API_KEY does not
        let mut config = AppConfig::default();
        config.provider.api_key = Some("from-file".into());
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.provider.api_key.as_deref(), Some("from-file"));
        config.apply_env(|k| (k == "RAGLINE_API_KEY").then(|| "sk-ragline".to_string()));
        assert_eq!(config.provider.api_key.as_deref(), Some("sk-ragline"));
    }

    #[test]
    fn debug_redacts_api_key() {
        let mut config = AppConfig::default();
        config.provider.api_key = Some("sk-secret".into());
        let dump = format!("{config:?}");
        assert!(!dump.contains("sk-secret"));
        assert!(dump.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("max_total_tokens = 2200"));
        assert!(toml_str.contains("[session.tiers]"));
    }
}
