//! `ragline query`: route, retrieve and budget one customer message.

use super::runtime::{CliResult, Stores, load_config, open_stores, token_counter};
use ragline_config::AppConfig;
use ragline_core::chunk::TenantId;
use ragline_core::message::{ConversationId, ConversationMessage};
use ragline_engine::{ContextEngine, EngineParts, PreparedContext, TurnInput};
use ragline_providers::{ModelServices, build_from_settings};
use ragline_store::LocalHybridSearch;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct QueryArgs {
    pub tenant: String,
    pub conversation: String,
    pub production: bool,
    pub system_prompt: Option<PathBuf>,
    pub text: String,
}

pub async fn run(config_path: Option<&Path>, args: QueryArgs) -> CliResult {
    let mut config = load_config(config_path)?;
    if args.production {
        config.pipeline.enabled = true;
    }
    let system_prompt = match &args.system_prompt {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?,
        None => String::new(),
    };

    let services = build_from_settings(&config.provider)?;
    let stores = open_stores(&config).await?;
    let engine = build_engine(&config, services, stores);

    let input = TurnInput::new(
        TenantId::from(args.tenant.as_str()),
        ConversationId::from(args.conversation.as_str()),
        args.text.clone(),
    )
    .with_messages(vec![ConversationMessage::customer(args.text)])
    .with_system_prompt(system_prompt);

    let prepared = engine.prepare(&input).await?;
    println!("{}", serde_json::to_string_pretty(&render(&prepared))?);
    Ok(())
}

pub fn build_engine(config: &AppConfig, services: ModelServices, stores: Stores) -> ContextEngine {
    let search = Arc::new(LocalHybridSearch::from_config(
        stores.knowledge.clone(),
        &config.retrieval,
    ));
    ContextEngine::from_config(
        config,
        EngineParts {
            embedder: services.embedder,
            chat: services.chat,
            fallback: services.fallback,
            reranker: services.reranker,
            knowledge: stores.knowledge,
            search,
            sessions: stores.sessions,
            cache: stores.cache,
            counter: token_counter(config),
        },
    )
}

/// Machine-readable summary of a prepared turn.
pub fn render(prepared: &PreparedContext) -> serde_json::Value {
    json!({
        "routing": prepared.routing,
        "retrieval_method": prepared.retrieval.retrieval_method,
        "total_chunks": prepared.retrieval.total_chunks,
        "plan": prepared.plan,
    })
}
