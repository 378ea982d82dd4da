//! Model service implementations for ragline.
//!
//! Embedding and chat go through an OpenAI-compatible client, reranking through
//! a `/rerank` HTTP endpoint. Every client is wrapped in a per-call timeout.

pub mod fallback;
pub mod openai_compat;
pub mod rerank;
pub mod timeout;

pub use fallback::{FallbackOutcome, FallbackReason, FallbackStage, ModelFallback};
pub use openai_compat::OpenAiCompatClient;
pub use rerank::HttpReranker;
pub use timeout::{Timed, with_timeout};

use ragline_config::ProviderSettings;
use ragline_core::error::ProviderError;
use ragline_core::provider::{ChatModel, Embedder, Reranker};
use std::sync::Arc;

/// The model services a pipeline needs, ready to share.
#[derive(Clone)]
pub struct ModelServices {
    pub embedder: Arc<dyn Embedder>,
    pub chat: Arc<dyn ChatModel>,
    pub reranker: Option<Arc<dyn Reranker>>,
    pub fallback: ModelFallback,
}

/// Build model services from configuration.
///
/// Fails with `ProviderError::NotConfigured` when no API key is available.
pub fn build_from_settings(settings: &ProviderSettings) -> Result<ModelServices, ProviderError> {
    let timeout = settings.timeout();
    let client = Arc::new(OpenAiCompatClient::from_settings(settings)?);

    let embedder: Arc<dyn Embedder> = Arc::new(Timed::new(client.clone(), timeout));
    let chat: Arc<dyn ChatModel> = Arc::new(Timed::new(client, timeout));
    let reranker = HttpReranker::from_settings(settings)?
        .map(|r| Arc::new(Timed::new(Arc::new(r), timeout)) as Arc<dyn Reranker>);

    tracing::info!(
        api_url = %settings.api_url,
        chat_model = %settings.chat_model,
        rerank = reranker.is_some(),
        "Model services ready"
    );

    Ok(ModelServices {
        fallback: ModelFallback::new(
            chat.clone(),
            &settings.chat_model,
            &settings.fallback_chat_model,
        ),
        embedder,
        chat,
        reranker,
    })
}
