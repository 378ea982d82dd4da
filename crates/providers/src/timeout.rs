//! Per-call timeouts for model services.
//!
//! `Timed<T>` wraps any embedder, chat model or reranker and turns an elapsed
//! deadline into `ProviderError::Timeout`, which every caller treats as a
//! recoverable failure.

use async_trait::async_trait;
use ragline_core::error::ProviderError;
use ragline_core::provider::*;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Run `fut` with a deadline.
pub async fn with_timeout<T>(
    label: &str,
    timeout: Duration,
    fut: impl Future<Output = Result<T, ProviderError>>,
) -> Result<T, ProviderError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                service = label,
                timeout_ms = timeout.as_millis() as u64,
                "Model call timed out"
            );
            Err(ProviderError::Timeout(format!(
                "'{}' timed out after {}ms",
                label,
                timeout.as_millis()
            )))
        }
    }
}

/// A model service with a per-call deadline.
pub struct Timed<T: ?Sized> {
    inner: Arc<T>,
    timeout: Duration,
}

impl<T: ?Sized> Timed<T> {
    pub fn new(inner: Arc<T>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<T: Embedder + ?Sized> Embedder for Timed<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn embed(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>, ProviderError> {
        with_timeout(self.inner.name(), self.timeout, self.inner.embed(text, task)).await
    }
}

#[async_trait]
impl<T: ChatModel + ?Sized> ChatModel for Timed<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        with_timeout(self.inner.name(), self.timeout, self.inner.complete(request)).await
    }
}

#[async_trait]
impl<T: Reranker + ?Sized> Reranker for Timed<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_k: usize,
        model: RerankModel,
    ) -> Result<Vec<RerankScore>, ProviderError> {
        with_timeout(
            self.inner.name(),
            self.timeout,
            self.inner.rerank(query, documents, top_k, model),
        )
        .await
    }
}
