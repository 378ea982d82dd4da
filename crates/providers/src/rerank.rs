//! HTTP cross-encoder reranker.
//!
//! Speaks the `/rerank` format shared by Jina, Cohere-compatible gateways and
//! text-embeddings-inference: `{model, query, documents, top_n}` in,
//! `{results: [{index, relevance_score}]}` out.

use crate::openai_compat::check_status;
use async_trait::async_trait;
use ragline_config::ProviderSettings;
use ragline_core::error::ProviderError;
use ragline_core::provider::{RerankModel, RerankScore, Reranker};
use serde::Deserialize;
use tracing::debug;

pub struct HttpReranker {
    base_url: String,
    api_key: Option<String>,
    base_model: String,
    large_model: String,
    client: reqwest::Client,
}

impl HttpReranker {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        base_model: impl Into<String>,
        large_model: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| ProviderError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            base_model: base_model.into(),
            large_model: large_model.into(),
            client,
        })
    }

    /// Build from config; `None` when no rerank endpoint is configured.
    pub fn from_settings(settings: &ProviderSettings) -> Result<Option<Self>, ProviderError> {
        let Some(url) = &settings.rerank_url else {
            return Ok(None);
        };
        Self::new(
            url,
            settings.api_key.clone(),
            &settings.rerank_base_model,
            &settings.rerank_large_model,
        )
        .map(Some)
    }

    fn model_name(&self, model: RerankModel) -> &str {
        match model {
            RerankModel::Base => &self.base_model,
            RerankModel::Large => &self.large_model,
        }
    }
}

/// Validate indices against the request and order by descending score.
fn into_scores(
    api: RerankApiResponse,
    document_count: usize,
    top_k: usize,
) -> Result<Vec<RerankScore>, ProviderError> {
    let mut scores = Vec::with_capacity(api.results.len());
    for r in api.results {
        if r.index >= document_count {
            return Err(ProviderError::InvalidResponse(format!(
                "rerank index {} out of range for {} documents",
                r.index, document_count
            )));
        }
        scores.push(RerankScore {
            index: r.index,
            score: r.relevance_score,
        });
    }
    scores.sort_by(|a, b| b.score.total_cmp(&a.score));
    scores.truncate(top_k);
    Ok(scores)
}

#[async_trait]
impl Reranker for HttpReranker {
    fn name(&self) -> &str {
        "http_rerank"
    }

    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_k: usize,
        model: RerankModel,
    ) -> Result<Vec<RerankScore>, ProviderError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "model": self.model_name(model),
            "query": query,
            "documents": documents,
            "top_n": top_k,
        });

        debug!(
            model = %self.model_name(model),
            documents = documents.len(),
            top_k,
            "Sending rerank request"
        );

        let mut request = self
            .client
            .post(format!("{}/rerank", self.base_url))
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        let response = check_status(response).await?;

        let api: RerankApiResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse rerank response: {e}"))
        })?;

        into_scores(api, documents.len(), top_k)
    }
}

#[derive(Debug, Deserialize)]
struct RerankApiResponse {
    results: Vec<RerankApiResult>,
}

#[derive(Debug, Deserialize)]
struct RerankApiResult {
    index: usize,
    relevance_score: f32,
}
