//! OpenAI-compatible embedding and chat client.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM, and any endpoint exposing
//! `/embeddings` and `/chat/completions` in the OpenAI wire format.

use async_trait::async_trait;
use ragline_config::ProviderSettings;
use ragline_core::error::ProviderError;
use ragline_core::provider::*;
use serde::Deserialize;
use tracing::{debug, warn};

/// An OpenAI-compatible model client.
pub struct OpenAiCompatClient {
    name: String,
    base_url: String,
    api_key: String,
    embedding_model: String,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    /// Create a new client.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        embedding_model: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| ProviderError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            embedding_model: embedding_model.into(),
            client,
        })
    }

    /// Build from the `[provider]` config section. Requires an API key.
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let api_key = settings.api_key.clone().ok_or_else(|| {
            ProviderError::NotConfigured(
                "No API key: set provider.api_key, RAGLINE_API_KEY or OPENAI_API_KEY".into(),
            )
        })?;
        Self::new(
            "openai_compat",
            &settings.api_url,
            api_key,
            &settings.embedding_model,
        )
    }

    async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        check_status(response).await
    }

    fn chat_body(request: &CompletionRequest) -> serde_json::Value {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        messages.push(serde_json::json!({"role": "user", "content": request.prompt}));

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
            "stream": false,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if request.json_response {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }
        body
    }
}

/// Map non-success HTTP statuses to provider errors.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();

    if status == 429 {
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);
        return Err(ProviderError::RateLimited { retry_after_secs });
    }

    if status == 401 || status == 403 {
        return Err(ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ));
    }

    if status == 404 {
        let error_body = response.text().await.unwrap_or_default();
        return Err(ProviderError::ModelNotFound(error_body));
    }

    if !(200..300).contains(&status) {
        let error_body = response.text().await.unwrap_or_default();
        warn!(status, body = %error_body, "Provider returned error");
        return Err(ProviderError::ApiError {
            status_code: status,
            message: error_body,
        });
    }

    Ok(response)
}

fn parse_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("stop") | None => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        Some(_) => FinishReason::Other,
    }
}

fn completion_from(api: ChatApiResponse) -> Result<Completion, ProviderError> {
    let choice = api
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".into()))?;

    Ok(Completion {
        text: choice.message.content.unwrap_or_default(),
        finish_reason: parse_finish_reason(choice.finish_reason.as_deref()),
        model: api.model,
        usage: api.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }),
    })
}

#[async_trait]
impl Embedder for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn embed(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>, ProviderError> {
        let body = serde_json::json!({
            "model": self.embedding_model,
            "input": text,
            "encoding_format": "float",
        });

        debug!(
            provider = %self.name,
            model = %self.embedding_model,
            ?task,
            chars = text.len(),
            "Sending embedding request"
        );

        let response = self.post("embeddings", &body).await?;
        let api: EmbeddingApiResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse embedding response: {e}"))
        })?;

        api.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse("Empty embedding in response".into()))
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let body = Self::chat_body(&request);

        debug!(
            provider = %self.name,
            model = %request.model,
            json = request.json_response,
            "Sending completion request"
        );

        let response = self.post("chat/completions", &body).await?;
        let api: ChatApiResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse response: {e}"))
        })?;

        completion_from(api)
    }
}

// --- API types ---

#[derive(Debug, Deserialize)]
struct ChatApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ChatApiChoice>,
    #[serde(default)]
    usage: Option<ChatApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatApiChoice {
    message: ChatApiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatApiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_settings_requires_key() {
        let settings = ProviderSettings::default();
        let err = OpenAiCompatClient::from_settings(&settings).err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));

        let settings = ProviderSettings {
            api_key: Some("sk-test".into()),
            api_url: "https://api.openai.com/v1/".into(),
            ..ProviderSettings::default()
        };
        let client = OpenAiCompatClient::from_settings(&settings).unwrap();
        assert_eq!(client.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn chat_body_includes_json_mode_and_system() {
        let request = CompletionRequest::new("gpt-4o-mini", "Summarize this")
            .with_system("Be brief")
            .with_max_tokens(120)
            .json();
        let body = OpenAiCompatClient::chat_body(&request);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Summarize this");
        assert_eq!(body["max_tokens"], 120);
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn plain_body_has_no_response_format() {
        let body = OpenAiCompatClient::chat_body(&CompletionRequest::new("m", "p"));
        assert!(body.get("response_format").is_none());
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn parse_chat_response() {
        let data = r#"{
            "model": "gpt-4o-mini",
            "choices": [{"message": {"content": "Hi"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 1, "total_tokens": 6}
        }"#;
        let completion = completion_from(serde_json::from_str(data).unwrap()).unwrap();
        assert_eq!(completion.text, "Hi");
        assert_eq!(completion.finish_reason, FinishReason::Stop);
        assert_eq!(completion.usage.unwrap().total_tokens, 6);
    }

    #[test]
    fn content_filter_is_blocked() {
        let data = r#"{
            "model": "gpt-4o-mini",
            "choices": [{"message": {"content": null}, "finish_reason": "content_filter"}]
        }"#;
        let completion = completion_from(serde_json::from_str(data).unwrap()).unwrap();
        assert!(completion.is_blocked());
    }

    #[test]
    fn empty_choices_is_invalid() {
        let data = r#"{"model": "m", "choices": []}"#;
        let err = completion_from(serde_json::from_str(data).unwrap()).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[test]
    fn parse_embedding_response() {
        let data = r#"{"data": [{"embedding": [0.1, 0.2, 0.3], "index": 0}], "model": "x"}"#;
        let parsed: EmbeddingApiResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.data[0].embedding, vec![0.1, 0.2, 0.3]);
    }
}
