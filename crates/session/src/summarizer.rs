//! Rolling conversation summarizer.
//!
//! Short transcripts are summarized in one call. Transcripts longer than
//! `long_conversation_lines` are split into fixed windows, each window gets a
//! one-sentence summary, and a final call merges them. Every result is
//! capped at `summary_cap_tokens`.

use crate::prompts;
use ragline_config::SessionConfig;
use ragline_core::error::ProviderError;
use ragline_core::message::{ConversationMessage, transcript};
use ragline_core::provider::{ChatModel, CompletionRequest};
use ragline_core::token::TokenCounter;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

const WINDOW_MAX_OUTPUT_TOKENS: u32 = 60;

#[derive(Debug, Deserialize)]
struct SummaryPayload {
    summary: String,
    #[serde(default)]
    topics: Vec<String>,
}

fn read_payload(cleaned: &str) -> Option<SummaryPayload> {
    serde_json::from_str(cleaned).ok()
}

/// Strip a surrounding Markdown code fence (```json ... ```).
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    // Drop the language tag on the opening line
    match inner.find('\n') {
        Some(pos) if !inner[..pos].contains('{') => inner[pos + 1..].trim(),
        _ => inner.trim(),
    }
}

/// Extract the summary text from a model reply.
///
/// JSON `{"summary": ...}` wins; otherwise the raw reply is used when it is
/// at least `min_raw_chars` long; otherwise `generic`.
pub fn parse_summary(raw: &str, min_raw_chars: usize, generic: &str) -> String {
    let cleaned = strip_code_fence(raw);
    if let Some(payload) = read_payload(cleaned) {
        let summary = payload.summary.trim();
        if !summary.is_empty() {
            debug!(topics = ?payload.topics, "Summary topics");
            return summary.to_string();
        }
    }
    let raw = raw.trim();
    if raw.chars().count() >= min_raw_chars {
        debug!("Summary reply was not JSON, using raw text");
        raw.to_string()
    } else {
        debug!("Summary reply unusable, using generic summary");
        generic.to_string()
    }
}

/// Keep at most `max` windows: the opening, a middle stretch and the end.
pub fn sample_windows<T>(windows: Vec<T>, max: usize) -> Vec<T> {
    let len = windows.len();
    if len <= max || max == 0 {
        return windows;
    }
    let head = max / 3 + usize::from(max % 3 > 0);
    let tail = max / 3 + usize::from(max % 3 > 1);
    let middle = max - head - tail;
    let mid_start = (len - middle) / 2;

    windows
        .into_iter()
        .enumerate()
        .filter(|(i, _)| *i < head || (*i >= mid_start && *i < mid_start + middle) || *i >= len - tail)
        .map(|(_, w)| w)
        .collect()
}

pub struct Summarizer {
    chat: Arc<dyn ChatModel>,
    model: String,
    counter: Arc<TokenCounter>,
    config: SessionConfig,
}

impl Summarizer {
    pub fn new(
        chat: Arc<dyn ChatModel>,
        model: impl Into<String>,
        counter: Arc<TokenCounter>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            chat,
            model: model.into(),
            counter,
            config: config.clone(),
        }
    }

    fn parse(&self, raw: &str) -> String {
        parse_summary(raw, self.config.min_raw_summary_chars, &self.config.generic_summary)
    }

    fn cap(&self, summary: String) -> String {
        self.counter.truncate(&summary, self.config.summary_cap_tokens)
    }

    fn summary_request(&self, prompt: String) -> CompletionRequest {
        CompletionRequest::new(&self.model, prompt)
            .with_system(prompts::SUMMARY_SYSTEM)
            .with_max_tokens(self.config.summary_max_output_tokens)
            .json()
    }

    /// Summarize `messages` into a replacement for `previous`.
    pub async fn summarize(
        &self,
        previous: &str,
        messages: &[ConversationMessage],
    ) -> Result<String, ProviderError> {
        let text = transcript(messages);
        let lines = text.lines().count();
        let summary = if lines > self.config.long_conversation_lines {
            debug!(lines, "Long transcript, summarizing in windows");
            self.summarize_windows(previous, messages).await?
        } else {
            let completion = self
                .chat
                .complete(self.summary_request(prompts::summary_prompt(previous, &text)))
                .await?;
            self.parse(&completion.text)
        };
        Ok(self.cap(summary))
    }

    async fn summarize_windows(
        &self,
        previous: &str,
        messages: &[ConversationMessage],
    ) -> Result<String, ProviderError> {
        let windows: Vec<&[ConversationMessage]> =
            messages.chunks(self.config.window_size.max(1)).collect();
        let total = windows.len();
        let windows = sample_windows(windows, self.config.max_windows);
        if windows.len() < total {
            debug!(total, kept = windows.len(), "Window count capped");
        }

        let mut partials = Vec::with_capacity(windows.len());
        let mut last_error = None;
        for (index, window) in windows.iter().enumerate() {
            let request = CompletionRequest::new(&self.model, prompts::window_prompt(&transcript(window)))
                .with_system(prompts::SUMMARY_SYSTEM)
                .with_max_tokens(WINDOW_MAX_OUTPUT_TOKENS);
            match self.chat.complete(request).await {
                Ok(completion) if !completion.is_blocked() => {
                    partials.push(completion.text.trim().to_string());
                }
                Ok(_) => warn!(window = index, "Window summary was empty, skipping"),
                Err(e) => {
                    warn!(window = index, error = %e, "Window summary failed, skipping");
                    last_error = Some(e);
                }
            }
        }

        if partials.is_empty() {
            return Err(last_error.unwrap_or_else(|| {
                ProviderError::InvalidResponse("no conversation window could be summarized".into())
            }));
        }

        let merge = self.summary_request(prompts::merge_prompt(previous, &partials));
        match self.chat.complete(merge).await {
            Ok(completion) => Ok(self.parse(&completion.text)),
            Err(e) if e.is_rate_limited() => {
                warn!(
                    partials = partials.len(),
                    "Merge call rate limited, joining partial summaries"
                );
                Ok(partials
                    .iter()
                    .take(self.config.merge_fallback_partials)
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(" "))
            }
            Err(e) => Err(e),
        }
    }
}
