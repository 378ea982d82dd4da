//! Model fallback: primary model, then fallback model, then the caller's default.
//!
//! A chat call that comes back without usable content (safety block or empty
//! body) is retried exactly once against the fallback model. Errors are not
//! retried: they carry information the caller acts on (e.g. rate limiting).
//! The third tier, a static default, belongs to the caller, which matches on
//! `FallbackReason`.

use ragline_core::error::ProviderError;
use ragline_core::provider::{ChatModel, Completion, CompletionRequest};
use std::sync::Arc;
use tracing::{debug, warn};

/// Which model produced a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackStage {
    Primary,
    Fallback,
}

/// A usable completion and where it came from.
#[derive(Debug, Clone)]
pub struct FallbackOutcome {
    pub completion: Completion,
    pub stage: FallbackStage,
}

impl FallbackOutcome {
    pub fn text(&self) -> &str {
        &self.completion.text
    }
}

/// Why no usable completion was produced.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FallbackReason {
    #[error("primary model failed: {0}")]
    PrimaryFailed(ProviderError),

    #[error("primary model blocked, fallback model failed: {0}")]
    FallbackFailed(ProviderError),

    #[error("both models returned no usable content")]
    BothBlocked,
}

impl FallbackReason {
    /// The underlying provider error, when there was one.
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            Self::PrimaryFailed(e) | Self::FallbackFailed(e) => Some(e),
            Self::BothBlocked => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.provider_error()
            .is_some_and(ProviderError::is_rate_limited)
    }
}

/// Chat calls with a one-shot fallback model on safety blocks.
#[derive(Clone)]
pub struct ModelFallback {
    model: Arc<dyn ChatModel>,
    primary_model: String,
    fallback_model: String,
}

impl ModelFallback {
    pub fn new(
        model: Arc<dyn ChatModel>,
        primary_model: impl Into<String>,
        fallback_model: impl Into<String>,
    ) -> Self {
        Self {
            model,
            primary_model: primary_model.into(),
            fallback_model: fallback_model.into(),
        }
    }

    pub fn primary_model(&self) -> &str {
        &self.primary_model
    }

    /// Run `request` (its `model` field is overwritten) through the fallback chain.
    pub async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<FallbackOutcome, FallbackReason> {
        let primary = request.for_model(&self.primary_model);
        let completion = self
            .model
            .complete(primary)
            .await
            .map_err(FallbackReason::PrimaryFailed)?;

        if !completion.is_blocked() {
            debug!(model = %self.primary_model, "Primary model answered");
            return Ok(FallbackOutcome {
                completion,
                stage: FallbackStage::Primary,
            });
        }

        warn!(
            primary = %self.primary_model,
            fallback = %self.fallback_model,
            finish_reason = ?completion.finish_reason,
            "Primary model returned no usable content, retrying with fallback model"
        );

        let completion = self
            .model
            .complete(request.for_model(&self.fallback_model))
            .await
            .map_err(FallbackReason::FallbackFailed)?;

        if completion.is_blocked() {
            warn!(fallback = %self.fallback_model, "Fallback model also returned no usable content");
            return Err(FallbackReason::BothBlocked);
        }

        Ok(FallbackOutcome {
            completion,
            stage: FallbackStage::Fallback,
        })
    }
}
