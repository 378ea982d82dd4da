//! Session memory for ragline.
//!
//! Turns a conversation's message history into a compact context block for
//! the prompt. Two managers implement [`ConversationMemory`]:
//!
//! - [`RollingSummaryMemory`]: one rolling summary plus the last few messages
//! - [`TieredMemory`]: old/mid/recent summaries at decreasing detail, key
//!   facts, and a verbatim tail
//!
//! Both persist through a `SessionStore` and never fail the caller: on any
//! model or store error they fall back to whatever is already stored.

pub mod lock;
pub mod prompts;
pub mod rolling;
pub mod summarizer;
pub mod tiered;

pub use lock::ConversationLocks;
pub use rolling::RollingSummaryMemory;
pub use summarizer::{Summarizer, parse_summary};
pub use tiered::{MessageRange, TierRanges, TieredMemory, TieredMemoryDoc};

use async_trait::async_trait;
use ragline_config::{MemoryVersion, SessionConfig};
use ragline_core::chunk::TenantId;
use ragline_core::error::StoreError;
use ragline_core::message::{ConversationId, ConversationMessage};
use ragline_core::provider::ChatModel;
use ragline_core::store::SessionStore;
use ragline_core::token::TokenCounter;
use ragline_providers::ModelFallback;
use std::sync::Arc;

/// Builds the conversation part of the prompt.
#[async_trait]
pub trait ConversationMemory: Send + Sync {
    fn name(&self) -> &str;

    /// Context block for `messages` (oldest first). Refreshes stored
    /// summaries when they are due.
    async fn get_conversation_context(
        &self,
        conversation: &ConversationId,
        tenant: &TenantId,
        messages: &[ConversationMessage],
    ) -> String;

    /// Forget everything stored for the conversation.
    async fn clear(&self, conversation: &ConversationId) -> Result<bool, StoreError>;
}

/// What a summary refresh did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryUpdate {
    /// Fewer than `update_every` messages since the last update
    NotDue,
    /// New content too short to be worth a model call
    SkippedShort { new_chars: usize },
    Updated { message_count: usize },
    /// Another writer saved first; its summary stands
    LostRace,
}

/// Whether enough messages arrived since the watermark to refresh.
pub fn should_update_summary(total_messages: usize, watermark: usize, every: usize) -> bool {
    total_messages >= every && total_messages.saturating_sub(watermark) >= every
}

/// Build the configured memory manager.
pub fn build_memory(
    config: &SessionConfig,
    store: Arc<dyn SessionStore>,
    chat: Arc<dyn ChatModel>,
    fallback: ModelFallback,
    counter: Arc<TokenCounter>,
) -> Arc<dyn ConversationMemory> {
    match config.version {
        MemoryVersion::V1 => {
            let summarizer = Summarizer::new(chat, fallback.primary_model(), counter, config);
            Arc::new(RollingSummaryMemory::new(store, summarizer, config))
        }
        MemoryVersion::V2 => Arc::new(TieredMemory::new(store, fallback, counter, config)),
    }
}
