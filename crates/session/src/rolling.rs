//! Rolling summary memory.
//!
//! One summary per conversation, replaced (never appended) every
//! `update_every` new messages. The newest `verbatim_recent` messages are
//! never summarized; they are always shown as-is.

use crate::lock::ConversationLocks;
use crate::summarizer::Summarizer;
use crate::{ConversationMemory, SummaryUpdate, should_update_summary};
use async_trait::async_trait;
use ragline_config::SessionConfig;
use ragline_core::chunk::TenantId;
use ragline_core::error::{Error, StoreError};
use ragline_core::message::{ConversationId, ConversationMessage, transcript};
use ragline_core::store::SessionStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct RollingSummaryMemory {
    store: Arc<dyn SessionStore>,
    summarizer: Summarizer,
    locks: ConversationLocks,
    config: SessionConfig,
}

impl RollingSummaryMemory {
    pub fn new(store: Arc<dyn SessionStore>, summarizer: Summarizer, config: &SessionConfig) -> Self {
        Self {
            store,
            summarizer,
            locks: ConversationLocks::new(),
            config: config.clone(),
        }
    }

    /// Fold older messages into the stored summary when enough have arrived.
    pub async fn update_summary(
        &self,
        conversation: &ConversationId,
        tenant: &TenantId,
        messages: &[ConversationMessage],
    ) -> Result<SummaryUpdate, Error> {
        let _guard = self.locks.acquire(conversation).await;
        let memory = self.store.get_or_create(conversation, tenant).await?;
        let total = messages.len();

        if !should_update_summary(total, memory.message_count, self.config.update_every) {
            return Ok(SummaryUpdate::NotDue);
        }

        // Everything before the verbatim tail that the last update left out
        let split = total.saturating_sub(self.config.verbatim_recent);
        let from = memory
            .message_count
            .saturating_sub(self.config.verbatim_recent)
            .min(split);
        let fresh = &messages[from..split];
        let new_chars: usize = fresh.iter().map(|m| m.content.trim().chars().count()).sum();
        if new_chars < self.config.min_new_chars {
            debug!(conversation = %conversation, new_chars, "Too little new content, summary unchanged");
            return Ok(SummaryUpdate::SkippedShort { new_chars });
        }

        let summary = self
            .summarizer
            .summarize(&memory.cumulative_summary, fresh)
            .await?;

        let mut next = memory;
        next.replace_summary(summary, total);
        match self.store.save(next).await {
            Ok(saved) => {
                info!(
                    conversation = %conversation,
                    message_count = saved.message_count,
                    version = saved.version,
                    "Conversation summary updated"
                );
                Ok(SummaryUpdate::Updated {
                    message_count: saved.message_count,
                })
            }
            Err(StoreError::Conflict { found, .. }) => {
                warn!(
                    conversation = %conversation,
                    stored_version = found,
                    "Concurrent summary update won, keeping stored summary"
                );
                Ok(SummaryUpdate::LostRace)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn render(&self, summary: &str, messages: &[ConversationMessage]) -> String {
        let recent_start = messages.len().saturating_sub(self.config.verbatim_recent);
        let recent = transcript(&messages[recent_start..]);
        let mut sections = Vec::new();
        if !summary.trim().is_empty() {
            sections.push(format!("## Conversation summary\n{}", summary.trim()));
        }
        if !recent.is_empty() {
            sections.push(format!("## Recent messages\n{recent}"));
        }
        sections.join("\n\n")
    }
}

#[async_trait]
impl ConversationMemory for RollingSummaryMemory {
    fn name(&self) -> &str {
        "rolling_summary"
    }

    async fn get_conversation_context(
        &self,
        conversation: &ConversationId,
        tenant: &TenantId,
        messages: &[ConversationMessage],
    ) -> String {
        if let Err(e) = self.update_summary(conversation, tenant, messages).await {
            warn!(conversation = %conversation, error = %e, "Summary update failed, using stored summary");
        }
        let summary = match self.store.get(conversation).await {
            Ok(memory) => memory.map(|m| m.cumulative_summary).unwrap_or_default(),
            Err(e) => {
                warn!(conversation = %conversation, error = %e, "Session store unavailable");
                String::new()
            }
        };
        self.render(&summary, messages)
    }

    async fn clear(&self, conversation: &ConversationId) -> Result<bool, StoreError> {
        let _guard = self.locks.acquire(conversation).await;
        self.store.clear(conversation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragline_core::message::SessionMemory;
    use ragline_core::provider::Completion;
    use ragline_core::testing::ScriptedChatModel;
    use ragline_core::token::TokenCounter;
    use ragline_store::InMemorySessionStore;

    fn memory(model: Arc<ScriptedChatModel>, store: Arc<dyn SessionStore>) -> RollingSummaryMemory {
        let config = SessionConfig::default();
        let summarizer = Summarizer::new(model, "summary-m", Arc::new(TokenCounter::default()), &config);
        RollingSummaryMemory::new(store, summarizer, &config)
    }

    fn ids() -> (ConversationId, TenantId) {
        (ConversationId::from("c1"), TenantId::from("t1"))
    }

    fn chatty(n: usize) -> Vec<ConversationMessage> {
        (0..n)
            .map(|i| {
                ConversationMessage::customer(format!(
                    "message {i}: I would like to know more about the waterproof hiking boots in size 42"
                ))
            })
            .collect()
    }

    #[test]
    fn update_cadence() {
        assert!(!should_update_summary(4, 0, 5));
        assert!(should_update_summary(5, 0, 5));
        assert!(!should_update_summary(9, 5, 5));
        assert!(should_update_summary(10, 5, 5));
        assert!(!should_update_summary(3, 10, 5));
    }

    #[tokio::test]
    async fn short_content_is_not_summarized() {
        let model = Arc::new(ScriptedChatModel::new(vec![]));
        let store = Arc::new(InMemorySessionStore::new());
        let m = memory(model.clone(), store.clone());
        let (conv, tenant) = ids();
        let messages: Vec<_> = ["hi", "hello", "ok", "yes", "thanks"]
            .into_iter()
            .map(ConversationMessage::customer)
            .collect();

        let outcome = m.update_summary(&conv, &tenant, &messages).await.unwrap();
        assert!(matches!(outcome, SummaryUpdate::SkippedShort { .. }));
        assert_eq!(model.call_count(), 0);
        let stored = store.get(&conv).await.unwrap().unwrap();
        assert!(stored.cumulative_summary.is_empty());
        assert_eq!(stored.message_count, 0);
    }

    #[tokio::test]
    async fn summary_is_replaced_not_appended() {
        let model = Arc::new(ScriptedChatModel::new(vec![
            Ok(Completion::text("", r#"{"summary": "Asked about boots."}"#)),
            Ok(Completion::text("", r#"{"summary": "Chose size 42 boots."}"#)),
        ]));
        let store = Arc::new(InMemorySessionStore::new());
        let m = memory(model.clone(), store.clone());
        let (conv, tenant) = ids();

        let first = m.update_summary(&conv, &tenant, &chatty(5)).await.unwrap();
        assert_eq!(first, SummaryUpdate::Updated { message_count: 5 });
        assert_eq!(
            m.update_summary(&conv, &tenant, &chatty(7)).await.unwrap(),
            SummaryUpdate::NotDue
        );
        m.update_summary(&conv, &tenant, &chatty(10)).await.unwrap();

        let stored = store.get(&conv).await.unwrap().unwrap();
        assert_eq!(stored.cumulative_summary, "Chose size 42 boots.");
        assert_eq!(stored.message_count, 10);
        // Second update sees the previous summary and only the unsummarized messages
        let second = &model.requests()[1].prompt;
        assert!(second.contains("Asked about boots."));
        assert!(second.contains("message 2:"));
        assert!(!second.contains("message 1:"));
        assert!(!second.contains("message 7:"));
    }

    #[tokio::test]
    async fn summary_size_stays_bounded() {
        let huge = format!(r#"{{"summary": "{}"}}"#, "detail ".repeat(500).trim());
        let model = Arc::new(ScriptedChatModel::always(&huge));
        let store = Arc::new(InMemorySessionStore::new());
        let m = memory(model, store.clone());
        let (conv, tenant) = ids();

        for n in (5..=40).step_by(5) {
            m.update_summary(&conv, &tenant, &chatty(n)).await.unwrap();
            let stored = store.get(&conv).await.unwrap().unwrap();
            assert!(TokenCounter::default().count(&stored.cumulative_summary) <= 150);
        }
    }

    #[tokio::test]
    async fn context_has_summary_and_verbatim_tail() {
        let model = Arc::new(ScriptedChatModel::new(vec![]));
        let m = memory(model, Arc::new(InMemorySessionStore::new()));
        let (conv, tenant) = ids();

        let context = m.get_conversation_context(&conv, &tenant, &chatty(6)).await;
        assert!(context.starts_with("## Conversation summary\nCustomer asked about products."));
        assert!(context.contains("## Recent messages\nCustomer: message 3:"));
        assert!(!context.contains("Customer: message 2:"));
    }

    /// A store where some other writer always saved first.
    struct RacingStore {
        inner: InMemorySessionStore,
    }

    #[async_trait]
    impl SessionStore for RacingStore {
        fn name(&self) -> &str {
            "racing"
        }

        async fn get_or_create(
            &self,
            conversation: &ConversationId,
            tenant: &TenantId,
        ) -> Result<SessionMemory, StoreError> {
            self.inner.get_or_create(conversation, tenant).await
        }

        async fn get(&self, conversation: &ConversationId) -> Result<Option<SessionMemory>, StoreError> {
            self.inner.get(conversation).await
        }

        async fn save(&self, memory: SessionMemory) -> Result<SessionMemory, StoreError> {
            let mut winner = memory.clone();
            winner.cumulative_summary = "Winner summary.".into();
            self.inner.save(winner).await?;
            self.inner.save(memory).await
        }

        async fn clear(&self, conversation: &ConversationId) -> Result<bool, StoreError> {
            self.inner.clear(conversation).await
        }
    }

    #[tokio::test]
    async fn losing_a_race_keeps_the_winner() {
        let model = Arc::new(ScriptedChatModel::new(vec![]));
        let store = Arc::new(RacingStore {
            inner: InMemorySessionStore::new(),
        });
        let m = memory(model, store.clone());
        let (conv, tenant) = ids();

        let outcome = m.update_summary(&conv, &tenant, &chatty(5)).await.unwrap();
        assert_eq!(outcome, SummaryUpdate::LostRace);
        let context = m.get_conversation_context(&conv, &tenant, &chatty(5)).await;
        assert!(context.contains("Winner summary."));
    }

    #[tokio::test]
    async fn model_failure_keeps_context_available() {
        let model = Arc::new(ScriptedChatModel::new(vec![Err(
            ragline_core::error::ProviderError::Timeout("summary".into()),
        )]));
        let store = Arc::new(InMemorySessionStore::new());
        let m = memory(model, store.clone());
        let (conv, tenant) = ids();

        let context = m.get_conversation_context(&conv, &tenant, &chatty(5)).await;
        assert!(context.starts_with("## Recent messages"));
        assert_eq!(store.get(&conv).await.unwrap().unwrap().message_count, 0);
    }

    #[tokio::test]
    async fn clear_forgets_the_summary() {
        let store = Arc::new(InMemorySessionStore::new());
        let m = memory(Arc::new(ScriptedChatModel::new(vec![])), store.clone());
        let (conv, tenant) = ids();
        m.update_summary(&conv, &tenant, &chatty(5)).await.unwrap();
        assert!(m.clear(&conv).await.unwrap());
        assert!(store.get(&conv).await.unwrap().is_none());
    }
}
