//! End-to-end context preparation for one customer turn.
//!
//! route → retrieve → conversation memory → budget. The result is handed to
//! the prompt-assembly layer, which owns the final LLM call.

use crate::budget::{BudgetComponents, TokenBudgetController, TokenBudgetPlan};
use ragline_config::AppConfig;
use ragline_core::chunk::{RetrievalResult, TenantId};
use ragline_core::error::Error;
use ragline_core::message::{ConversationId, ConversationMessage};
use ragline_core::provider::{ChatModel, Embedder, Reranker};
use ragline_core::routing::RoutingDecision;
use ragline_core::search::HybridSearch;
use ragline_core::store::{Cache, KnowledgeStore, SessionStore};
use ragline_core::token::TokenCounter;
use ragline_knowledge::{KnowledgeStatsService, Normalizer};
use ragline_providers::ModelFallback;
use ragline_retrieval::{ContextRetrieval, ContextRetriever, ProductionRag, QueryRouter, RetrievalRequest};
use ragline_session::{ConversationMemory, build_memory};
use std::sync::Arc;
use tracing::info;

/// One customer turn.
#[derive(Debug, Clone)]
pub struct TurnInput {
    pub tenant: TenantId,
    pub conversation: ConversationId,
    pub query: String,
    /// Conversation so far, oldest first
    pub messages: Vec<ConversationMessage>,
    pub system_prompt: String,
    pub bio_context: String,
    pub customer_info: String,
}

impl TurnInput {
    pub fn new(tenant: TenantId, conversation: ConversationId, query: impl Into<String>) -> Self {
        Self {
            tenant,
            conversation,
            query: query.into(),
            messages: Vec::new(),
            system_prompt: String::new(),
            bio_context: String::new(),
            customer_info: String::new(),
        }
    }

    pub fn with_messages(mut self, messages: Vec<ConversationMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }
}

/// Everything prepared for the prompt.
#[derive(Debug, Clone)]
pub struct PreparedContext {
    pub routing: RoutingDecision,
    pub retrieval: RetrievalResult,
    /// Conversation block before budgeting
    pub conversation: String,
    pub plan: TokenBudgetPlan,
}

/// External services and stores the engine is wired from.
#[derive(Clone)]
pub struct EngineParts {
    pub embedder: Arc<dyn Embedder>,
    pub chat: Arc<dyn ChatModel>,
    pub fallback: ModelFallback,
    pub reranker: Option<Arc<dyn Reranker>>,
    pub knowledge: Arc<dyn KnowledgeStore>,
    pub search: Arc<dyn HybridSearch>,
    pub sessions: Arc<dyn SessionStore>,
    pub cache: Arc<dyn Cache>,
    pub counter: Arc<TokenCounter>,
}

pub struct ContextEngine {
    router: QueryRouter,
    retrieval: Arc<dyn ContextRetrieval>,
    memory: Arc<dyn ConversationMemory>,
    budget: TokenBudgetController,
}

impl ContextEngine {
    pub fn new(
        router: QueryRouter,
        retrieval: Arc<dyn ContextRetrieval>,
        memory: Arc<dyn ConversationMemory>,
        budget: TokenBudgetController,
    ) -> Self {
        Self {
            router,
            retrieval,
            memory,
            budget,
        }
    }

    /// Wire every stage from configuration.
    ///
    /// `pipeline.enabled` selects production RAG (with the baseline
    /// retriever as its fallback); `session.version` selects the memory.
    pub fn from_config(config: &AppConfig, parts: EngineParts) -> Self {
        let normalizer = Normalizer::from_config(&config.chunking);
        let stats = KnowledgeStatsService::new(
            parts.knowledge.clone(),
            parts.cache.clone(),
            config.cache.stats_ttl(),
        );
        let router = QueryRouter::new(&config.budget, normalizer.clone()).with_stats(stats);

        let baseline: Arc<dyn ContextRetrieval> = Arc::new(ContextRetriever::new(
            parts.embedder.clone(),
            parts.search.clone(),
            parts.knowledge.clone(),
            normalizer.clone(),
            &config.retrieval,
        ));
        let retrieval: Arc<dyn ContextRetrieval> = if config.pipeline.enabled {
            let mut pipeline = ProductionRag::new(
                parts.embedder.clone(),
                parts.search.clone(),
                baseline,
                normalizer,
                &config.pipeline,
                &config.retrieval,
            );
            if let Some(reranker) = parts.reranker.clone() {
                pipeline = pipeline.with_reranker(reranker);
            }
            Arc::new(pipeline)
        } else {
            baseline
        };

        let memory = build_memory(
            &config.session,
            parts.sessions.clone(),
            parts.chat.clone(),
            parts.fallback.clone(),
            parts.counter.clone(),
        );
        let budget = TokenBudgetController::new(&config.budget, parts.counter);

        info!(
            retrieval = retrieval.name(),
            memory = memory.name(),
            "Context engine ready"
        );
        Self::new(router, retrieval, memory, budget)
    }

    pub fn retrieval(&self) -> &Arc<dyn ContextRetrieval> {
        &self.retrieval
    }

    pub fn memory(&self) -> &Arc<dyn ConversationMemory> {
        &self.memory
    }

    pub fn budget(&self) -> &TokenBudgetController {
        &self.budget
    }

    /// Prepare the prompt context for one turn.
    ///
    /// Retrieval and memory degrade instead of failing; the only error is a
    /// budget configuration that cannot hold the critical rules.
    pub async fn prepare(&self, input: &TurnInput) -> Result<PreparedContext, Error> {
        let routing = self.router.route_query(&input.query, &input.tenant).await;
        let request = RetrievalRequest::from_decision(&input.query, input.tenant.clone(), &routing);
        let retrieval = self.retrieval.retrieve_context(&request).await;

        let conversation = self
            .memory
            .get_conversation_context(&input.conversation, &input.tenant, &input.messages)
            .await;

        let plan = self.budget.trim_to_budget(&BudgetComponents {
            system_prompt: input.system_prompt.clone(),
            bio_context: input.bio_context.clone(),
            customer_info: input.customer_info.clone(),
            conversation: conversation.clone(),
            primary_context: retrieval.primary_context.clone(),
            secondary_context: retrieval.secondary_context.clone(),
            user_query: input.query.clone(),
        })?;

        info!(
            tenant = %input.tenant,
            conversation = %input.conversation,
            intent = %routing.intent,
            method = %retrieval.retrieval_method,
            chunks = retrieval.total_chunks,
            total_tokens = plan.total_tokens,
            "Turn context prepared"
        );

        Ok(PreparedContext {
            routing,
            retrieval,
            conversation,
            plan,
        })
    }
}
