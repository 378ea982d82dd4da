//! Token budget controller: the last allocator before the LLM call.
//!
//! Every prompt section gets a fixed token allocation; knowledge context
//! gets what the fixed sections leave. A final verification pass recounts
//! the real total and corrects it in place, so a plan never exceeds
//! `max_total_tokens`.

pub mod controller;
pub mod critical;

pub use controller::TokenBudgetController;
pub use critical::{CriticalRules, extract_critical_rules};

use ragline_core::chunk::ContextChunk;
use serde::{Deserialize, Serialize};

// ── Types ─────────────────────────────────────────────────────────────────

/// Raw prompt inputs, before any trimming.
///
/// Context lists must already be ordered by relevance; the controller
/// never reorders them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetComponents {
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub bio_context: String,
    #[serde(default)]
    pub customer_info: String,
    #[serde(default)]
    pub conversation: String,
    #[serde(default)]
    pub primary_context: Vec<ContextChunk>,
    #[serde(default)]
    pub secondary_context: Vec<ContextChunk>,
    #[serde(default)]
    pub user_query: String,
}

/// Prompt section names, in the order they are allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptSection {
    UserQuery,
    SystemPrompt,
    BioContext,
    CustomerInfo,
    Conversation,
    PrimaryContext,
    SecondaryContext,
}

impl PromptSection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserQuery => "user_query",
            Self::SystemPrompt => "system_prompt",
            Self::BioContext => "bio_context",
            Self::CustomerInfo => "customer_info",
            Self::Conversation => "conversation",
            Self::PrimaryContext => "primary_context",
            Self::SecondaryContext => "secondary_context",
        }
    }
}

impl std::fmt::Display for PromptSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A text section after allocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextSection {
    pub text: String,
    pub tokens: usize,
}

/// A knowledge section after packing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextSection {
    pub items: Vec<ContextChunk>,
    pub tokens: usize,
}

/// Why a section was cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    /// Longer than its own allocation
    SectionBudget,
    /// Conversation shrunk to leave room for knowledge
    KnowledgeHeadroom,
    /// Knowledge items that did not fit were left out
    ItemsDropped,
    /// The top item alone was larger than the budget and was cut to fit
    FirstItemTruncated,
    /// The verified total exceeded the ceiling
    CeilingExceeded,
}

/// One trimming step, for logs and diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetAdjustment {
    pub section: PromptSection,
    pub reason: AdjustmentReason,
    pub tokens_before: usize,
    pub tokens_after: usize,
}

/// The allocated prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBudgetPlan {
    pub system_prompt: TextSection,
    pub bio_context: TextSection,
    pub customer_info: TextSection,
    pub conversation: TextSection,
    pub primary_context: ContextSection,
    pub secondary_context: ContextSection,
    pub user_query: TextSection,
    pub total_tokens: usize,
    pub max_total_tokens: usize,
    pub adjustments: Vec<BudgetAdjustment>,
}

impl TokenBudgetPlan {
    pub fn section_tokens(&self, section: PromptSection) -> usize {
        match section {
            PromptSection::UserQuery => self.user_query.tokens,
            PromptSection::SystemPrompt => self.system_prompt.tokens,
            PromptSection::BioContext => self.bio_context.tokens,
            PromptSection::CustomerInfo => self.customer_info.tokens,
            PromptSection::Conversation => self.conversation.tokens,
            PromptSection::PrimaryContext => self.primary_context.tokens,
            PromptSection::SecondaryContext => self.secondary_context.tokens,
        }
    }

    /// Sum of every section's token count.
    pub fn recount(&self) -> usize {
        [
            PromptSection::UserQuery,
            PromptSection::SystemPrompt,
            PromptSection::BioContext,
            PromptSection::CustomerInfo,
            PromptSection::Conversation,
            PromptSection::PrimaryContext,
            PromptSection::SecondaryContext,
        ]
        .iter()
        .map(|s| self.section_tokens(*s))
        .sum()
    }

    /// Whether any step touched `section`.
    pub fn was_adjusted(&self, section: PromptSection) -> bool {
        self.adjustments.iter().any(|a| a.section == section)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BudgetError {
    /// The critical safety rules and the query cannot fit at all
    #[error(
        "critical system rules ({critical_tokens} tokens) plus the user query ({query_tokens} tokens) exceed the usable budget of {usable_tokens} tokens"
    )]
    CriticalRulesExceedCeiling {
        critical_tokens: usize,
        query_tokens: usize,
        usable_tokens: usize,
    },
}

impl From<BudgetError> for ragline_core::Error {
    fn from(e: BudgetError) -> Self {
        ragline_core::Error::config(e.to_string())
    }
}
