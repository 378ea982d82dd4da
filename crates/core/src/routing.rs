//! Query routing decision types.

use crate::chunk::ChunkType;
use serde::{Deserialize, Serialize};

/// What the customer is asking about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    ProductInquiry,
    Pricing,
    Support,
    BusinessInfo,
    General,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::ProductInquiry => "product_inquiry",
            Intent::Pricing => "pricing",
            Intent::Support => "support",
            Intent::BusinessInfo => "business_info",
            Intent::General => "general",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token budgets for the two knowledge buckets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBudgets {
    pub primary: usize,
    pub secondary: usize,
}

impl TokenBudgets {
    pub fn total(&self) -> usize {
        self.primary + self.secondary
    }
}

/// Per-query routing output. Transient, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub intent: Intent,

    /// Confidence in [0, 1]
    pub confidence: f32,

    pub primary_source: ChunkType,

    /// Ordered by preference
    #[serde(default)]
    pub secondary_sources: Vec<ChunkType>,

    pub token_budgets: TokenBudgets,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords_matched: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_serializes_snake_case() {
        let decision = RoutingDecision {
            intent: Intent::ProductInquiry,
            confidence: 0.8,
            primary_source: ChunkType::Product,
            secondary_sources: vec![ChunkType::Faq],
            token_budgets: TokenBudgets {
                primary: 600,
                secondary: 300,
            },
            keywords_matched: vec!["price".into()],
        };
        let json = serde_json::to_string(&decision).unwrap();
        assert!(json.contains("product_inquiry"));
        assert!(json.contains("\"primary_source\":\"product\""));
        assert_eq!(decision.token_budgets.total(), 900);
    }
}
