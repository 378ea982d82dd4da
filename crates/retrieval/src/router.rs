//! Deterministic query router.
//!
//! Keyword lexicons (English and Persian) pick an intent, the intent picks
//! an ordered list of sources, and the tenant's knowledge stats demote
//! sources that have no chunks. Token budgets come from the budget config:
//! primary gets `0.5 + 0.3 × confidence` of the knowledge budget (capped at
//! its section budget), secondary the rest (capped likewise).

use ragline_config::BudgetConfig;
use ragline_core::chunk::{ChunkType, TenantId};
use ragline_core::routing::{Intent, RoutingDecision, TokenBudgets};
use ragline_knowledge::{KnowledgeStatsService, Normalizer};
use tracing::{debug, warn};

const GENERAL_CONFIDENCE: f32 = 0.3;
const MAX_CONFIDENCE: f32 = 0.95;

// ── Lexicons ─────────────────────────────────────────────────────────────

const PRICING: &[&str] = &[
    "price", "prices", "cost", "costs", "how much", "cheap", "expensive", "discount", "sale",
    "offer", "قیمت", "چند", "چنده", "هزینه", "تخفیف", "ارزان", "گران", "فروش ویژه",
];

const PRODUCT: &[&str] = &[
    "product", "products", "buy", "available", "stock", "size", "color", "colour", "model",
    "order", "catalog", "محصول", "محصولات", "خرید", "موجود", "موجودی", "سایز", "رنگ", "مدل",
    "سفارش",
];

const SUPPORT: &[&str] = &[
    "shipping", "ship", "delivery", "deliver", "return", "refund", "warranty", "how to",
    "how do", "install", "problem", "broken", "track", "ارسال", "تحویل", "مرجوع", "بازگشت",
    "گارانتی", "مشکل", "نصب", "پیگیری", "خراب",
];

const BUSINESS_INFO: &[&str] = &[
    "hours", "open", "opening", "address", "location", "where", "contact", "phone", "email",
    "about", "instagram", "ساعت", "باز", "آدرس", "کجا", "تماس", "تلفن", "شماره", "درباره",
];

/// Tie-break order when two intents match the same number of keywords.
const INTENT_ORDER: [(Intent, &[&str]); 4] = [
    (Intent::Pricing, PRICING),
    (Intent::ProductInquiry, PRODUCT),
    (Intent::Support, SUPPORT),
    (Intent::BusinessInfo, BUSINESS_INFO),
];

/// Preferred sources for an intent: primary first, then secondaries in order.
pub fn source_order(intent: Intent) -> (ChunkType, Vec<ChunkType>) {
    use ChunkType::*;
    match intent {
        Intent::ProductInquiry => (Product, vec![Faq, Website, Manual]),
        Intent::Pricing => (Product, vec![Faq, Manual]),
        Intent::Support => (Faq, vec![Manual, Website]),
        Intent::BusinessInfo => (Website, vec![Faq, Manual]),
        Intent::General => (Faq, vec![Website, Manual, Product]),
    }
}

fn matched_keywords(padded_query: &str, lexicon: &[&str]) -> Vec<String> {
    lexicon
        .iter()
        .filter(|kw| padded_query.contains(&format!(" {kw} ")))
        .map(|kw| kw.to_string())
        .collect()
}

/// Query text as ` word word word `, lowercased, for whole-word matching.
fn padded_terms(query: &str) -> String {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric() && c != '\u{200C}')
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect();
    format!(" {} ", terms.join(" "))
}

pub struct QueryRouter {
    stats: Option<KnowledgeStatsService>,
    normalizer: Normalizer,
    budget: BudgetConfig,
}

impl QueryRouter {
    pub fn new(budget: &BudgetConfig, normalizer: Normalizer) -> Self {
        Self {
            stats: None,
            normalizer,
            budget: budget.clone(),
        }
    }

    /// Demote sources that the tenant has no chunks for.
    pub fn with_stats(mut self, stats: KnowledgeStatsService) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Intent, confidence and matched keywords for a query.
    pub fn classify(&self, query: &str) -> (Intent, f32, Vec<String>) {
        let padded = padded_terms(&self.normalizer.normalize(query));
        let mut best: Option<(Intent, Vec<String>)> = None;
        for (intent, lexicon) in INTENT_ORDER {
            let hits = matched_keywords(&padded, lexicon);
            if hits.is_empty() {
                continue;
            }
            if best.as_ref().is_none_or(|(_, b)| hits.len() > b.len()) {
                best = Some((intent, hits));
            }
        }
        match best {
            Some((intent, hits)) => {
                let confidence = (0.5 + 0.15 * hits.len() as f32).clamp(0.0, MAX_CONFIDENCE);
                (intent, confidence, hits)
            }
            None => (Intent::General, GENERAL_CONFIDENCE, Vec::new()),
        }
    }

    /// Split the knowledge budget between primary and secondary sources.
    pub fn budgets(&self, confidence: f32, has_secondary: bool) -> TokenBudgets {
        let available = self.budget.knowledge_available();
        let share = 0.5 + 0.3 * confidence.clamp(0.0, 1.0);
        let primary = ((available as f32 * share) as usize).min(self.budget.primary_context);
        let secondary = if has_secondary {
            available
                .saturating_sub(primary)
                .min(self.budget.secondary_context)
        } else {
            0
        };
        TokenBudgets { primary, secondary }
    }

    pub async fn route_query(&self, query: &str, tenant: &TenantId) -> RoutingDecision {
        let (intent, confidence, keywords_matched) = self.classify(query);
        let (mut primary, mut secondaries) = source_order(intent);

        if let Some(stats) = &self.stats {
            match stats.get(tenant).await {
                Ok(stats) if stats.total > 0 => {
                    if !stats.has(primary)
                        && let Some(pos) = secondaries.iter().position(|s| stats.has(*s))
                    {
                        let promoted = secondaries.remove(pos);
                        debug!(tenant = %tenant, from = %primary, to = %promoted, "Empty primary source demoted");
                        primary = promoted;
                    }
                    secondaries.retain(|s| stats.has(*s));
                }
                Ok(_) => {}
                Err(e) => warn!(tenant = %tenant, error = %e, "Knowledge stats unavailable, routing without them"),
            }
        }

        let token_budgets = self.budgets(confidence, !secondaries.is_empty());
        debug!(
            tenant = %tenant,
            %intent,
            confidence,
            primary = %primary,
            secondary = secondaries.len(),
            "Query routed"
        );
        RoutingDecision {
            intent,
            confidence,
            primary_source: primary,
            secondary_sources: secondaries,
            token_budgets,
            keywords_matched,
        }
    }
}
