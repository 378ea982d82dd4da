use super::critical::extract_critical_rules;
use super::{
    AdjustmentReason, BudgetAdjustment, BudgetComponents, BudgetError, ContextSection,
    PromptSection, TextSection, TokenBudgetPlan,
};
use ragline_config::BudgetConfig;
use ragline_core::chunk::ContextChunk;
use ragline_core::token::TokenCounter;
use std::sync::Arc;
use tracing::{debug, error, info};

fn text_tokens(sections: &[&TextSection]) -> usize {
    sections.iter().map(|s| s.tokens).sum()
}

/// Allocates the prompt across its sections under a hard ceiling.
///
/// Precedence when something has to give, most protected first: user
/// query, critical system rules, the rest of the system prompt, customer
/// and bio, conversation, primary knowledge, secondary knowledge.
pub struct TokenBudgetController {
    config: BudgetConfig,
    counter: Arc<TokenCounter>,
}

impl TokenBudgetController {
    pub fn new(config: &BudgetConfig, counter: Arc<TokenCounter>) -> Self {
        Self {
            config: config.clone(),
            counter,
        }
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    pub fn counter(&self) -> &TokenCounter {
        &self.counter
    }

    fn fit_text(
        &self,
        section: PromptSection,
        text: &str,
        budget: usize,
        reason: AdjustmentReason,
        adjustments: &mut Vec<BudgetAdjustment>,
    ) -> TextSection {
        let text = text.trim();
        let tokens = self.counter.count(text);
        if tokens <= budget {
            return TextSection {
                text: text.to_string(),
                tokens,
            };
        }
        let cut = self.counter.truncate(text, budget);
        let after = self.counter.count(&cut);
        debug!(section = %section, before = tokens, after, budget, "Section truncated");
        adjustments.push(BudgetAdjustment {
            section,
            reason,
            tokens_before: tokens,
            tokens_after: after,
        });
        TextSection { text: cut, tokens: after }
    }

    fn pack_items(&self, items: &[ContextChunk], budget: usize) -> (ContextSection, bool) {
        let mut kept = Vec::new();
        let mut used = 0;
        let mut truncated_first = false;

        for (index, item) in items.iter().take(self.config.max_context_items).enumerate() {
            let cost = self.counter.count(&item.content);
            if used + cost <= budget {
                used += cost;
                kept.push(item.clone());
                continue;
            }
            if index == 0 {
                let cut = self.counter.truncate(&item.content, budget);
                if !cut.is_empty() {
                    used = self.counter.count(&cut);
                    kept.push(ContextChunk {
                        word_count: cut.split_whitespace().count(),
                        content: cut,
                        ..item.clone()
                    });
                    truncated_first = true;
                }
            }
            // First rejection ends packing
            break;
        }

        (ContextSection { items: kept, tokens: used }, truncated_first)
    }

    /// Greedily pack rank-ordered items into `budget` tokens.
    ///
    /// Only the first `max_context_items` are considered. Packing stops at
    /// the first item that does not fit, except that an oversized first
    /// item is truncated to fit so the section is never empty while
    /// candidates exist.
    pub fn trim_context_items(&self, items: &[ContextChunk], budget: usize) -> ContextSection {
        self.pack_items(items, budget).0
    }

    fn fit_items(
        &self,
        section: PromptSection,
        items: &[ContextChunk],
        budget: usize,
        reason: AdjustmentReason,
        adjustments: &mut Vec<BudgetAdjustment>,
    ) -> ContextSection {
        let (packed, truncated_first) = self.pack_items(items, budget);
        if truncated_first || packed.items.len() < items.len() {
            let before: usize = items.iter().map(|i| self.counter.count(&i.content)).sum();
            let reason = if truncated_first && reason == AdjustmentReason::ItemsDropped {
                AdjustmentReason::FirstItemTruncated
            } else {
                reason
            };
            debug!(
                section = %section,
                kept = packed.items.len(),
                total = items.len(),
                tokens = packed.tokens,
                budget,
                "Knowledge items trimmed"
            );
            adjustments.push(BudgetAdjustment {
                section,
                reason,
                tokens_before: before,
                tokens_after: packed.tokens,
            });
        }
        packed
    }

    /// Allocate every section and verify the total against the ceiling.
    ///
    /// Fails only when the critical system rules and the (already capped)
    /// user query cannot fit in the usable budget at all.
    pub fn trim_to_budget(&self, components: &BudgetComponents) -> Result<TokenBudgetPlan, BudgetError> {
        let config = &self.config;
        let usable = config.usable_tokens();
        let mut adjustments = Vec::new();

        // ── User query (capped, never dropped) ─────────────────────────────
        let user_query = self.fit_text(
            PromptSection::UserQuery,
            &components.user_query,
            config.user_query,
            AdjustmentReason::SectionBudget,
            &mut adjustments,
        );

        // ── System prompt: critical rules are never truncated ──────────────
        let critical = extract_critical_rules(&components.system_prompt, &config.critical_markers);
        let critical_tokens = self.counter.count(&critical.text());
        if critical_tokens + user_query.tokens > usable {
            error!(
                critical_tokens,
                query_tokens = user_query.tokens,
                usable,
                "Critical system rules cannot fit the prompt budget"
            );
            return Err(BudgetError::CriticalRulesExceedCeiling {
                critical_tokens,
                query_tokens: user_query.tokens,
                usable_tokens: usable,
            });
        }

        let system_before = self.counter.count(components.system_prompt.trim());
        let mut remainder = self
            .counter
            .truncate(&critical.remainder, config.system_prompt.saturating_sub(critical_tokens));
        let system_text = critical.reassemble(&remainder);
        let mut system_prompt = TextSection {
            tokens: self.counter.count(&system_text),
            text: system_text,
        };
        if system_prompt.tokens < system_before {
            adjustments.push(BudgetAdjustment {
                section: PromptSection::SystemPrompt,
                reason: AdjustmentReason::SectionBudget,
                tokens_before: system_before,
                tokens_after: system_prompt.tokens,
            });
        }

        // ── Fixed sections ─────────────────────────────────────────────────
        let mut bio_context = self.fit_text(
            PromptSection::BioContext,
            &components.bio_context,
            config.bio_context,
            AdjustmentReason::SectionBudget,
            &mut adjustments,
        );
        let mut customer_info = self.fit_text(
            PromptSection::CustomerInfo,
            &components.customer_info,
            config.customer_info,
            AdjustmentReason::SectionBudget,
            &mut adjustments,
        );
        let mut conversation = self.fit_text(
            PromptSection::Conversation,
            &components.conversation,
            config.conversation,
            AdjustmentReason::SectionBudget,
            &mut adjustments,
        );

        let mut headroom = usable.saturating_sub(text_tokens(&[
            &user_query,
            &system_prompt,
            &bio_context,
            &customer_info,
            &conversation,
        ]));

        // Knowledge beats conversation history under pressure
        if headroom < config.min_knowledge_tokens && conversation.tokens > 0 {
            let target = conversation.tokens.saturating_sub(config.conversation_shrink);
            conversation = self.fit_text(
                PromptSection::Conversation,
                &conversation.text,
                target,
                AdjustmentReason::KnowledgeHeadroom,
                &mut adjustments,
            );
            headroom = usable.saturating_sub(text_tokens(&[
                &user_query,
                &system_prompt,
                &bio_context,
                &customer_info,
                &conversation,
            ]));
        }

        // ── Knowledge ──────────────────────────────────────────────────────
        let (primary_budget, secondary_budget) = if components.primary_context.is_empty() {
            // An empty primary bucket hands its share to secondary
            (
                0,
                headroom.min(config.primary_context + config.secondary_context),
            )
        } else {
            let primary = ((headroom as f32 * config.primary_share) as usize).min(config.primary_context);
            (
                primary,
                headroom.saturating_sub(primary).min(config.secondary_context),
            )
        };
        debug!(headroom, primary_budget, secondary_budget, "Knowledge budget split");

        let mut primary_context = self.fit_items(
            PromptSection::PrimaryContext,
            &components.primary_context,
            primary_budget,
            AdjustmentReason::ItemsDropped,
            &mut adjustments,
        );
        let mut secondary_context = self.fit_items(
            PromptSection::SecondaryContext,
            &components.secondary_context,
            secondary_budget,
            AdjustmentReason::ItemsDropped,
            &mut adjustments,
        );

        // ── Verification ───────────────────────────────────────────────────
        let ceiling = config.max_total_tokens;
        let mut total_tokens = text_tokens(&[
            &user_query,
            &system_prompt,
            &bio_context,
            &customer_info,
            &conversation,
        ]) + primary_context.tokens
            + secondary_context.tokens;

        if total_tokens > ceiling {
            error!(total_tokens, ceiling, "Prompt over the token ceiling after allocation, correcting");

            if !secondary_context.items.is_empty() {
                adjustments.push(BudgetAdjustment {
                    section: PromptSection::SecondaryContext,
                    reason: AdjustmentReason::CeilingExceeded,
                    tokens_before: secondary_context.tokens,
                    tokens_after: 0,
                });
                total_tokens -= secondary_context.tokens;
                secondary_context = ContextSection::default();
            }

            if total_tokens > ceiling && primary_context.tokens > 0 {
                let overage = total_tokens - ceiling;
                let before = primary_context.tokens;
                let items = std::mem::take(&mut primary_context.items);
                primary_context = self.fit_items(
                    PromptSection::PrimaryContext,
                    &items,
                    before.saturating_sub(overage),
                    AdjustmentReason::CeilingExceeded,
                    &mut adjustments,
                );
                total_tokens = total_tokens - before + primary_context.tokens;
            }

            for (section, text) in [
                (PromptSection::Conversation, &mut conversation),
                (PromptSection::CustomerInfo, &mut customer_info),
                (PromptSection::BioContext, &mut bio_context),
            ] {
                if total_tokens <= ceiling {
                    break;
                }
                let overage = total_tokens - ceiling;
                let before = text.tokens;
                *text = self.fit_text(
                    section,
                    &text.text,
                    before.saturating_sub(overage),
                    AdjustmentReason::CeilingExceeded,
                    &mut adjustments,
                );
                total_tokens = total_tokens - before + text.tokens;
            }

            // Last resort: the non-critical part of the system prompt
            while total_tokens > ceiling && !remainder.is_empty() {
                let overage = total_tokens - ceiling;
                let before = system_prompt.tokens;
                let target = self.counter.count(&remainder).saturating_sub(overage);
                let shorter = self.counter.truncate(&remainder, target);
                remainder = if shorter.len() < remainder.len() {
                    shorter
                } else {
                    String::new()
                };
                let text = critical.reassemble(&remainder);
                system_prompt = TextSection {
                    tokens: self.counter.count(&text),
                    text,
                };
                adjustments.push(BudgetAdjustment {
                    section: PromptSection::SystemPrompt,
                    reason: AdjustmentReason::CeilingExceeded,
                    tokens_before: before,
                    tokens_after: system_prompt.tokens,
                });
                total_tokens = total_tokens - before + system_prompt.tokens;
            }
        }

        info!(
            total_tokens,
            ceiling,
            primary_items = primary_context.items.len(),
            secondary_items = secondary_context.items.len(),
            adjustments = adjustments.len(),
            "Prompt budget allocated"
        );

        Ok(TokenBudgetPlan {
            system_prompt,
            bio_context,
            customer_info,
            conversation,
            primary_context,
            secondary_context,
            user_query,
            total_tokens,
            max_total_tokens: ceiling,
            adjustments,
        })
    }
}
