//! `ragline trim`: fit prompt components to the token budget.
//!
//! Reads a JSON `BudgetComponents` document and prints the resulting plan.

use super::runtime::{CliResult, load_config, token_counter};
use ragline_engine::{BudgetComponents, TokenBudgetController, TokenBudgetPlan};
use std::path::Path;

pub async fn run(config_path: Option<&Path>, file: &Path) -> CliResult {
    let config = load_config(config_path)?;
    let json = std::fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {}: {e}", file.display()))?;

    let controller = TokenBudgetController::new(&config.budget, token_counter(&config));
    let plan = trim_json(&controller, &json)?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

pub fn trim_json(controller: &TokenBudgetController, json: &str) -> CliResult<TokenBudgetPlan> {
    let components: BudgetComponents = serde_json::from_str(json)?;
    Ok(controller.trim_to_budget(&components)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragline_config::BudgetConfig;
    use ragline_core::token::TokenCounter;
    use std::sync::Arc;

    fn controller() -> TokenBudgetController {
        TokenBudgetController::new(&BudgetConfig::default(), Arc::new(TokenCounter::default()))
    }

    #[test]
    fn partial_components_are_accepted() {
        let plan = trim_json(
            &controller(),
            r#"{
                "system_prompt": "Be brief.",
                "user_query": "hi",
                "primary_context": [
                    {"title": "Hours", "content": "Open 9 to 5", "type": "website", "score": 0.9}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(plan.primary_context.items.len(), 1);
        assert!(plan.secondary_context.items.is_empty());
        assert_eq!(plan.total_tokens, plan.recount());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(trim_json(&controller(), "{ not json").is_err());
    }
}
