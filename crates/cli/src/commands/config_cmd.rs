//! `ragline config`: configuration management commands.

use super::runtime::{CliResult, load_config};
use ragline_config::AppConfig;
use std::path::Path;

pub async fn validate(path: Option<&Path>) -> CliResult {
    println!("Validating configuration...");

    let config = match load_config(path) {
        Ok(config) => config,
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e);
        }
    };
    println!("   Config parsed successfully");

    let mut warnings = Vec::new();
    if !config.has_api_key() {
        warnings.push("No API key set (set RAGLINE_API_KEY or OPENAI_API_KEY)");
    }
    if config.retrieval.vector_weight + config.retrieval.keyword_weight <= 0.0 {
        warnings.push("Hybrid search weights must sum to > 0");
    }
    if config.pipeline.enabled && config.provider.rerank_url.is_none() {
        warnings.push("Production pipeline enabled without a rerank endpoint");
    }

    if warnings.is_empty() {
        println!("   All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   warning: {w}");
        }
    }

    println!();
    println!("   Chat model:   {}", config.provider.chat_model);
    println!("   Store:        {}", config.store.backend);
    println!("   Pipeline:     {}", if config.pipeline.enabled { "production" } else { "baseline" });
    println!("   Memory:       {:?}", config.session.version);
    println!(
        "   Budget:       {} tokens ({} usable)",
        config.budget.max_total_tokens,
        config.budget.usable_tokens()
    );

    Ok(())
}

pub async fn show(path: Option<&Path>) -> CliResult {
    let config = load_config(path)?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub async fn path(path: Option<&Path>) -> CliResult {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(AppConfig::config_path);
    println!("{}", config_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_valid() {
        let path = AppConfig::config_path();
        assert!(path.to_str().unwrap().ends_with("config.toml"));
    }

    #[tokio::test]
    async fn invalid_budget_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[budget]\nmax_total_tokens = 500\n").unwrap();
        assert!(validate(Some(path.as_path())).await.is_err());
    }
}
