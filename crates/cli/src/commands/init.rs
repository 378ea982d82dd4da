//! `ragline init`: write a default configuration file.

use super::runtime::CliResult;
use ragline_config::AppConfig;
use std::path::Path;

pub async fn run(path: Option<&Path>, force: bool) -> CliResult {
    let default_path = AppConfig::config_path();
    let config_path = path.unwrap_or(default_path.as_path());

    println!("ragline setup");
    println!("=============\n");

    if let Some(dir) = config_path.parent()
        && !dir.as_os_str().is_empty()
        && !dir.exists()
    {
        std::fs::create_dir_all(dir)?;
        println!("  Created config directory: {}", dir.display());
    }

    if config_path.exists() && !force {
        println!("  Config already exists at: {}", config_path.display());
        println!("  Edit it manually or re-run with --force.\n");
        return Ok(());
    }

    std::fs::write(config_path, AppConfig::default_toml())?;
    println!("  Created config at: {}", config_path.display());
    println!("\nNext steps:");
    println!("  1. Set RAGLINE_API_KEY (or provider.api_key in the config)");
    println!("  2. ragline ingest --tenant <id> --file knowledge.json");
    println!("  3. ragline query --tenant <id> \"your question\"\n");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_loadable_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        run(Some(path.as_path()), false).await.unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.budget.max_total_tokens, 2200);
    }

    #[tokio::test]
    async fn keeps_existing_config_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "# mine\n").unwrap();

        run(Some(path.as_path()), false).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# mine\n");

        run(Some(path.as_path()), true).await.unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("[budget]"));
    }
}
