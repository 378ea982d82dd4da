//! ragline CLI: the main entry point.
//!
//! Commands:
//! - `init`    Write a default config file
//! - `ingest`  Chunk and embed a tenant's knowledge bundle
//! - `query`   Route, retrieve and budget one customer turn
//! - `trim`    Run the budget controller over a components file
//! - `stats`   Show a tenant's chunk counts
//! - `config`  Show, validate or locate the configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "ragline",
    about = "ragline: RAG context pipeline for business chat assistants",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// Config file (defaults to ~/.ragline/config.toml)
    #[arg(short, long, global = true, env = "RAGLINE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Ingest a tenant's knowledge bundle (JSON with faqs/products/pages/manuals)
    Ingest {
        #[arg(short, long)]
        tenant: String,

        #[arg(short, long)]
        file: PathBuf,

        /// Re-chunk every record even when its content is unchanged
        #[arg(long)]
        force: bool,
    },

    /// Prepare the prompt context for one customer message
    Query {
        #[arg(short, long)]
        tenant: String,

        /// Use the production RAG pipeline regardless of config
        #[arg(long)]
        production: bool,

        /// Conversation ID for session memory
        #[arg(long, default_value = "cli")]
        conversation: String,

        /// System prompt file
        #[arg(long)]
        system_prompt: Option<PathBuf>,

        /// The customer message
        text: String,
    },

    /// Fit prompt components (JSON) to the token budget and print the plan
    Trim {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show a tenant's knowledge chunk counts
    Stats {
        #[arg(short, long)]
        tenant: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Validate the configuration file
    Validate,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Init { force } => commands::init::run(config_path, force).await?,
        Commands::Ingest {
            tenant,
            file,
            force,
        } => commands::ingest::run(config_path, &tenant, &file, force).await?,
        Commands::Query {
            tenant,
            production,
            conversation,
            system_prompt,
            text,
        } => {
            commands::query::run(
                config_path,
                commands::query::QueryArgs {
                    tenant,
                    conversation,
                    production,
                    system_prompt,
                    text,
                },
            )
            .await?
        }
        Commands::Trim { file } => commands::trim::run(config_path, &file).await?,
        Commands::Stats { tenant } => commands::stats::run(config_path, &tenant).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config_path).await?,
            ConfigAction::Validate => commands::config_cmd::validate(config_path).await?,
            ConfigAction::Path => commands::config_cmd::path(config_path).await?,
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_query_with_flags() {
        let cli = Cli::try_parse_from([
            "ragline",
            "query",
            "--tenant",
            "shop-1",
            "--production",
            "how much are the boots?",
        ])
        .unwrap();
        match cli.command {
            Commands::Query {
                tenant,
                production,
                conversation,
                text,
                ..
            } => {
                assert_eq!(tenant, "shop-1");
                assert!(production);
                assert_eq!(conversation, "cli");
                assert_eq!(text, "how much are the boots?");
            }
            _ => panic!("expected query"),
        }
    }

    #[test]
    fn ingest_requires_tenant() {
        assert!(Cli::try_parse_from(["ragline", "ingest", "--file", "kb.json"]).is_err());
    }
}
