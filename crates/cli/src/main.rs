//! Notevault CLI
//!
//! Main entry point for the notevault command-line tool.
//! Indexes a markdown vault and answers questions from it.

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use commands::{AskCommand, CleanCommand, IndexCommand, SearchCommand, StatusCommand};
use notevault_core::config::{AppConfig, STATE_DIR_NAME};
use notevault_core::logging;
use std::path::PathBuf;

/// Notevault - semantic search and chat over your markdown notes
#[derive(Parser, Debug)]
#[command(name = "notevault")]
#[command(about = "Semantic search and chat over your markdown notes", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "NOTEVAULT_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Vault root to index (default: the workspace)
    #[arg(long, global = true, env = "NOTEVAULT_VAULT")]
    vault: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "NOTEVAULT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// LLM provider (ollama, openai)
    #[arg(short, long, global = true, env = "NOTEVAULT_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "NOTEVAULT_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Index the vault (incremental)
    Index(IndexCommand),

    /// Show whether the index matches the vault
    Status(StatusCommand),

    /// Retrieve context without asking the model
    Search(SearchCommand),

    /// Ask a question about your notes
    Ask(AskCommand),

    /// Drop the vault's index
    Clean(CleanCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    let mut config = AppConfig::load().context("Failed to load configuration")?;

    // Flags only exist after parsing, so their config file is merged here
    if let Some(path) = config_file_from_flags(&cli, &config) {
        config = config
            .merge_yaml(&path)
            .with_context(|| format!("Failed to load config file {:?}", path))?;
    }

    // CLI flags win over the config file and environment
    let config = config.with_overrides(
        cli.workspace,
        cli.vault,
        cli.config,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    logging::init_logging(config.log_level.as_deref(), config.no_color, config.log_format)?;

    tracing::info!("Notevault CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Vault: {:?}", config.vault);
    tracing::debug!("Provider: {} ({})", config.provider, config.model);

    config.ensure_state_dir()?;

    let command_name = match &cli.command {
        Commands::Index(_) => "index",
        Commands::Status(_) => "status",
        Commands::Search(_) => "search",
        Commands::Ask(_) => "ask",
        Commands::Clean(_) => "clean",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Index(cmd) => cmd.execute(&config).await,
        Commands::Status(cmd) => cmd.execute(&config).await,
        Commands::Search(cmd) => cmd.execute(&config).await,
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Clean(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result.with_context(|| format!("notevault {} failed", command_name))
}

/// Config file named by `--config`, or found in a `--workspace` other than
/// the one already loaded.
fn config_file_from_flags(cli: &Cli, config: &AppConfig) -> Option<PathBuf> {
    if let Some(path) = &cli.config {
        return (config.config_file.as_ref() != Some(path)).then(|| path.clone());
    }

    let workspace = cli.workspace.as_ref().filter(|w| **w != config.workspace)?;
    let path = workspace.join(STATE_DIR_NAME).join("config.yaml");
    path.exists().then_some(path)
}
