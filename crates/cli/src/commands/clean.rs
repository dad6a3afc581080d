//! Clean command handler.

use super::print_json;
use clap::Args;
use notevault_core::{config::AppConfig, AppResult};
use notevault_rag::RagEngine;

/// Drop the vault's collection and its recorded hashes
#[derive(Args, Debug)]
pub struct CleanCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl CleanCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing clean command");

        let engine = RagEngine::build(config).await?;
        engine.indexer()?.drop_vault(engine.vault()).await?;

        if self.json {
            print_json(&serde_json::json!({
                "vault": engine.vault(),
                "collection": engine.collection(),
                "dropped": true,
            }))?;
        } else {
            println!("Dropped index for {}", engine.vault().display());
        }

        Ok(())
    }
}
