//! Status command handler.

use super::print_json;
use clap::Args;
use notevault_core::{config::AppConfig, AppResult};
use notevault_rag::RagEngine;

/// Compare the index against the vault on disk
#[derive(Args, Debug)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatusCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing status command");

        let engine = RagEngine::build(config).await?;
        let status = engine.check_sync_status().await;

        let indexed_notes = match engine.indexer() {
            Ok(indexer) => indexer
                .load_hashes(engine.vault())
                .map(|hashes| hashes.len())
                .ok(),
            Err(_) => None,
        };

        let model = match engine.generator().ready() {
            Some(generator) => match generator.model_installed().await {
                Ok(true) => format!("{} (installed)", generator.model()),
                Ok(false) => format!("{} (not installed)", generator.model()),
                Err(e) => format!("{} (registry unavailable: {})", generator.model(), e),
            },
            None => engine.generator().reason().unwrap_or("unavailable").to_string(),
        };

        if self.json {
            print_json(&serde_json::json!({
                "vault": engine.vault(),
                "collection": engine.collection(),
                "status": status,
                "indexedNotes": indexed_notes,
                "store": engine.store().reason().unwrap_or("ready"),
                "model": model,
                "web": engine.has_web(),
            }))?;
        } else {
            println!("Vault:      {}", engine.vault().display());
            println!("Collection: {}", engine.collection());
            println!("Status:     {}", status);
            if let Some(count) = indexed_notes {
                println!("Indexed:    {} notes", count);
            }
            if let Some(reason) = engine.store().reason() {
                println!("Store:      {}", reason);
            }
            println!("Model:      {}", model);
        }

        Ok(())
    }
}
