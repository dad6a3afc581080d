//! Ask command handler.

use super::{parse_mode, print_json};
use clap::Args;
use notevault_core::{config::AppConfig, AppResult};
use notevault_rag::RagEngine;

/// Ask a question about your notes
#[derive(Args, Debug)]
pub struct AskCommand {
    /// Question text
    pub query: String,

    /// Retrieval mode (none, rag, web, hybrid)
    #[arg(long)]
    pub mode: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");

        let engine = RagEngine::build(config).await?;
        let mode = parse_mode(self.mode.as_deref(), engine.default_mode())?;
        let result = engine.chat().await?.ask(&self.query, mode).await?;

        tracing::debug!(
            "Answer metadata: max_score={:?}, low_confidence={:?}, chunks={}",
            result.metadata.get("max_score"),
            result.metadata.get("low_confidence"),
            result.chunks.len()
        );

        if self.json {
            print_json(&serde_json::to_value(&result)?)?;
            return Ok(());
        }

        println!("{}", result.answer);

        if !result.chunks.is_empty() {
            println!("\nSources:");
            for (i, chunk) in result.chunks.iter().enumerate() {
                match chunk.location() {
                    Some(location) => println!("  [{}] {}, {}", i + 1, chunk.source_path, location),
                    None => println!("  [{}] {}", i + 1, chunk.source_path),
                }
            }
        }

        if result.metadata.get("low_confidence").map(String::as_str) == Some("true") {
            println!("\n(Low confidence: your notes may not cover this.)");
        }
        if result.metadata.get("degraded").map(String::as_str) == Some("true") {
            println!(
                "(Some sources were unavailable; answered with mode {}.)",
                result.metadata.get("mode").map(String::as_str).unwrap_or("none")
            );
        }

        Ok(())
    }
}
