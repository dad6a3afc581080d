//! Search command handler.

use super::{parse_mode, print_json};
use clap::Args;
use notevault_core::{config::AppConfig, AppResult};
use notevault_rag::{ContextItem, RagEngine};

/// Retrieve context for a query without generating an answer
#[derive(Args, Debug)]
pub struct SearchCommand {
    /// Query text
    pub query: String,

    /// Retrieval mode (none, rag, web, hybrid)
    #[arg(long)]
    pub mode: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing search command");

        let engine = RagEngine::build(config).await?;
        let mode = parse_mode(self.mode.as_deref(), engine.default_mode())?;
        let context = engine.retrieval().await.retrieve(&self.query, mode).await?;

        if self.json {
            print_json(&serde_json::to_value(&context)?)?;
            return Ok(());
        }

        if context.is_empty() {
            println!("No matching context.");
        }

        for (i, item) in context.items.iter().enumerate() {
            match item {
                ContextItem::Rag(chunk) => {
                    let location = chunk
                        .location()
                        .map(|l| format!(", {}", l))
                        .unwrap_or_default();
                    println!(
                        "[{}] {}{} (score {:.3})",
                        i + 1,
                        chunk.source_path,
                        location,
                        chunk.rerank_score.unwrap_or(chunk.score)
                    );
                    println!("    {}", preview(&chunk.text));
                }
                ContextItem::Web(result) => {
                    println!("[{}] {} ({})", i + 1, result.title, result.url);
                    println!("    {}", preview(&result.snippet));
                }
            }
        }

        if context.degraded {
            println!("\nSome sources were unavailable; used: {}", context.sources_used.join(", "));
        }

        Ok(())
    }
}

fn preview(text: &str) -> String {
    let line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match line.char_indices().nth(160) {
        Some((end, _)) => format!("{}…", &line[..end]),
        None => line,
    }
}
