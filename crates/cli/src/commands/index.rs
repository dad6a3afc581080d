//! Index command handler.

use super::print_json;
use clap::Args;
use notevault_core::{config::AppConfig, AppResult};
use notevault_rag::{IndexStats, ProgressEvent, ProgressReporter, RagEngine};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Index the vault, or a single note
#[derive(Args, Debug)]
pub struct IndexCommand {
    /// Index only this note (absolute or vault-relative)
    #[arg(long, conflicts_with = "remove")]
    pub file: Option<PathBuf>,

    /// Remove this note from the index
    #[arg(long)]
    pub remove: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IndexCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing index command");

        let progress = if self.json {
            ProgressReporter::noop()
        } else {
            ProgressReporter::new(Arc::new(|event: ProgressEvent| {
                eprintln!("{}", event.format_simple());
            }))
        };

        let engine = RagEngine::build_with_progress(config, progress).await?;
        let indexer = engine.indexer()?;
        let vault = engine.vault();

        let stats = if let Some(path) = &self.file {
            indexer.index_file(vault, path).await?
        } else if let Some(path) = &self.remove {
            indexer.remove_file(vault, path).await?
        } else {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            let watcher = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, finishing the current note");
                    on_signal.cancel();
                }
            });

            let result = indexer.reindex_vault(vault, &cancel).await;
            watcher.abort();
            result?
        };

        let status = engine.check_sync_status().await;

        if self.json {
            print_json(&serde_json::json!({
                "vault": vault,
                "collection": engine.collection(),
                "stats": stats,
                "status": status,
            }))?;
        } else {
            print_summary(&stats);
            println!("Index status: {}", status);
        }

        Ok(())
    }
}

fn print_summary(stats: &IndexStats) {
    println!(
        "Indexed {} of {} notes ({} unchanged, {} removed, {} failed), {} chunks in {:.2}s",
        stats.files_indexed,
        stats.files_seen,
        stats.files_unchanged,
        stats.files_removed,
        stats.files_failed,
        stats.chunks_upserted,
        stats.duration_secs
    );
    if stats.cancelled {
        println!("Pass cancelled; run `notevault index` again to finish.");
    }
}
