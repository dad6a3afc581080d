//! Command handlers for the notevault CLI.

pub mod ask;
pub mod clean;
pub mod index;
pub mod search;
pub mod status;

pub use ask::AskCommand;
pub use clean::CleanCommand;
pub use index::IndexCommand;
pub use search::SearchCommand;
pub use status::StatusCommand;

use notevault_core::{AppError, AppResult};
use notevault_rag::RetrievalMode;

/// Parse a `--mode` value.
pub(crate) fn parse_mode(mode: Option<&str>, default: RetrievalMode) -> AppResult<RetrievalMode> {
    match mode {
        Some(mode) => mode
            .parse()
            .map_err(|e: AppError| AppError::InvalidQuery(e.to_string())),
        None => Ok(default),
    }
}

pub(crate) fn print_json(value: &serde_json::Value) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
