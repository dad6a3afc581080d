//! Error types for notevault.
//!
//! One enum covers every failure category of the RAG subsystem. Variants are
//! split along the lines callers actually branch on: an unreachable vector
//! store is handled differently from a malformed query, and a single file
//! failing to index is not the same as the whole pass failing.

use thiserror::Error;

/// Unified error type for notevault.
///
/// All fallible functions return `Result<T, AppError>`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generation model errors (network, auth, malformed response)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Embedding backend unreachable or rejected the request
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Vector store could not be reached at all
    #[error("Vector store unreachable: {0}")]
    StoreUnreachable(String),

    /// Vector store was reached but rejected the request
    #[error("Invalid vector store query: {0}")]
    InvalidQuery(String),

    /// A single file could not be chunked, embedded or upserted
    #[error("Failed to index {path}: {reason}")]
    IndexingFile { path: String, reason: String },

    /// Reranker could not be constructed
    #[error("Reranker initialization failed: {0}")]
    RerankerInit(String),

    /// Every retrieval source of the active mode failed
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether this error means a backend could not be reached.
    ///
    /// Unreachability is what turns a vault's sync status into `Unavailable`
    /// and what disables RAG for the rest of a chat session.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, AppError::StoreUnreachable(_))
    }

    /// Wrap any error as a per-file indexing failure.
    pub fn indexing_file(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        AppError::IndexingFile {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_classification() {
        assert!(AppError::StoreUnreachable("connection refused".into()).is_unreachable());
        assert!(!AppError::InvalidQuery("bad dimension".into()).is_unreachable());
        assert!(!AppError::Embedding("timeout".into()).is_unreachable());
    }

    #[test]
    fn test_indexing_file_message() {
        let err = AppError::indexing_file("notes/a.md", "embedding failed");
        assert_eq!(err.to_string(), "Failed to index notes/a.md: embedding failed");
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: AppError = parse.unwrap_err().into();
        assert!(matches!(err, AppError::Serialization(_)));
    }
}
