//! Retrieval-augmented generation over a markdown vault.
//!
//! Indexes notes incrementally into a vector store and serves ranked
//! context (notes, web, or both) to the chat layer.
//!
//! - Indexing: `Indexer` with content hashes persisted per vault
//! - Freshness: `SyncStatusService`
//! - Retrieval: `QueryPreprocessor` -> `RagRetriever` -> `Reranker`
//! - Source combination: `RetrievalService`
//! - Chat: `ChatService`
//!
//! `RagEngine` builds all of it from an `AppConfig`.

pub mod answer;
pub mod chunker;
pub mod embeddings;
pub mod engine;
pub mod fs;
pub mod generation;
pub mod indexer;
pub mod metadata;
pub mod progress;
pub mod query;
pub mod rerank;
pub mod retrieval;
pub mod retriever;
pub mod store;
pub mod sync_status;
pub mod types;
pub mod web;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use answer::{AnswerComposer, ChatService, CONFIDENCE_THRESHOLD};
pub use chunker::Chunker;
pub use embeddings::{create_provider, EmbeddingProvider};
pub use engine::{Component, RagEngine};
pub use fs::{ContentHasher, FileSystem, LocalFileSystem, Sha256Hasher};
pub use generation::Generator;
pub use indexer::Indexer;
pub use metadata::{JsonMetadataStore, VaultMetadataStore};
pub use progress::{IndexPhase, ProgressCallback, ProgressEvent, ProgressReporter};
pub use query::QueryPreprocessor;
pub use rerank::Reranker;
pub use retrieval::RetrievalService;
pub use retriever::{RagRetrieval, RagRetriever};
pub use store::{collection_key, create_store, VectorStore};
pub use sync_status::{SyncDiff, SyncStatusService};
pub use types::{
    Chunk, ContextItem, EmbeddedChunk, IndexStats, RagChunk, RagResult, RetrievalMode,
    RetrievedContext, SearchResult, SyncStatus, VaultMetadata, WebResult,
};
pub use web::{create_web_search, SearxngClient, WebSearchClient};
