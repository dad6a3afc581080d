//! Vector store abstraction.
//!
//! Every vault maps to one collection, keyed by [`collection_key`]. Backends
//! report `AppError::StoreUnreachable` when they cannot be reached at all and
//! `AppError::InvalidQuery` when they were reached but rejected the request.

pub mod chroma;
pub mod lance;
pub mod memory;

pub use self::chroma::ChromaStore;
pub use self::lance::LanceDbStore;
pub use self::memory::InMemoryStore;

use crate::types::{EmbeddedChunk, SearchResult};
use notevault_core::{AppConfig, AppError, AppResult};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;

/// Trait for vector store backends.
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    /// Backend name, e.g. "lancedb"
    fn backend_name(&self) -> &str;

    /// Insert chunks, overwriting any with the same ID.
    async fn upsert(&self, collection: &str, chunks: &[EmbeddedChunk]) -> AppResult<()>;

    /// Delete chunks by ID. Unknown IDs are ignored.
    async fn delete(&self, collection: &str, chunk_ids: &[String]) -> AppResult<()>;

    /// At most `max_k` results, ordered by descending score.
    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        max_k: usize,
    ) -> AppResult<Vec<SearchResult>>;

    /// Whether the collection exists and holds at least one chunk.
    async fn has_data(&self, collection: &str) -> AppResult<bool>;

    /// Cheap reachability check.
    async fn ping(&self) -> AppResult<()>;

    /// IDs of every chunk stored for one note.
    async fn chunk_ids_for_source(
        &self,
        collection: &str,
        source_path: &str,
    ) -> AppResult<Vec<String>>;

    /// Remove every chunk of a collection.
    async fn drop_collection(&self, collection: &str) -> AppResult<()>;
}

/// Collection key for a vault: `vault_` plus 16 hex chars of the SHA-256 of
/// its canonical path. Stable across sessions for the same directory.
pub fn collection_key(vault_path: &Path) -> String {
    let canonical = std::fs::canonicalize(vault_path).unwrap_or_else(|_| vault_path.to_path_buf());

    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string_lossy().as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    format!("vault_{}", &digest[..16])
}

/// Calculate cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Sort hits by descending score and keep the first `max_k`.
pub(crate) fn rank(mut results: Vec<SearchResult>, max_k: usize) -> Vec<SearchResult> {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(max_k);
    results
}

/// Create the configured vector store.
///
/// Connection failures surface as `AppError::StoreUnreachable`.
pub async fn create_store(config: &AppConfig) -> AppResult<Arc<dyn VectorStore>> {
    let settings = &config.vector_store;

    match settings.backend() {
        "memory" => Ok(Arc::new(InMemoryStore::new())),

        "lancedb" => {
            let store =
                LanceDbStore::open(&config.lancedb_path(), config.embedding.dimensions).await?;
            Ok(Arc::new(store))
        }

        "chroma" => {
            let endpoint = settings.endpoint.as_deref().ok_or_else(|| {
                AppError::Config("Chroma backend requires vectorStore.endpoint".to_string())
            })?;
            let api_key = settings
                .api_key_env
                .as_ref()
                .and_then(|var| std::env::var(var).ok());

            let store = ChromaStore::new(
                endpoint,
                settings.tenant.as_deref(),
                settings.database.as_deref(),
                api_key,
            )?;
            Ok(Arc::new(store))
        }

        other => Err(AppError::Config(format!(
            "Unknown vector store backend: '{}'. Supported backends: lancedb, chroma, memory",
            other
        ))),
    }
}
