//! In-process vector store for tests and ephemeral sessions.

use super::{cosine_similarity, rank, VectorStore};
use crate::types::{EmbeddedChunk, SearchResult};
use notevault_core::{AppError, AppResult};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// Brute-force cosine search over chunks held in memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, EmbeddedChunk>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chunks in a collection.
    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl VectorStore for InMemoryStore {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, collection: &str, chunks: &[EmbeddedChunk]) -> AppResult<()> {
        let mut collections = self.collections.write().await;
        let entries = collections.entry(collection.to_string()).or_default();

        let expected = entries
            .values()
            .chain(chunks.iter())
            .next()
            .map(|c| c.embedding.len());
        for chunk in chunks {
            if Some(chunk.embedding.len()) != expected {
                return Err(AppError::InvalidQuery(format!(
                    "Embedding dimension mismatch: expected {:?}, got {}",
                    expected,
                    chunk.embedding.len()
                )));
            }
        }

        for chunk in chunks {
            entries.insert(chunk.chunk.id.clone(), chunk.clone());
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, chunk_ids: &[String]) -> AppResult<()> {
        if let Some(entries) = self.collections.write().await.get_mut(collection) {
            for id in chunk_ids {
                entries.remove(id);
            }
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        max_k: usize,
    ) -> AppResult<Vec<SearchResult>> {
        let collections = self.collections.read().await;
        let Some(entries) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        if let Some(first) = entries.values().next() {
            if first.embedding.len() != query.len() {
                return Err(AppError::InvalidQuery(format!(
                    "Query embedding dimension mismatch: expected {}, got {}",
                    first.embedding.len(),
                    query.len()
                )));
            }
        }

        let results = entries
            .values()
            .map(|entry| SearchResult {
                chunk: entry.chunk.clone(),
                score: cosine_similarity(query, &entry.embedding),
            })
            .collect();

        Ok(rank(results, max_k))
    }

    async fn has_data(&self, collection: &str) -> AppResult<bool> {
        Ok(self.len(collection).await > 0)
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn chunk_ids_for_source(
        &self,
        collection: &str,
        source_path: &str,
    ) -> AppResult<Vec<String>> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .map(|entries| {
                entries
                    .values()
                    .filter(|e| e.chunk.source_path == source_path)
                    .map(|e| e.chunk.id.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn drop_collection(&self, collection: &str) -> AppResult<()> {
        self.collections.write().await.remove(collection);
        Ok(())
    }
}
