//! Vector retrieval from a vault's index.

use crate::embeddings::EmbeddingProvider;
use crate::query::QueryPreprocessor;
use crate::rerank::{apply_order, Reranker};
use crate::store::{rank, VectorStore};
use crate::types::{RagChunk, SearchResult};
use futures::future::join_all;
use notevault_core::config::RetrievalSettings;
use notevault_core::{AppError, AppResult};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Chunks for the chat layer, best first.
#[derive(Debug, Clone, Serialize)]
pub struct RagRetrieval {
    pub chunks: Vec<RagChunk>,
    pub used_reranker: bool,
    /// Query variants that were searched
    pub queries: Vec<String>,
}

pub struct RagRetriever {
    collection: String,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    preprocessor: QueryPreprocessor,
    reranker: Reranker,
    max_k: usize,
    display_k: usize,
    similarity_threshold: f32,
}

impl RagRetriever {
    pub fn new(
        collection: impl Into<String>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        preprocessor: QueryPreprocessor,
        reranker: Reranker,
        settings: &RetrievalSettings,
    ) -> Self {
        Self {
            collection: collection.into(),
            embedder,
            store,
            preprocessor,
            reranker,
            max_k: settings.max_k,
            display_k: settings.display_k,
            similarity_threshold: settings.similarity_threshold,
        }
    }

    /// Preprocess, search every variant, merge, filter, rerank, truncate.
    ///
    /// Fails only when the query is empty or every variant's search failed.
    pub async fn retrieve(&self, query: &str) -> AppResult<RagRetrieval> {
        if query.trim().is_empty() {
            return Err(AppError::InvalidQuery("Query is empty".to_string()));
        }

        let queries = self.preprocessor.preprocess(query).await;
        let outcomes = join_all(queries.iter().map(|q| self.search_one(q))).await;

        let mut hits = Vec::new();
        let mut first_error = None;
        for (q, outcome) in queries.iter().zip(outcomes) {
            match outcome {
                Ok(results) => hits.push(results),
                Err(e) => {
                    warn!("Search failed for query {:?}: {}", q, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        if hits.is_empty() {
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        let merged = merge_results(hits, self.max_k);
        let candidates: Vec<SearchResult> = merged
            .into_iter()
            .filter(|r| r.score >= self.similarity_threshold)
            .collect();
        debug!(
            "{} candidates above threshold {}",
            candidates.len(),
            self.similarity_threshold
        );

        let primary = queries.first().map(String::as_str).unwrap_or(query);
        let (ranked, used_reranker) = match self.reranker.order(primary, &candidates).await {
            Ok(Some(order)) => (
                apply_order(candidates, &order)
                    .into_iter()
                    .map(|(result, score)| (result, Some(score)))
                    .collect::<Vec<_>>(),
                true,
            ),
            Ok(None) => (candidates.into_iter().map(|r| (r, None)).collect(), false),
            Err(e) => {
                warn!("Reranking failed, keeping similarity order: {}", e);
                (candidates.into_iter().map(|r| (r, None)).collect(), false)
            }
        };

        let chunks: Vec<RagChunk> = ranked
            .into_iter()
            .take(self.display_k)
            .map(|(result, rerank_score)| RagChunk::from_result(result, rerank_score))
            .collect();

        info!(
            "Retrieved {} chunks from {} ({} queries, reranker: {})",
            chunks.len(),
            self.collection,
            queries.len(),
            if used_reranker { self.reranker.name() } else { "none" }
        );

        Ok(RagRetrieval {
            chunks,
            used_reranker,
            queries,
        })
    }

    async fn search_one(&self, query: &str) -> AppResult<Vec<SearchResult>> {
        let embedding = self.embedder.embed(query).await?;
        self.store
            .search(&self.collection, &embedding, self.max_k)
            .await
    }
}

/// Union of per-query hits, one per chunk ID with its best score, best first.
fn merge_results(hits: Vec<Vec<SearchResult>>, max_k: usize) -> Vec<SearchResult> {
    let mut best: HashMap<String, SearchResult> = HashMap::new();
    for result in hits.into_iter().flatten() {
        match best.get(&result.chunk.id) {
            Some(existing) if existing.score >= result.score => {}
            _ => {
                best.insert(result.chunk.id.clone(), result);
            }
        }
    }

    let mut merged: Vec<SearchResult> = best.into_values().collect();
    // Deterministic order among equal scores
    merged.sort_by(|a, b| a.chunk.id.cmp(&b.chunk.id));
    rank(merged, max_k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Chunk;

    fn result(id: &str, score: f32) -> SearchResult {
        SearchResult {
            chunk: Chunk {
                id: id.to_string(),
                text: String::new(),
                source_path: "a.md".to_string(),
                metadata: Default::default(),
            },
            score,
        }
    }

    #[test]
    fn test_merge_keeps_best_score() {
        let merged = merge_results(
            vec![
                vec![result("a", 0.5), result("b", 0.4)],
                vec![result("a", 0.9), result("c", 0.6)],
            ],
            10,
        );
        let pairs: Vec<_> = merged
            .iter()
            .map(|r| (r.chunk.id.as_str(), r.score))
            .collect();
        assert_eq!(pairs, vec![("a", 0.9), ("c", 0.6), ("b", 0.4)]);
    }

    #[test]
    fn test_merge_caps_at_max_k() {
        let merged = merge_results(
            vec![vec![result("a", 0.5), result("b", 0.4)], vec![result("c", 0.6)]],
            2,
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].chunk.id, "c");
    }
}
