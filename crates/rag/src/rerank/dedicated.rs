//! Cross-encoder reranking over a `/v1/rerank` HTTP endpoint.
//!
//! The server is expected to list what it serves at `GET /v1/models`
//! (OpenAI-compatible shape), which is how availability is confirmed.

use super::RerankOrder;
use crate::types::SearchResult;
use notevault_core::{AppError, AppResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct DedicatedReranker {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: Vec<&'a str>,
    top_n: usize,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankHit>,
}

#[derive(Debug, Deserialize)]
struct RerankHit {
    index: usize,
    relevance_score: f32,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

impl DedicatedReranker {
    pub fn new(endpoint: &str, model: &str) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::RerankerInit(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    /// Model IDs the rerank server reports.
    #[instrument(skip(self), fields(endpoint = %self.base_url))]
    pub async fn list_models(&self) -> AppResult<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .send()
            .await
            .map_err(|e| AppError::RerankerInit(format!("Failed to reach reranker: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::RerankerInit(format!(
                "Reranker model listing failed ({})",
                response.status()
            )));
        }

        let list: ModelList = response
            .json()
            .await
            .map_err(|e| AppError::RerankerInit(format!("Failed to parse reranker models: {}", e)))?;

        Ok(list.data.into_iter().map(|m| m.id).collect())
    }

    #[instrument(skip(self, query, results), fields(model = %self.model, count = results.len()))]
    pub async fn rank(&self, query: &str, results: &[SearchResult]) -> AppResult<RerankOrder> {
        let url = format!("{}/v1/rerank", self.base_url);
        let request = RerankRequest {
            model: &self.model,
            query,
            documents: results.iter().map(|r| r.chunk.text.as_str()).collect(),
            top_n: results.len(),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Retrieval(format!("Failed to reach reranker: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Retrieval(format!(
                "Reranker error ({}): {}",
                status, error_text
            )));
        }

        let body: RerankResponse = response
            .json()
            .await
            .map_err(|e| AppError::Retrieval(format!("Failed to parse rerank response: {}", e)))?;

        Ok(sort_hits(body.results))
    }
}

fn sort_hits(mut hits: Vec<RerankHit>) -> RerankOrder {
    hits.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.into_iter()
        .map(|h| (h.index, h.relevance_score))
        .collect()
}
