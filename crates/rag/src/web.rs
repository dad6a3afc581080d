//! Web search backends.

use crate::types::WebResult;
use notevault_core::config::WebSearchSettings;
use notevault_core::{AppError, AppResult};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

const REQUEST_TIMEOUT_SECS: u64 = 15;

#[async_trait::async_trait]
pub trait WebSearchClient: Send + Sync {
    fn backend_name(&self) -> &str;

    /// At most `max_results` hits, in the engine's order.
    async fn search(&self, query: &str, max_results: usize) -> AppResult<Vec<WebResult>>;
}

/// SearXNG instance queried through its JSON API.
#[derive(Debug, Clone)]
pub struct SearxngClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SearxngResponse {
    #[serde(default)]
    results: Vec<SearxngHit>,
}

#[derive(Debug, Deserialize)]
struct SearxngHit {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
}

impl SearxngClient {
    pub fn new(endpoint: &str) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl WebSearchClient for SearxngClient {
    fn backend_name(&self) -> &str {
        "searxng"
    }

    #[instrument(skip(self))]
    async fn search(&self, query: &str, max_results: usize) -> AppResult<Vec<WebResult>> {
        let url = format!("{}/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("q", query), ("format", "json")])
            .send()
            .await
            .map_err(|e| AppError::Retrieval(format!("Failed to reach web search: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Retrieval(format!(
                "Web search error ({})",
                response.status()
            )));
        }

        let body: SearxngResponse = response
            .json()
            .await
            .map_err(|e| AppError::Retrieval(format!("Failed to parse web results: {}", e)))?;

        Ok(to_web_results(body, max_results))
    }
}

fn to_web_results(body: SearxngResponse, max_results: usize) -> Vec<WebResult> {
    body.results
        .into_iter()
        .filter(|hit| !hit.url.is_empty())
        .take(max_results)
        .map(|hit| WebResult {
            title: if hit.title.is_empty() {
                hit.url.clone()
            } else {
                hit.title
            },
            url: hit.url,
            snippet: hit.content.trim().to_string(),
        })
        .collect()
}

/// Web search client from configuration, if one is configured.
pub fn create_web_search(
    settings: Option<&WebSearchSettings>,
) -> AppResult<Option<Arc<dyn WebSearchClient>>> {
    match settings {
        Some(settings) if !settings.endpoint.is_empty() => {
            Ok(Some(Arc::new(SearxngClient::new(&settings.endpoint)?)))
        }
        _ => Ok(None),
    }
}
