//! Chroma vector store over the HTTP v2 API.
//!
//! Works against a local server or Chroma Cloud (tenant, database and an API
//! key sent as `x-chroma-token`). Collections use the cosine space.

use super::VectorStore;
use crate::types::{Chunk, EmbeddedChunk, SearchResult};
use notevault_core::{AppError, AppResult};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::instrument;

const DEFAULT_TENANT: &str = "default_tenant";
const DEFAULT_DATABASE: &str = "default_database";
const SOURCE_PATH_KEY: &str = "source_path";
const REQUEST_TIMEOUT_SECS: u64 = 30;

pub struct ChromaStore {
    client: Client,
    base_url: String,
    tenant: String,
    database: String,
    api_key: Option<String>,
    /// Collection name -> Chroma collection ID
    collection_ids: RwLock<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct CollectionResponse {
    id: String,
}

#[derive(Debug, Serialize)]
struct UpsertRequest {
    ids: Vec<String>,
    embeddings: Vec<Vec<f32>>,
    documents: Vec<String>,
    metadatas: Vec<BTreeMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Vec<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Vec<Vec<Option<BTreeMap<String, serde_json::Value>>>>,
    #[serde(default)]
    distances: Vec<Vec<Option<f32>>>,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    #[serde(default)]
    ids: Vec<String>,
}

impl ChromaStore {
    pub fn new(
        endpoint: &str,
        tenant: Option<&str>,
        database: Option<&str>,
        api_key: Option<String>,
    ) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
            tenant: tenant.unwrap_or(DEFAULT_TENANT).to_string(),
            database: database.unwrap_or(DEFAULT_DATABASE).to_string(),
            api_key,
            collection_ids: RwLock::new(HashMap::new()),
        })
    }

    fn collections_url(&self) -> String {
        format!(
            "{}/api/v2/tenants/{}/databases/{}/collections",
            self.base_url, self.tenant, self.database
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("x-chroma-token", key),
            None => request,
        }
    }

    /// Send a request; transport failures mean the server is unreachable.
    async fn send(&self, request: RequestBuilder) -> AppResult<reqwest::Response> {
        self.authorized(request)
            .send()
            .await
            .map_err(|e| AppError::StoreUnreachable(format!("Failed to reach Chroma: {}", e)))
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response, what: &str) -> AppResult<T> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(status_error(status, what, &error_text));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::InvalidQuery(format!("Failed to parse Chroma {}: {}", what, e)))
    }

    /// Look up an existing collection's ID without creating it.
    async fn find_collection(&self, collection: &str) -> AppResult<Option<String>> {
        if let Some(id) = self.collection_ids.read().await.get(collection) {
            return Ok(Some(id.clone()));
        }

        let url = format!("{}/{}", self.collections_url(), collection);
        let response = self.send(self.client.get(&url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let found: CollectionResponse = Self::parse(response, "collection").await?;
        self.collection_ids
            .write()
            .await
            .insert(collection.to_string(), found.id.clone());
        Ok(Some(found.id))
    }

    async fn get_or_create_collection(&self, collection: &str) -> AppResult<String> {
        if let Some(id) = self.collection_ids.read().await.get(collection) {
            return Ok(id.clone());
        }

        let body = json!({
            "name": collection,
            "metadata": { "hnsw:space": "cosine" },
            "get_or_create": true,
        });
        let response = self
            .send(self.client.post(self.collections_url()).json(&body))
            .await?;
        let created: CollectionResponse = Self::parse(response, "collection").await?;

        tracing::debug!("Using Chroma collection {} ({})", collection, created.id);
        self.collection_ids
            .write()
            .await
            .insert(collection.to_string(), created.id.clone());
        Ok(created.id)
    }

    fn collection_url(&self, id: &str, action: &str) -> String {
        format!("{}/{}/{}", self.collections_url(), id, action)
    }
}

fn status_error(status: StatusCode, what: &str, body: &str) -> AppError {
    let message = format!("Chroma {} request failed ({}): {}", what, status, body);
    if status.is_server_error() || status == StatusCode::UNAUTHORIZED {
        AppError::StoreUnreachable(message)
    } else {
        AppError::InvalidQuery(message)
    }
}

/// Flatten the first query's columns into search results.
fn query_to_results(response: QueryResponse) -> Vec<SearchResult> {
    let ids = response.ids.into_iter().next().unwrap_or_default();
    let documents = response.documents.into_iter().next().unwrap_or_default();
    let metadatas = response.metadatas.into_iter().next().unwrap_or_default();
    let distances = response.distances.into_iter().next().unwrap_or_default();

    ids.into_iter()
        .enumerate()
        .map(|(i, id)| {
            let mut metadata: BTreeMap<String, String> = metadatas
                .get(i)
                .cloned()
                .flatten()
                .unwrap_or_default()
                .into_iter()
                .map(|(k, v)| match v {
                    serde_json::Value::String(s) => (k, s),
                    other => (k, other.to_string()),
                })
                .collect();
            let source_path = metadata.remove(SOURCE_PATH_KEY).unwrap_or_default();
            let distance = distances.get(i).copied().flatten().unwrap_or(1.0);

            SearchResult {
                chunk: Chunk {
                    id,
                    text: documents.get(i).cloned().flatten().unwrap_or_default(),
                    source_path,
                    metadata,
                },
                score: 1.0 - distance,
            }
        })
        .collect()
}

#[async_trait::async_trait]
impl VectorStore for ChromaStore {
    fn backend_name(&self) -> &str {
        "chroma"
    }

    #[instrument(skip(self, chunks), fields(count = chunks.len()))]
    async fn upsert(&self, collection: &str, chunks: &[EmbeddedChunk]) -> AppResult<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let id = self.get_or_create_collection(collection).await?;
        let request = UpsertRequest {
            ids: chunks.iter().map(|c| c.chunk.id.clone()).collect(),
            embeddings: chunks.iter().map(|c| c.embedding.clone()).collect(),
            documents: chunks.iter().map(|c| c.chunk.text.clone()).collect(),
            metadatas: chunks
                .iter()
                .map(|c| {
                    let mut metadata = c.chunk.metadata.clone();
                    metadata.insert(SOURCE_PATH_KEY.to_string(), c.chunk.source_path.clone());
                    metadata
                })
                .collect(),
        };

        let response = self
            .send(
                self.client
                    .post(self.collection_url(&id, "upsert"))
                    .json(&request),
            )
            .await?;
        Self::parse::<serde_json::Value>(response, "upsert").await?;
        Ok(())
    }

    async fn delete(&self, collection: &str, chunk_ids: &[String]) -> AppResult<()> {
        if chunk_ids.is_empty() {
            return Ok(());
        }
        let Some(id) = self.find_collection(collection).await? else {
            return Ok(());
        };

        let response = self
            .send(
                self.client
                    .post(self.collection_url(&id, "delete"))
                    .json(&json!({ "ids": chunk_ids })),
            )
            .await?;
        Self::parse::<serde_json::Value>(response, "delete").await?;
        Ok(())
    }

    #[instrument(skip(self, query))]
    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        max_k: usize,
    ) -> AppResult<Vec<SearchResult>> {
        if max_k == 0 {
            return Ok(Vec::new());
        }
        let Some(id) = self.find_collection(collection).await? else {
            return Ok(Vec::new());
        };

        let body = json!({
            "query_embeddings": [query],
            "n_results": max_k,
            "include": ["documents", "metadatas", "distances"],
        });
        let response = self
            .send(self.client.post(self.collection_url(&id, "query")).json(&body))
            .await?;
        let parsed: QueryResponse = Self::parse(response, "query").await?;

        Ok(super::rank(query_to_results(parsed), max_k))
    }

    async fn has_data(&self, collection: &str) -> AppResult<bool> {
        let Some(id) = self.find_collection(collection).await? else {
            return Ok(false);
        };

        let response = self
            .send(self.client.get(self.collection_url(&id, "count")))
            .await?;
        let count: u64 = Self::parse(response, "count").await?;
        Ok(count > 0)
    }

    async fn ping(&self) -> AppResult<()> {
        let url = format!("{}/api/v2/heartbeat", self.base_url);
        let response = self.send(self.client.get(&url)).await?;
        Self::parse::<serde_json::Value>(response, "heartbeat").await?;
        Ok(())
    }

    async fn chunk_ids_for_source(
        &self,
        collection: &str,
        source_path: &str,
    ) -> AppResult<Vec<String>> {
        let Some(id) = self.find_collection(collection).await? else {
            return Ok(Vec::new());
        };

        let body = json!({
            "where": { SOURCE_PATH_KEY: source_path },
            "include": [],
        });
        let response = self
            .send(self.client.post(self.collection_url(&id, "get")).json(&body))
            .await?;
        let parsed: GetResponse = Self::parse(response, "get").await?;
        Ok(parsed.ids)
    }

    async fn drop_collection(&self, collection: &str) -> AppResult<()> {
        let url = format!("{}/{}", self.collections_url(), collection);
        let response = self.send(self.client.delete(&url)).await?;
        self.collection_ids.write().await.remove(collection);

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::parse::<serde_json::Value>(response, "delete collection").await?;

        tracing::info!("Deleted Chroma collection {}", collection);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_urls() {
        let store = ChromaStore::new("http://localhost:8000/", None, None, None).unwrap();
        assert_eq!(
            store.collections_url(),
            "http://localhost:8000/api/v2/tenants/default_tenant/databases/default_database/collections"
        );
        assert!(store.collection_url("abc", "query").ends_with("/collections/abc/query"));

        let cloud = ChromaStore::new(
            "https://api.trychroma.com",
            Some("acme"),
            Some("notes"),
            Some("ck-123".to_string()),
        )
        .unwrap();
        assert!(cloud.collections_url().contains("/tenants/acme/databases/notes/"));
    }

    #[test]
    fn test_query_response_conversion() {
        let response: QueryResponse = serde_json::from_value(json!({
            "ids": [["a", "b"]],
            "documents": [["first", null]],
            "metadatas": [[{"source_path": "x.md", "line_start": "3"}, null]],
            "distances": [[0.1, 0.6]],
        }))
        .unwrap();

        let results = query_to_results(response);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.source_path, "x.md");
        assert_eq!(results[0].chunk.metadata["line_start"], "3");
        assert!(!results[0].chunk.metadata.contains_key(SOURCE_PATH_KEY));
        assert!((results[0].score - 0.9).abs() < 1e-6);
        assert_eq!(results[1].chunk.text, "");
    }

    #[test]
    fn test_status_error_mapping() {
        assert!(status_error(StatusCode::BAD_GATEWAY, "query", "").is_unreachable());
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "query", "dimension"),
            AppError::InvalidQuery(_)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let store = ChromaStore::new("http://127.0.0.1:9", None, None, None).unwrap();
        let err = store.ping().await.unwrap_err();
        assert!(err.is_unreachable());
    }
}
