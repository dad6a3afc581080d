//! Test doubles and fixtures shared by the cross-component tests.

use crate::chunker::Chunker;
use crate::embeddings::providers::MockProvider;
use crate::embeddings::EmbeddingProvider;
use crate::fs::{LocalFileSystem, Sha256Hasher};
use crate::generation::Generator;
use crate::indexer::Indexer;
use crate::metadata::JsonMetadataStore;
use crate::query::QueryPreprocessor;
use crate::rerank::Reranker;
use crate::retriever::RagRetriever;
use crate::store::{InMemoryStore, VectorStore};
use crate::sync_status::SyncStatusService;
use crate::types::{EmbeddedChunk, SearchResult, WebResult};
use crate::web::WebSearchClient;
use notevault_core::config::RetrievalSettings;
use notevault_core::{AppError, AppResult};
use notevault_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use notevault_prompt::PromptLibrary;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const DIMENSIONS: usize = 256;

/// A vault directory plus a separate state directory.
pub struct Fixture {
    _temp: TempDir,
    pub vault: PathBuf,
    pub state_dir: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let vault = temp.path().join("vault");
        let state_dir = temp.path().join("state");
        std::fs::create_dir_all(&vault).unwrap();
        Self {
            _temp: temp,
            vault,
            state_dir,
        }
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.vault.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    pub fn remove(&self, relative: &str) {
        std::fs::remove_file(self.vault.join(relative)).unwrap();
    }

    pub fn metadata(&self) -> Arc<JsonMetadataStore> {
        Arc::new(JsonMetadataStore::new(&self.state_dir))
    }

    pub fn indexer(
        &self,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Indexer {
        Indexer::new(
            Arc::new(LocalFileSystem),
            Arc::new(Sha256Hasher),
            Chunker::new(200, 20).unwrap(),
            embedder,
            store,
            self.metadata(),
        )
    }

    pub fn sync_service(&self, store: Option<Arc<dyn VectorStore>>) -> SyncStatusService {
        SyncStatusService::new(
            Arc::new(LocalFileSystem),
            Arc::new(Sha256Hasher),
            store,
            self.metadata(),
        )
    }

    /// A small gardening vault.
    pub fn seed_garden(&self) {
        self.write(
            "tomatoes.md",
            "# Tomatoes\n\nTomatoes need full sun and deep watering twice a week.\n",
        );
        self.write(
            "basil.md",
            "# Basil\n\nBasil grows well next to tomatoes and likes warm soil.\n",
        );
        self.write(
            "journal/2024-03-01.md",
            "# Journal\n\nFixed the bicycle chain and cleaned the gears.\n",
        );
    }
}

/// Delegates to the mock embedder, counting calls and texts.
#[derive(Debug)]
pub struct CountingEmbedder {
    inner: MockProvider,
    /// Any batch containing this text fails
    poison: Option<String>,
    pub batches: AtomicUsize,
    pub texts: AtomicUsize,
}

impl CountingEmbedder {
    pub fn new() -> Self {
        Self {
            inner: MockProvider::new(DIMENSIONS),
            poison: None,
            batches: AtomicUsize::new(0),
            texts: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(marker: &str) -> Self {
        Self {
            poison: Some(marker.to_string()),
            ..Self::new()
        }
    }

    pub fn texts(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for CountingEmbedder {
    fn provider_name(&self) -> &str {
        "counting"
    }

    fn model_name(&self) -> &str {
        "mock"
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        if let Some(marker) = &self.poison {
            if texts.iter().any(|t| t.contains(marker.as_str())) {
                return Err(AppError::Embedding("model crashed".to_string()));
            }
        }
        self.inner.embed_batch(texts).await
    }
}

/// A store that cannot be reached.
#[derive(Debug, Default)]
pub struct UnreachableStore;

fn unreachable<T>() -> AppResult<T> {
    Err(AppError::StoreUnreachable("connection refused".to_string()))
}

#[async_trait::async_trait]
impl VectorStore for UnreachableStore {
    fn backend_name(&self) -> &str {
        "unreachable"
    }

    async fn upsert(&self, _collection: &str, _chunks: &[EmbeddedChunk]) -> AppResult<()> {
        unreachable()
    }

    async fn delete(&self, _collection: &str, _chunk_ids: &[String]) -> AppResult<()> {
        unreachable()
    }

    async fn search(
        &self,
        _collection: &str,
        _query: &[f32],
        _max_k: usize,
    ) -> AppResult<Vec<SearchResult>> {
        unreachable()
    }

    async fn has_data(&self, _collection: &str) -> AppResult<bool> {
        unreachable()
    }

    async fn ping(&self) -> AppResult<()> {
        unreachable()
    }

    async fn chunk_ids_for_source(
        &self,
        _collection: &str,
        _source_path: &str,
    ) -> AppResult<Vec<String>> {
        unreachable()
    }

    async fn drop_collection(&self, _collection: &str) -> AppResult<()> {
        unreachable()
    }
}

/// In-memory store whose upserts start failing as unreachable after a
/// number of successful ones.
#[derive(Debug)]
pub struct DroppingStore {
    pub inner: InMemoryStore,
    upserts_left: AtomicUsize,
}

impl DroppingStore {
    pub fn after_upserts(n: usize) -> Self {
        Self {
            inner: InMemoryStore::new(),
            upserts_left: AtomicUsize::new(n),
        }
    }
}

#[async_trait::async_trait]
impl VectorStore for DroppingStore {
    fn backend_name(&self) -> &str {
        "dropping"
    }

    async fn upsert(&self, collection: &str, chunks: &[EmbeddedChunk]) -> AppResult<()> {
        let left = self.upserts_left.load(Ordering::SeqCst);
        if left == 0 {
            return unreachable();
        }
        self.upserts_left.store(left - 1, Ordering::SeqCst);
        self.inner.upsert(collection, chunks).await
    }

    async fn delete(&self, collection: &str, chunk_ids: &[String]) -> AppResult<()> {
        self.inner.delete(collection, chunk_ids).await
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        max_k: usize,
    ) -> AppResult<Vec<SearchResult>> {
        self.inner.search(collection, query, max_k).await
    }

    async fn has_data(&self, collection: &str) -> AppResult<bool> {
        self.inner.has_data(collection).await
    }

    async fn ping(&self) -> AppResult<()> {
        self.inner.ping().await
    }

    async fn chunk_ids_for_source(
        &self,
        collection: &str,
        source_path: &str,
    ) -> AppResult<Vec<String>> {
        self.inner.chunk_ids_for_source(collection, source_path).await
    }

    async fn drop_collection(&self, collection: &str) -> AppResult<()> {
        self.inner.drop_collection(collection).await
    }
}

/// Reachable store that rejects the collection lookup, like a 4xx reply.
#[derive(Debug, Default)]
pub struct RejectingStore {
    pub inner: InMemoryStore,
}

#[async_trait::async_trait]
impl VectorStore for RejectingStore {
    fn backend_name(&self) -> &str {
        "rejecting"
    }

    async fn upsert(&self, collection: &str, chunks: &[EmbeddedChunk]) -> AppResult<()> {
        self.inner.upsert(collection, chunks).await
    }

    async fn delete(&self, collection: &str, chunk_ids: &[String]) -> AppResult<()> {
        self.inner.delete(collection, chunk_ids).await
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        max_k: usize,
    ) -> AppResult<Vec<SearchResult>> {
        self.inner.search(collection, query, max_k).await
    }

    async fn has_data(&self, collection: &str) -> AppResult<bool> {
        Err(AppError::InvalidQuery(format!(
            "collection {} rejected (400)",
            collection
        )))
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn chunk_ids_for_source(
        &self,
        collection: &str,
        source_path: &str,
    ) -> AppResult<Vec<String>> {
        self.inner.chunk_ids_for_source(collection, source_path).await
    }

    async fn drop_collection(&self, collection: &str) -> AppResult<()> {
        self.inner.drop_collection(collection).await
    }
}

/// Chat model answering from a script keyed on text in the request.
pub struct ScriptedLlm {
    /// (marker, reply); the first marker found in system + prompt wins
    replies: Vec<(String, Result<String, String>)>,
    models: Option<Vec<String>>,
    pub requests: Mutex<Vec<LlmRequest>>,
}

/// Markers identifying each built-in prompt.
pub const REWRITE: &str = "Rewritten query:";
pub const EXPAND: &str = "alternative phrasings";
pub const RERANK: &str = "List the passage numbers";
pub const ANSWER: &str = "Answer:";

impl ScriptedLlm {
    pub fn new() -> Self {
        Self {
            replies: Vec::new(),
            models: Some(vec!["llama3.2:latest".to_string()]),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(mut self, marker: &str, reply: &str) -> Self {
        self.replies.push((marker.to_string(), Ok(reply.to_string())));
        self
    }

    pub fn fail(mut self, marker: &str) -> Self {
        self.replies
            .push((marker.to_string(), Err("model overloaded".to_string())));
        self
    }

    pub fn with_models(mut self, models: &[&str]) -> Self {
        self.models = Some(models.iter().map(|m| m.to_string()).collect());
        self
    }

    /// `list_models` fails
    pub fn without_registry(mut self) -> Self {
        self.models = None;
        self
    }

    pub fn request_count(&self, marker: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.prompt.contains(marker))
            .count()
    }

    pub fn last_prompt(&self, marker: &str) -> Option<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.prompt.contains(marker))
            .map(|r| r.prompt.clone())
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.requests.lock().unwrap().push(request.clone());

        let haystack = format!(
            "{}\n{}",
            request.system.as_deref().unwrap_or_default(),
            request.prompt
        );
        let reply = self
            .replies
            .iter()
            .find(|(marker, _)| haystack.contains(marker.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| Err("no scripted reply".to_string()));

        match reply {
            Ok(content) => Ok(LlmResponse {
                content,
                model: request.model.clone(),
                usage: LlmUsage::default(),
            }),
            Err(reason) => Err(AppError::Llm(reason)),
        }
    }

    async fn list_models(&self) -> AppResult<Vec<String>> {
        self.models
            .clone()
            .ok_or_else(|| AppError::Llm("registry unavailable".to_string()))
    }
}

pub fn generator(llm: Arc<ScriptedLlm>) -> Generator {
    let prompts = Arc::new(PromptLibrary::builtin().unwrap());
    Generator::new(llm, "llama3.2", prompts)
}

/// Web search returning fixed results, or failing.
pub struct StaticWebSearch {
    results: Option<Vec<WebResult>>,
    pub calls: AtomicUsize,
}

impl StaticWebSearch {
    pub fn with_urls(urls: &[&str]) -> Self {
        Self {
            results: Some(
                urls.iter()
                    .map(|url| WebResult {
                        title: format!("Page {}", url),
                        url: url.to_string(),
                        snippet: "From the web.".to_string(),
                    })
                    .collect(),
            ),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            results: None,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl WebSearchClient for StaticWebSearch {
    fn backend_name(&self) -> &str {
        "static"
    }

    async fn search(&self, _query: &str, max_results: usize) -> AppResult<Vec<WebResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.results {
            Some(results) => Ok(results.iter().take(max_results).cloned().collect()),
            None => Err(AppError::Retrieval("search engine timed out".to_string())),
        }
    }
}

pub fn settings(max_k: usize, display_k: usize, threshold: f32) -> RetrievalSettings {
    RetrievalSettings {
        max_k,
        display_k,
        similarity_threshold: threshold,
        rerank: false,
        ..Default::default()
    }
}

/// Retriever over `store` with the mock embedder, no preprocessing and no reranking.
pub fn plain_retriever(
    vault: &Path,
    store: Arc<dyn VectorStore>,
    settings: &RetrievalSettings,
) -> RagRetriever {
    RagRetriever::new(
        crate::store::collection_key(vault),
        Arc::new(MockProvider::new(DIMENSIONS)),
        store,
        QueryPreprocessor::new(None),
        Reranker::NoOp,
        settings,
    )
}

/// Index the fixture's vault into a fresh in-memory store.
pub async fn indexed_store(fixture: &Fixture) -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    fixture
        .indexer(Arc::new(MockProvider::new(DIMENSIONS)), store.clone())
        .reindex_vault(&fixture.vault, &Default::default())
        .await
        .unwrap();
    store
}

/// Local HTTP server answering each request path prefix with a fixed JSON
/// body, and 404 otherwise. Records every request path.
pub struct JsonServer {
    pub url: String,
    paths: Arc<Mutex<Vec<String>>>,
}

impl JsonServer {
    pub async fn start(routes: &[(&str, &str)]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let routes: Vec<(String, String)> = routes
            .iter()
            .map(|(prefix, body)| (prefix.to_string(), body.to_string()))
            .collect();
        let paths = Arc::new(Mutex::new(Vec::new()));

        let seen = paths.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let request = read_request(&mut socket).await;
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                seen.lock().unwrap().push(path.clone());

                let (status, body) = routes
                    .iter()
                    .find(|(prefix, _)| path.starts_with(prefix.as_str()))
                    .map(|(_, body)| ("200 OK", body.as_str()))
                    .unwrap_or(("404 Not Found", "{}"));
                let response = format!(
                    "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Self { url, paths }
    }

    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }

    pub fn hits(&self, prefix: &str) -> usize {
        self.paths().iter().filter(|p| p.starts_with(prefix)).count()
    }
}

/// Read headers plus a `content-length` body.
async fn read_request(socket: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);

        let text = String::from_utf8_lossy(&data);
        if let Some(end) = text.find("\r\n\r\n") {
            let body_len = text[..end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if data.len() >= end + 4 + body_len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&data).to_string()
}
