//! Startup wiring for the RAG subsystem.
//!
//! Every component is built once from `AppConfig`; the retrieval side is
//! deferred to first use since it depends on the index state. Optional pieces
//! that may fail to come up (the store, the embedder, the chat model) are held
//! as `Component<T>` so callers branch on availability instead of re-probing.

use crate::answer::{AnswerComposer, ChatService};
use crate::chunker::Chunker;
use crate::embeddings::{create_provider, EmbeddingProvider};
use crate::fs::{ContentHasher, FileSystem, LocalFileSystem, Sha256Hasher};
use crate::generation::Generator;
use crate::indexer::Indexer;
use crate::metadata::{JsonMetadataStore, VaultMetadataStore};
use crate::progress::ProgressReporter;
use crate::query::QueryPreprocessor;
use crate::rerank::Reranker;
use crate::retrieval::RetrievalService;
use crate::retriever::RagRetriever;
use crate::store::{collection_key, create_store, VectorStore};
use crate::sync_status::SyncStatusService;
use crate::types::{RetrievalMode, SyncStatus};
use crate::web::{create_web_search, WebSearchClient};
use notevault_core::config::RetrievalSettings;
use notevault_core::{AppConfig, AppError, AppResult};
use notevault_llm::create_client;
use notevault_prompt::PromptLibrary;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

const DEFAULT_EMBEDDING_KEY_ENV: &str = "OPENAI_API_KEY";

/// A dependency resolved at startup.
pub enum Component<T> {
    Ready(T),
    Unavailable(String),
}

impl<T> Component<T> {
    /// Wrap a construction result, logging why it failed.
    pub fn from_result(result: AppResult<T>, what: &str) -> Self {
        match result {
            Ok(value) => Component::Ready(value),
            Err(e) => {
                warn!("{} unavailable: {}", what, e);
                Component::Unavailable(e.to_string())
            }
        }
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Component::Ready(value) => Some(value),
            Component::Unavailable(_) => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Component::Ready(_) => None,
            Component::Unavailable(reason) => Some(reason),
        }
    }

    /// The component, or an error naming `what` and why it is missing.
    pub fn require(&self, what: &str) -> AppResult<&T> {
        match self {
            Component::Ready(value) => Ok(value),
            Component::Unavailable(reason) => {
                Err(AppError::Other(format!("{} unavailable: {}", what, reason)))
            }
        }
    }
}

impl<T> fmt::Debug for Component<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Ready(_) => f.write_str("Ready"),
            Component::Unavailable(reason) => write!(f, "Unavailable({})", reason),
        }
    }
}

/// Both halves of a pair, or the first reason one is missing.
fn both<A: Clone, B: Clone>(a: &Component<A>, b: &Component<B>) -> Result<(A, B), String> {
    match (a, b) {
        (Component::Ready(a), Component::Ready(b)) => Ok((a.clone(), b.clone())),
        (Component::Unavailable(reason), _) | (_, Component::Unavailable(reason)) => {
            Err(reason.clone())
        }
    }
}

pub struct RagEngine {
    vault: PathBuf,
    collection: String,
    default_mode: RetrievalMode,
    retrieval_settings: RetrievalSettings,
    store: Component<Arc<dyn VectorStore>>,
    embedder: Component<Arc<dyn EmbeddingProvider>>,
    generator: Component<Generator>,
    indexer: Component<Indexer>,
    web: Option<Arc<dyn WebSearchClient>>,
    web_max_results: usize,
    sync: SyncStatusService,
    /// Built on first use; index, status and clean never need it
    retrieval: OnceCell<Arc<RetrievalService>>,
    chat: OnceCell<ChatService>,
}

impl RagEngine {
    pub async fn build(config: &AppConfig) -> AppResult<Self> {
        Self::build_with_progress(config, ProgressReporter::noop()).await
    }

    /// Build every component for `config.vault`.
    ///
    /// Only configuration errors fail; unreachable backends leave their
    /// components `Unavailable`. No remote backend is contacted here.
    pub async fn build_with_progress(
        config: &AppConfig,
        progress: ProgressReporter,
    ) -> AppResult<Self> {
        config.validate()?;

        let vault = resolve_vault(config);
        let collection = collection_key(&vault);
        let default_mode: RetrievalMode = config.retrieval.default_mode.parse()?;
        let chunker = Chunker::new(config.indexing.chunk_size, config.indexing.chunk_overlap)?;

        let fs: Arc<dyn FileSystem> = Arc::new(LocalFileSystem);
        let hasher: Arc<dyn ContentHasher> = Arc::new(Sha256Hasher);
        let metadata: Arc<dyn VaultMetadataStore> =
            Arc::new(JsonMetadataStore::new(&config.state_dir()));

        let embedding_key = std::env::var(
            config
                .embedding
                .api_key_env
                .as_deref()
                .unwrap_or(DEFAULT_EMBEDDING_KEY_ENV),
        )
        .ok();
        let embedder = Component::from_result(
            create_provider(&config.embedding, embedding_key.as_deref()),
            "Embedding provider",
        );
        let store = Component::from_result(create_store(config).await, "Vector store");

        let prompts = Arc::new(load_prompts(&config.workspace)?);
        let generator = Component::from_result(
            create_client(
                &config.provider,
                config.provider_endpoint(&config.provider).as_deref(),
                config.resolve_api_key(&config.provider).as_deref(),
            )
            .map(|llm| Generator::new(llm, config.model.clone(), prompts)),
            "Language model",
        );

        let indexer = match both(&embedder, &store) {
            Ok((embedder, store)) => Component::Ready(
                Indexer::new(
                    fs.clone(),
                    hasher.clone(),
                    chunker,
                    embedder,
                    store,
                    metadata.clone(),
                )
                .with_commit_every(config.indexing.commit_every)
                .with_progress(progress),
            ),
            Err(reason) => Component::Unavailable(reason),
        };

        let web = match create_web_search(config.web_search.as_ref()) {
            Ok(web) => web,
            Err(e) => {
                warn!("Web search unavailable: {}", e);
                None
            }
        };
        let web_max_results = config.web_search.as_ref().map_or(5, |w| w.max_results);

        let sync = SyncStatusService::new(fs, hasher, store.ready().cloned(), metadata);

        info!(
            "RAG engine ready for {:?} (collection {}, store: {:?}, embedder: {:?}, llm: {:?}, web: {})",
            vault,
            collection,
            store,
            embedder,
            generator,
            web.is_some()
        );

        Ok(Self {
            vault,
            collection,
            default_mode,
            retrieval_settings: config.retrieval.clone(),
            store,
            embedder,
            generator,
            indexer,
            web,
            web_max_results,
            sync,
            retrieval: OnceCell::new(),
            chat: OnceCell::new(),
        })
    }

    pub fn vault(&self) -> &Path {
        &self.vault
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn default_mode(&self) -> RetrievalMode {
        self.default_mode
    }

    pub fn store(&self) -> &Component<Arc<dyn VectorStore>> {
        &self.store
    }

    pub fn generator(&self) -> &Component<Generator> {
        &self.generator
    }

    pub fn indexer(&self) -> AppResult<&Indexer> {
        self.indexer.require("Indexer")
    }

    pub fn has_web(&self) -> bool {
        self.web.is_some()
    }

    /// The retrieval service, built on first call.
    ///
    /// Note retrieval is only wired in when the vault has been indexed and
    /// the store answers; otherwise `Rag` requests degrade to web search.
    pub async fn retrieval(&self) -> &RetrievalService {
        self.shared_retrieval().await
    }

    pub async fn chat(&self) -> AppResult<&ChatService> {
        let generator = self.generator.require("Chat")?;
        let chat = self
            .chat
            .get_or_init(|| async {
                ChatService::new(
                    self.shared_retrieval().await.clone(),
                    AnswerComposer::new(generator.clone()),
                )
            })
            .await;
        Ok(chat)
    }

    pub async fn check_sync_status(&self) -> SyncStatus {
        self.sync.check_sync_status(&self.vault).await
    }

    async fn shared_retrieval(&self) -> &Arc<RetrievalService> {
        self.retrieval
            .get_or_init(|| async {
                let rag = self.build_retriever().await;
                Arc::new(
                    RetrievalService::new(rag.ready().cloned(), self.web.clone())
                        .with_web_max_results(self.web_max_results),
                )
            })
            .await
    }

    async fn build_retriever(&self) -> Component<Arc<RagRetriever>> {
        let (embedder, store) = match both(&self.embedder, &self.store) {
            Ok(pair) => pair,
            Err(reason) => return Component::Unavailable(reason),
        };

        match self.check_sync_status().await {
            status @ (SyncStatus::NotIndexed | SyncStatus::Unavailable) => {
                info!("Note retrieval off: vault index is {}", status);
                return Component::Unavailable(format!("vault index is {}", status));
            }
            SyncStatus::OutOfSync => {
                info!("Vault index is out of sync; results may be stale until the next index run")
            }
            SyncStatus::Synced => {}
        }

        let preprocessor =
            QueryPreprocessor::from_settings(self.generator.ready().cloned(), &self.retrieval_settings);
        let reranker = Reranker::select(&self.retrieval_settings, self.generator.ready()).await;

        Component::Ready(Arc::new(RagRetriever::new(
            self.collection.clone(),
            embedder,
            store,
            preprocessor,
            reranker,
            &self.retrieval_settings,
        )))
    }
}

fn resolve_vault(config: &AppConfig) -> PathBuf {
    if config.vault.is_absolute() {
        config.vault.clone()
    } else {
        config.workspace.join(&config.vault)
    }
}

/// Workspace prompts, or the built-in set when they cannot be loaded.
fn load_prompts(workspace: &Path) -> AppResult<PromptLibrary> {
    match PromptLibrary::load(workspace) {
        Ok(library) => Ok(library),
        Err(e) => {
            warn!("Using built-in prompts: {}", e);
            PromptLibrary::builtin()
        }
    }
}
