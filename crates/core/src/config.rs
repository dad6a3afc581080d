//! Configuration management for notevault.
//!
//! Configuration is layered, later sources winning:
//! - Built-in defaults (local-first: Ollama + LanceDB)
//! - Config file (`<workspace>/.notevault/config.yaml`)
//! - Environment variables
//! - Command-line flags
//!
//! Per-vault state (LanceDB tables, index metadata) lives under `.notevault/`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::logging::LogFormat;

/// Name of the state directory kept in the workspace.
pub const STATE_DIR_NAME: &str = ".notevault";

const KNOWN_PROVIDERS: [&str; 2] = ["ollama", "openai"];
const KNOWN_EMBEDDING_PROVIDERS: [&str; 3] = ["ollama", "openai", "mock"];
const KNOWN_STORE_BACKENDS: [&str; 3] = ["lancedb", "chroma", "memory"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Workspace root (contains .notevault/)
    pub workspace: PathBuf,

    /// Vault root to index; defaults to the workspace
    pub vault: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Generation provider (e.g., "ollama", "openai")
    pub provider: String,

    /// Generation model identifier
    pub model: String,

    /// API key override for the generation provider
    pub api_key: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Human-readable or JSON log lines
    pub log_format: LogFormat,

    /// Generation provider configurations
    pub llm: Option<LlmConfig>,

    pub embedding: EmbeddingSettings,

    pub vector_store: VectorStoreSettings,

    pub retrieval: RetrievalSettings,

    /// Web search is optional; without it WEB/HYBRID degrade to notes only
    pub web_search: Option<WebSearchSettings>,

    pub indexing: IndexingSettings,
}

/// LLM configuration from config.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(rename = "activeProvider")]
    pub active_provider: String,

    pub providers: HashMap<String, ProviderConfig>,
}

/// Provider-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderConfig {
    OpenAI {
        #[serde(rename = "apiKeyEnv")]
        api_key_env: String,
        model: String,
        endpoint: Option<String>,
    },
    Ollama {
        endpoint: String,
        model: String,
        timeout: Option<u64>,
    },
}

impl ProviderConfig {
    pub fn model(&self) -> &str {
        match self {
            ProviderConfig::OpenAI { model, .. } | ProviderConfig::Ollama { model, .. } => model,
        }
    }

    pub fn endpoint(&self) -> Option<&str> {
        match self {
            ProviderConfig::OpenAI { endpoint, .. } => endpoint.as_deref(),
            ProviderConfig::Ollama { endpoint, .. } => Some(endpoint),
        }
    }
}

/// Embedding backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingSettings {
    /// "ollama", "openai" or "mock"
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
    pub endpoint: Option<String>,
    pub api_key_env: Option<String>,
    /// Maximum texts per embedding request
    pub batch_size: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            endpoint: None,
            api_key_env: None,
            batch_size: 32,
        }
    }
}

/// Vector store backend settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VectorStoreSettings {
    /// "lancedb", "chroma" or "memory"; empty means "lancedb"
    pub backend: String,
    /// LanceDB directory; defaults to `.notevault/lancedb`
    pub path: Option<PathBuf>,
    /// Chroma server URL
    pub endpoint: Option<String>,
    /// Chroma cloud tenant
    pub tenant: Option<String>,
    /// Chroma cloud database
    pub database: Option<String>,
    pub api_key_env: Option<String>,
}

impl VectorStoreSettings {
    pub fn backend(&self) -> &str {
        if self.backend.is_empty() {
            "lancedb"
        } else {
            &self.backend
        }
    }
}

/// Retrieval pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrievalSettings {
    /// Candidates fetched per query from the vector store
    pub max_k: usize,
    /// Chunks handed to the chat layer; must not exceed `max_k`
    pub display_k: usize,
    pub similarity_threshold: f32,
    pub rewrite_query: bool,
    pub multi_query: bool,
    pub multi_query_count: usize,
    pub rerank: bool,
    /// Dedicated reranking model; used only when `reranker_endpoint` lists it
    pub reranker_model: Option<String>,
    /// Base URL of a server exposing `/v1/models` and `/v1/rerank`
    pub reranker_endpoint: Option<String>,
    /// Default mode for `ask`/`search` ("none", "rag", "web", "hybrid")
    pub default_mode: String,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            max_k: 10,
            display_k: 5,
            similarity_threshold: 0.3,
            rewrite_query: false,
            multi_query: false,
            multi_query_count: 3,
            rerank: true,
            reranker_model: None,
            reranker_endpoint: None,
            default_mode: "rag".to_string(),
        }
    }
}

/// Web search backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSearchSettings {
    /// SearXNG base URL
    pub endpoint: String,
    #[serde(default = "default_web_max_results")]
    pub max_results: usize,
}

fn default_web_max_results() -> usize {
    5
}

/// Indexing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexingSettings {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Persist metadata after this many processed files
    pub commit_every: usize,
}

impl Default for IndexingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            commit_every: 20,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    llm: Option<LlmConfig>,
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
    embedding: Option<EmbeddingSettings>,
    vector_store: Option<VectorStoreSettings>,
    retrieval: Option<RetrievalSettings>,
    web_search: Option<WebSearchSettings>,
    indexing: Option<IndexingSettings>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
    vault: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    format: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let workspace = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            vault: workspace.clone(),
            workspace,
            config_file: None,
            provider: "ollama".to_string(),
            model: "llama3.2".to_string(),
            api_key: None,
            log_level: None,
            verbose: false,
            no_color: false,
            log_format: LogFormat::Text,
            llm: None,
            embedding: EmbeddingSettings::default(),
            vector_store: VectorStoreSettings::default(),
            retrieval: RetrievalSettings::default(),
            web_search: None,
            indexing: IndexingSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, config file and environment.
    ///
    /// Environment variables:
    /// - `NOTEVAULT_WORKSPACE`: Override workspace path
    /// - `NOTEVAULT_VAULT`: Vault root (defaults to the workspace)
    /// - `NOTEVAULT_CONFIG`: Path to config file
    /// - `NOTEVAULT_PROVIDER`: Generation provider
    /// - `NOTEVAULT_MODEL`: Generation model
    /// - `NOTEVAULT_API_KEY`: API key
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    /// - `NOTEVAULT_LOG_FORMAT`: `text` or `json`
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("NOTEVAULT_WORKSPACE") {
            config.workspace = PathBuf::from(&workspace);
            config.vault = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("NOTEVAULT_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.state_dir().join("config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        if let Ok(vault) = std::env::var("NOTEVAULT_VAULT") {
            config.vault = PathBuf::from(vault);
        }

        if let Ok(provider) = std::env::var("NOTEVAULT_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("NOTEVAULT_MODEL") {
            config.model = model;
        }

        config.api_key = std::env::var("NOTEVAULT_API_KEY").ok();
        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        if let Ok(format) = std::env::var("NOTEVAULT_LOG_FORMAT") {
            config.log_format = format.parse()?;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    pub fn merge_yaml(self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self;

        if let Some(ws) = config_file.workspace {
            if let Some(path) = ws.path {
                result.workspace = PathBuf::from(&path);
                result.vault = PathBuf::from(path);
            }
            if let Some(vault) = ws.vault {
                result.vault = PathBuf::from(vault);
            }
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
            if let Some(format) = logging.format {
                result.log_format = format.parse()?;
            }
        }

        if let Some(llm) = config_file.llm {
            result.provider = llm.active_provider.clone();
            if let Some(provider_config) = llm.providers.get(&llm.active_provider) {
                result.model = provider_config.model().to_string();
            }
            result.llm = Some(llm);
        }

        if let Some(embedding) = config_file.embedding {
            result.embedding = embedding;
        }
        if let Some(vector_store) = config_file.vector_store {
            result.vector_store = vector_store;
        }
        if let Some(retrieval) = config_file.retrieval {
            result.retrieval = retrieval;
        }
        if let Some(indexing) = config_file.indexing {
            result.indexing = indexing;
        }
        if config_file.web_search.is_some() {
            result.web_search = config_file.web_search;
        }

        tracing::debug!("Merged config file {:?}", path);
        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and the config file.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        vault: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(vault) = vault {
            self.vault = vault;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Path to the .notevault state directory.
    pub fn state_dir(&self) -> PathBuf {
        self.workspace.join(STATE_DIR_NAME)
    }

    /// Ensure the .notevault directory exists.
    pub fn ensure_state_dir(&self) -> AppResult<()> {
        let state_dir = self.state_dir();
        if !state_dir.exists() {
            std::fs::create_dir_all(&state_dir).map_err(|e| {
                AppError::Config(format!("Failed to create {} directory: {}", STATE_DIR_NAME, e))
            })?;
        }
        Ok(())
    }

    /// Directory for the LanceDB backend.
    pub fn lancedb_path(&self) -> PathBuf {
        self.vector_store
            .path
            .clone()
            .unwrap_or_else(|| self.state_dir().join("lancedb"))
    }

    /// Get a provider configuration by name.
    pub fn get_provider_config(&self, provider: &str) -> Option<&ProviderConfig> {
        self.llm.as_ref().and_then(|llm| llm.providers.get(provider))
    }

    /// Endpoint configured for a generation provider, if any.
    pub fn provider_endpoint(&self, provider: &str) -> Option<String> {
        self.get_provider_config(provider)
            .and_then(|p| p.endpoint())
            .map(str::to_string)
    }

    /// Resolve the API key for a generation provider.
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }

        match self.get_provider_config(provider) {
            Some(ProviderConfig::OpenAI { api_key_env, .. }) => std::env::var(api_key_env).ok(),
            _ => None,
        }
    }

    /// Validate the configuration before components are built.
    pub fn validate(&self) -> AppResult<()> {
        if !KNOWN_PROVIDERS.contains(&self.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }

        if let Some(ProviderConfig::OpenAI { api_key_env, .. }) =
            self.get_provider_config(&self.provider)
        {
            if self.api_key.is_none() && std::env::var(api_key_env).is_err() {
                return Err(AppError::Config(format!(
                    "API key not found in environment variable: {}",
                    api_key_env
                )));
            }
        }

        self.validate_retrieval()?;
        self.validate_indexing()?;

        if !KNOWN_EMBEDDING_PROVIDERS.contains(&self.embedding.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                self.embedding.provider,
                KNOWN_EMBEDDING_PROVIDERS.join(", ")
            )));
        }

        if self.embedding.provider == "openai" {
            let key_env = self
                .embedding
                .api_key_env
                .as_deref()
                .unwrap_or("OPENAI_API_KEY");
            if std::env::var(key_env).is_err() {
                return Err(AppError::Config(format!(
                    "Embedding API key not found in environment variable: {}",
                    key_env
                )));
            }
        }

        if self.embedding.dimensions == 0 {
            return Err(AppError::Config(
                "Embedding dimensions must be greater than zero".to_string(),
            ));
        }

        let backend = self.vector_store.backend();
        if !KNOWN_STORE_BACKENDS.contains(&backend) {
            return Err(AppError::Config(format!(
                "Unknown vector store backend: {}. Supported: {}",
                backend,
                KNOWN_STORE_BACKENDS.join(", ")
            )));
        }

        if backend == "chroma" && self.vector_store.endpoint.is_none() {
            return Err(AppError::Config(
                "Chroma backend requires vectorStore.endpoint".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_retrieval(&self) -> AppResult<()> {
        let retrieval = &self.retrieval;

        if retrieval.max_k == 0 || retrieval.display_k == 0 {
            return Err(AppError::Config(
                "retrieval.maxK and retrieval.displayK must be greater than zero".to_string(),
            ));
        }

        if retrieval.display_k > retrieval.max_k {
            return Err(AppError::Config(format!(
                "retrieval.displayK ({}) must not exceed retrieval.maxK ({})",
                retrieval.display_k, retrieval.max_k
            )));
        }

        if !(-1.0..=1.0).contains(&retrieval.similarity_threshold) {
            return Err(AppError::Config(format!(
                "retrieval.similarityThreshold must be within [-1, 1], got {}",
                retrieval.similarity_threshold
            )));
        }

        Ok(())
    }

    fn validate_indexing(&self) -> AppResult<()> {
        let indexing = &self.indexing;

        if indexing.chunk_size == 0 {
            return Err(AppError::Config(
                "indexing.chunkSize must be greater than zero".to_string(),
            ));
        }

        if indexing.chunk_overlap >= indexing.chunk_size {
            return Err(AppError::Config(format!(
                "indexing.chunkOverlap ({}) must be smaller than indexing.chunkSize ({})",
                indexing.chunk_overlap, indexing.chunk_size
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.model, "llama3.2");
        assert_eq!(config.vector_store.backend(), "lancedb");
        assert_eq!(config.retrieval.display_k, 5);
        assert!(config.web_search.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_state_dir() {
        let config = AppConfig::default();
        assert!(config.state_dir().ends_with(".notevault"));
        assert!(config.lancedb_path().ends_with("lancedb"));
    }

    #[test]
    fn test_with_overrides() {
        let config = AppConfig::default();
        let overridden = config.with_overrides(
            None,
            Some(PathBuf::from("/notes")),
            None,
            Some("openai".to_string()),
            Some("gpt-4o-mini".to_string()),
            None,
            true,
            false,
        );

        assert_eq!(overridden.provider, "openai");
        assert_eq!(overridden.model, "gpt-4o-mini");
        assert_eq!(overridden.vault, PathBuf::from("/notes"));
        assert!(overridden.verbose);
        assert_eq!(overridden.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_validate_unknown_provider() {
        let mut config = AppConfig::default();
        config.provider = "unknown".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_display_k_bound() {
        let mut config = AppConfig::default();
        config.retrieval.max_k = 3;
        config.retrieval.display_k = 4;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("displayK"));
    }

    #[test]
    fn test_validate_overlap() {
        let mut config = AppConfig::default();
        config.indexing.chunk_size = 100;
        config.indexing.chunk_overlap = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_chroma_requires_endpoint() {
        let mut config = AppConfig::default();
        config.vector_store.backend = "chroma".to_string();
        assert!(config.validate().is_err());

        config.vector_store.endpoint = Some("http://localhost:8000".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_merge_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
llm:
  activeProvider: ollama
  providers:
    ollama:
      endpoint: http://gpu-box:11434
      model: qwen2.5
logging:
  level: warn
  color: false
  format: json
retrieval:
  maxK: 20
  displayK: 8
  multiQuery: true
  rerankerModel: bge-reranker-v2-m3
webSearch:
  endpoint: http://localhost:8888
indexing:
  chunkSize: 800
  chunkOverlap: 100
"#,
        )
        .unwrap();

        let config = AppConfig::default().merge_yaml(&path).unwrap();

        assert_eq!(config.model, "qwen2.5");
        assert_eq!(
            config.provider_endpoint("ollama").as_deref(),
            Some("http://gpu-box:11434")
        );
        assert_eq!(config.log_level.as_deref(), Some("warn"));
        assert!(config.no_color);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.retrieval.max_k, 20);
        assert_eq!(config.retrieval.display_k, 8);
        assert!(config.retrieval.multi_query);
        assert!(config.retrieval.rerank);
        assert_eq!(
            config.retrieval.reranker_model.as_deref(),
            Some("bge-reranker-v2-m3")
        );
        assert_eq!(config.web_search.as_ref().map(|w| w.max_results), Some(5));
        assert_eq!(config.indexing.chunk_size, 800);
        assert_eq!(config.indexing.commit_every, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_merge_yaml_invalid() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(&path, "retrieval: [not, a, map]").unwrap();

        let result = AppConfig::default().merge_yaml(&path);
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
