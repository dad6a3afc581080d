//! Data model shared by the indexing and retrieval pipelines.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use notevault_core::AppError;

/// A bounded span of a note's text, the unit stored and retrieved.
///
/// `id` is derived from the source path and the chunk's byte offset, so
/// re-embedding a note overwrites its chunks instead of duplicating them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    /// Vault-relative path with `/` separators
    pub source_path: String,
    pub metadata: BTreeMap<String, String>,
}

/// A chunk paired with its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// A vector store hit. Higher scores are more relevant.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub chunk: Chunk,
    pub score: f32,
}

/// A retrieved chunk as handed to the chat layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagChunk {
    pub chunk_id: String,
    pub source_path: String,
    pub text: String,
    /// Similarity score from the vector store
    pub score: f32,
    /// Position-derived relevance assigned by the reranker, if one ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
    pub metadata: BTreeMap<String, String>,
}

impl RagChunk {
    pub fn from_result(result: SearchResult, rerank_score: Option<f32>) -> Self {
        Self {
            chunk_id: result.chunk.id,
            source_path: result.chunk.source_path,
            text: result.chunk.text,
            score: result.score,
            rerank_score,
            metadata: result.chunk.metadata,
        }
    }

    /// Human-readable location such as "lines 12-30".
    pub fn location(&self) -> Option<String> {
        let start = self.metadata.get("line_start")?;
        let end = self.metadata.get("line_end")?;
        if start == end {
            Some(format!("line {}", start))
        } else {
            Some(format!("lines {}-{}", start, end))
        }
    }
}

/// The unit returned to the chat layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagResult {
    pub answer: String,
    pub chunks: Vec<RagChunk>,
    pub used_reranker: bool,
    pub metadata: BTreeMap<String, String>,
}

/// Persisted per-vault index state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultMetadata {
    /// Vault-relative path -> content hash
    pub indexed_file_hashes: HashMap<String, String>,
    pub last_indexed_at_millis: i64,
}

/// Freshness of a vault's index. Derived on demand, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Synced,
    OutOfSync,
    NotIndexed,
    Unavailable,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SyncStatus::Synced => "synced",
            SyncStatus::OutOfSync => "out of sync",
            SyncStatus::NotIndexed => "not indexed",
            SyncStatus::Unavailable => "unavailable",
        };
        f.write_str(label)
    }
}

/// Which sources feed the chat context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    None,
    Rag,
    Web,
    Hybrid,
}

impl RetrievalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMode::None => "none",
            RetrievalMode::Rag => "rag",
            RetrievalMode::Web => "web",
            RetrievalMode::Hybrid => "hybrid",
        }
    }

    pub fn uses_rag(&self) -> bool {
        matches!(self, RetrievalMode::Rag | RetrievalMode::Hybrid)
    }

    pub fn uses_web(&self) -> bool {
        matches!(self, RetrievalMode::Web | RetrievalMode::Hybrid)
    }
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetrievalMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(RetrievalMode::None),
            "rag" => Ok(RetrievalMode::Rag),
            "web" => Ok(RetrievalMode::Web),
            "hybrid" => Ok(RetrievalMode::Hybrid),
            other => Err(AppError::Config(format!(
                "Unknown retrieval mode: {}. Supported: none, rag, web, hybrid",
                other
            ))),
        }
    }
}

/// A web search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// One sourced snippet of retrieved context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum ContextItem {
    Rag(RagChunk),
    Web(WebResult),
}

/// Merged context for one chat turn. RAG items always precede web items.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub items: Vec<ContextItem>,
    /// Sources that contributed, e.g. `["rag", "web"]`
    pub sources_used: Vec<String>,
    /// True when a planned source was unavailable or failed
    pub degraded: bool,
    pub used_reranker: bool,
    /// The vector store could not be reached for this request
    #[serde(default)]
    pub rag_unreachable: bool,
}

impl RetrievedContext {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn rag_chunks(&self) -> impl Iterator<Item = &RagChunk> {
        self.items.iter().filter_map(|item| match item {
            ContextItem::Rag(chunk) => Some(chunk),
            ContextItem::Web(_) => None,
        })
    }
}

/// Summary of one indexing pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub files_seen: usize,
    pub files_indexed: usize,
    pub files_unchanged: usize,
    pub files_failed: usize,
    pub files_removed: usize,
    pub chunks_upserted: usize,
    pub cancelled: bool,
    pub duration_secs: f64,
}
