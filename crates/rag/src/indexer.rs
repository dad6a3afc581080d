//! Incremental vault indexing.
//!
//! A pass hashes every markdown note, re-embeds only notes whose hash changed,
//! deletes chunks of notes that disappeared, and persists the resulting hash
//! map. Metadata is committed every `commit_every` processed notes so a
//! cancelled or failed pass keeps the work it already did.

use crate::chunker::Chunker;
use crate::embeddings::EmbeddingProvider;
use crate::fs::{self as vault_fs, ContentHasher, FileSystem};
use crate::metadata::VaultMetadataStore;
use crate::progress::{IndexPhase, ProgressReporter};
use crate::store::{collection_key, VectorStore};
use crate::types::{EmbeddedChunk, IndexStats, VaultMetadata};
use notevault_core::{AppError, AppResult};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEFAULT_COMMIT_EVERY: usize = 20;

pub struct Indexer {
    fs: Arc<dyn FileSystem>,
    hasher: Arc<dyn ContentHasher>,
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    metadata: Arc<dyn VaultMetadataStore>,
    commit_every: usize,
    progress: ProgressReporter,
}

/// Working state of one pass.
struct Pass {
    collection: String,
    hashes: HashMap<String, String>,
    stats: IndexStats,
    uncommitted: usize,
}

impl Indexer {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        hasher: Arc<dyn ContentHasher>,
        chunker: Chunker,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        metadata: Arc<dyn VaultMetadataStore>,
    ) -> Self {
        Self {
            fs,
            hasher,
            chunker,
            embedder,
            store,
            metadata,
            commit_every: DEFAULT_COMMIT_EVERY,
            progress: ProgressReporter::noop(),
        }
    }

    pub fn with_commit_every(mut self, commit_every: usize) -> Self {
        self.commit_every = commit_every.max(1);
        self
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Persisted hashes for a vault, empty if it was never indexed.
    pub fn load_hashes(&self, root: &Path) -> AppResult<HashMap<String, String>> {
        Ok(self
            .metadata
            .load(&collection_key(root))?
            .map(|m| m.indexed_file_hashes)
            .unwrap_or_default())
    }

    /// Index every markdown note under `root`.
    ///
    /// Notes whose hash matches `existing_file_hashes` are skipped without
    /// touching the embedder or the store. Per-note failures are counted and
    /// skipped; an unreachable store ends the pass after committing.
    pub async fn index_vault(
        &self,
        root: &Path,
        existing_file_hashes: &HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> AppResult<IndexStats> {
        let started = Instant::now();
        let mut pass = Pass {
            collection: collection_key(root),
            hashes: existing_file_hashes.clone(),
            stats: IndexStats::default(),
            uncommitted: 0,
        };

        let files: Vec<PathBuf> = self
            .fs
            .list_files(root)?
            .into_iter()
            .filter(|p| vault_fs::is_markdown(p))
            .collect();
        pass.stats.files_seen = files.len();
        self.progress.emit(
            IndexPhase::Discover,
            files.len(),
            None,
            format!("{} notes", files.len()),
        );
        info!(
            "Indexing {} notes in {:?} (collection {})",
            files.len(),
            root,
            pass.collection
        );

        let mut on_disk = HashSet::with_capacity(files.len());
        for (i, path) in files.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("Indexing cancelled after {} of {} notes", i, files.len());
                pass.stats.cancelled = true;
                break;
            }

            let relative = vault_fs::relative_path(root, path);
            on_disk.insert(relative.clone());

            let bytes = match self.fs.read_bytes(path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Skipping unreadable note {}: {}", relative, e);
                    pass.stats.files_failed += 1;
                    continue;
                }
            };

            let hash = self.hasher.hash(&bytes);
            if existing_file_hashes.get(&relative) == Some(&hash) {
                pass.stats.files_unchanged += 1;
                continue;
            }

            self.progress
                .emit(IndexPhase::Embed, i + 1, Some(files.len()), relative.as_str());

            match self.embed_note(&pass.collection, &relative, &bytes).await {
                Ok(chunks) => {
                    pass.hashes.insert(relative, hash);
                    pass.stats.files_indexed += 1;
                    pass.stats.chunks_upserted += chunks;
                    pass.uncommitted += 1;
                }
                Err(e) if e.is_unreachable() => {
                    self.commit(&mut pass)?;
                    return Err(e);
                }
                Err(e) => {
                    warn!("{}", e);
                    pass.stats.files_failed += 1;
                }
            }

            if pass.uncommitted >= self.commit_every {
                self.commit(&mut pass)?;
            }
        }

        // Only a complete listing tells which notes are gone
        if !pass.stats.cancelled {
            let missing: Vec<String> = existing_file_hashes
                .keys()
                .filter(|path| !on_disk.contains(*path))
                .cloned()
                .collect();

            for (i, relative) in missing.iter().enumerate() {
                self.progress
                    .emit(IndexPhase::Remove, i + 1, Some(missing.len()), relative.as_str());

                match self.remove_chunks(&pass.collection, relative).await {
                    Ok(()) => {
                        pass.hashes.remove(relative);
                        pass.stats.files_removed += 1;
                        pass.uncommitted += 1;
                    }
                    Err(e) if e.is_unreachable() => {
                        self.commit(&mut pass)?;
                        return Err(e);
                    }
                    Err(e) => {
                        warn!("Failed to remove chunks of {}: {}", relative, e);
                        pass.stats.files_failed += 1;
                    }
                }
            }
        }

        self.commit(&mut pass)?;

        pass.stats.duration_secs = started.elapsed().as_secs_f64();
        info!(
            "Indexed {} notes ({} unchanged, {} failed, {} removed, {} chunks) in {:.2}s",
            pass.stats.files_indexed,
            pass.stats.files_unchanged,
            pass.stats.files_failed,
            pass.stats.files_removed,
            pass.stats.chunks_upserted,
            pass.stats.duration_secs
        );

        Ok(pass.stats)
    }

    /// Load persisted hashes and run an incremental pass.
    pub async fn reindex_vault(
        &self,
        root: &Path,
        cancel: &CancellationToken,
    ) -> AppResult<IndexStats> {
        let existing = self.load_hashes(root)?;
        self.index_vault(root, &existing, cancel).await
    }

    /// Index a single note and record its hash.
    ///
    /// `path` is absolute or relative to `root`.
    pub async fn index_file(&self, root: &Path, path: &Path) -> AppResult<IndexStats> {
        let started = Instant::now();
        let collection = collection_key(root);
        let path = resolve(root, path);
        let relative = vault_fs::relative_path(root, &path);

        if !vault_fs::is_markdown(&path) {
            return Err(AppError::indexing_file(relative, "not a markdown note"));
        }

        let bytes = self
            .fs
            .read_bytes(&path)
            .map_err(|e| AppError::indexing_file(relative.as_str(), e))?;
        let hash = self.hasher.hash(&bytes);

        let mut metadata = self.metadata.load(&collection)?.unwrap_or_default();
        let mut stats = IndexStats {
            files_seen: 1,
            ..Default::default()
        };

        if metadata.indexed_file_hashes.get(&relative) == Some(&hash) {
            debug!("{} unchanged, skipping", relative);
            stats.files_unchanged = 1;
        } else {
            stats.chunks_upserted = self.embed_note(&collection, &relative, &bytes).await?;
            stats.files_indexed = 1;
            metadata.indexed_file_hashes.insert(relative, hash);
            self.save(&collection, metadata)?;
        }

        stats.duration_secs = started.elapsed().as_secs_f64();
        Ok(stats)
    }

    /// Delete a note's chunks and forget its hash.
    pub async fn remove_file(&self, root: &Path, path: &Path) -> AppResult<IndexStats> {
        let collection = collection_key(root);
        let relative = vault_fs::relative_path(root, &resolve(root, path));

        self.remove_chunks(&collection, &relative).await?;

        let mut metadata = self.metadata.load(&collection)?.unwrap_or_default();
        if metadata.indexed_file_hashes.remove(&relative).is_some() {
            self.save(&collection, metadata)?;
        }

        info!("Removed {} from index", relative);
        Ok(IndexStats {
            files_seen: 1,
            files_removed: 1,
            ..Default::default()
        })
    }

    /// Drop the vault's collection and its metadata.
    pub async fn drop_vault(&self, root: &Path) -> AppResult<()> {
        let collection = collection_key(root);
        self.store.drop_collection(&collection).await?;
        self.metadata.delete(&collection)?;
        info!("Dropped index for {:?} ({})", root, collection);
        Ok(())
    }

    /// Chunk, embed and upsert one note, then delete its stale chunks.
    async fn embed_note(&self, collection: &str, relative: &str, bytes: &[u8]) -> AppResult<usize> {
        let text = String::from_utf8_lossy(bytes);
        let chunks = self.chunker.chunk(relative, &text);

        let previous = self
            .store
            .chunk_ids_for_source(collection, relative)
            .await
            .map_err(|e| per_file(relative, e))?;

        if !chunks.is_empty() {
            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            let embeddings = self
                .embedder
                .embed_batch(&texts)
                .await
                .map_err(|e| AppError::indexing_file(relative, e))?;

            if embeddings.len() != chunks.len() {
                return Err(AppError::indexing_file(
                    relative,
                    format!(
                        "embedder returned {} vectors for {} chunks",
                        embeddings.len(),
                        chunks.len()
                    ),
                ));
            }

            let embedded: Vec<EmbeddedChunk> = chunks
                .iter()
                .cloned()
                .zip(embeddings)
                .map(|(chunk, embedding)| EmbeddedChunk { chunk, embedding })
                .collect();

            self.store
                .upsert(collection, &embedded)
                .await
                .map_err(|e| per_file(relative, e))?;
        }

        let current: HashSet<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        let stale: Vec<String> = previous
            .into_iter()
            .filter(|id| !current.contains(id.as_str()))
            .collect();
        if !stale.is_empty() {
            debug!("Deleting {} stale chunks of {}", stale.len(), relative);
            self.store
                .delete(collection, &stale)
                .await
                .map_err(|e| per_file(relative, e))?;
        }

        debug!("Embedded {} ({} chunks)", relative, chunks.len());
        Ok(chunks.len())
    }

    async fn remove_chunks(&self, collection: &str, relative: &str) -> AppResult<()> {
        let ids = self.store.chunk_ids_for_source(collection, relative).await?;
        self.store.delete(collection, &ids).await?;
        debug!("Deleted {} chunks of removed note {}", ids.len(), relative);
        Ok(())
    }

    fn commit(&self, pass: &mut Pass) -> AppResult<()> {
        self.save(
            &pass.collection,
            VaultMetadata {
                indexed_file_hashes: pass.hashes.clone(),
                last_indexed_at_millis: 0,
            },
        )?;
        pass.uncommitted = 0;
        self.progress.emit(
            IndexPhase::Commit,
            pass.hashes.len(),
            None,
            "metadata saved",
        );
        Ok(())
    }

    fn save(&self, collection: &str, mut metadata: VaultMetadata) -> AppResult<()> {
        metadata.last_indexed_at_millis = chrono::Utc::now().timestamp_millis();
        self.metadata.save(collection, &metadata)
    }
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Keep unreachability visible; anything else is this note's failure.
fn per_file(relative: &str, e: AppError) -> AppError {
    if e.is_unreachable() {
        e
    } else {
        AppError::indexing_file(relative, e)
    }
}
