//! Index freshness checks.

use crate::fs::{self as vault_fs, ContentHasher, FileSystem};
use crate::metadata::VaultMetadataStore;
use crate::store::{collection_key, VectorStore};
use crate::types::SyncStatus;
use notevault_core::AppResult;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Vault-relative paths that differ from the persisted hashes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncDiff {
    pub added: BTreeSet<String>,
    /// Includes notes that could not be read
    pub changed: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl SyncDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.changed.len() + self.removed.len()
    }
}

/// Read-only comparison of the vault on disk with its index.
pub struct SyncStatusService {
    fs: Arc<dyn FileSystem>,
    hasher: Arc<dyn ContentHasher>,
    /// `None` when no store could be constructed
    store: Option<Arc<dyn VectorStore>>,
    metadata: Arc<dyn VaultMetadataStore>,
}

impl SyncStatusService {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        hasher: Arc<dyn ContentHasher>,
        store: Option<Arc<dyn VectorStore>>,
        metadata: Arc<dyn VaultMetadataStore>,
    ) -> Self {
        Self {
            fs,
            hasher,
            store,
            metadata,
        }
    }

    /// Current status of the vault's index. Never mutates anything.
    pub async fn check_sync_status(&self, vault_path: &Path) -> SyncStatus {
        let Some(store) = &self.store else {
            return SyncStatus::Unavailable;
        };
        let collection = collection_key(vault_path);

        if let Err(e) = store.ping().await {
            debug!("Vector store unreachable: {}", e);
            return SyncStatus::Unavailable;
        }

        match store.has_data(&collection).await {
            Ok(true) => {}
            Ok(false) => return SyncStatus::NotIndexed,
            Err(e) if e.is_unreachable() => {
                debug!("Vector store unreachable: {}", e);
                return SyncStatus::Unavailable;
            }
            Err(e) => {
                warn!("Failed to check collection {}: {}", collection, e);
                return SyncStatus::OutOfSync;
            }
        }

        let hashes = match self.metadata.load(&collection) {
            Ok(metadata) => metadata.map(|m| m.indexed_file_hashes).unwrap_or_default(),
            Err(e) => {
                warn!("Failed to load vault metadata: {}", e);
                return SyncStatus::OutOfSync;
            }
        };

        match self.diff_vault(vault_path, &hashes) {
            Ok(diff) if diff.is_empty() => SyncStatus::Synced,
            Ok(diff) => {
                debug!(
                    "{} added, {} changed, {} removed",
                    diff.added.len(),
                    diff.changed.len(),
                    diff.removed.len()
                );
                SyncStatus::OutOfSync
            }
            Err(e) => {
                warn!("Failed to scan vault {:?}: {}", vault_path, e);
                SyncStatus::OutOfSync
            }
        }
    }

    /// Compare markdown notes under `root` with `indexed_file_hashes`.
    pub fn diff_vault(
        &self,
        root: &Path,
        indexed_file_hashes: &HashMap<String, String>,
    ) -> AppResult<SyncDiff> {
        let mut diff = SyncDiff::default();
        let mut on_disk = BTreeSet::new();

        for path in self.fs.list_files(root)? {
            if !vault_fs::is_markdown(&path) {
                continue;
            }
            let relative = vault_fs::relative_path(root, &path);

            match indexed_file_hashes.get(&relative) {
                None => {
                    diff.added.insert(relative.clone());
                }
                Some(indexed) => match self.fs.read_bytes(&path) {
                    Ok(bytes) if self.hasher.hash(&bytes) == *indexed => {}
                    Ok(_) => {
                        diff.changed.insert(relative.clone());
                    }
                    Err(e) => {
                        debug!("Unreadable note {} counts as changed: {}", relative, e);
                        diff.changed.insert(relative.clone());
                    }
                },
            }
            on_disk.insert(relative);
        }

        diff.removed = indexed_file_hashes
            .keys()
            .filter(|path| !on_disk.contains(*path))
            .cloned()
            .collect();

        Ok(diff)
    }
}
