//! Persistence of per-vault index state.

use crate::types::VaultMetadata;
use notevault_core::{AppError, AppResult};
use std::path::{Path, PathBuf};

const METADATA_FILE: &str = "metadata.json";

/// Loads and stores `VaultMetadata` per collection.
pub trait VaultMetadataStore: Send + Sync {
    /// `None` if the vault was never indexed.
    fn load(&self, collection: &str) -> AppResult<Option<VaultMetadata>>;

    fn save(&self, collection: &str, metadata: &VaultMetadata) -> AppResult<()>;

    fn delete(&self, collection: &str) -> AppResult<()>;
}

/// JSON sidecar at `<state_dir>/vaults/<collection>/metadata.json`.
#[derive(Debug, Clone)]
pub struct JsonMetadataStore {
    root: PathBuf,
}

impl JsonMetadataStore {
    /// `state_dir` is the workspace's `.notevault` directory.
    pub fn new(state_dir: &Path) -> Self {
        Self {
            root: state_dir.join("vaults"),
        }
    }

    pub fn path_for(&self, collection: &str) -> PathBuf {
        self.root.join(collection).join(METADATA_FILE)
    }
}

impl VaultMetadataStore for JsonMetadataStore {
    fn load(&self, collection: &str) -> AppResult<Option<VaultMetadata>> {
        let path = self.path_for(collection);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)?;
        let metadata = serde_json::from_str(&content).map_err(|e| {
            AppError::Serialization(format!("Failed to parse {:?}: {}", path, e))
        })?;
        Ok(Some(metadata))
    }

    fn save(&self, collection: &str, metadata: &VaultMetadata) -> AppResult<()> {
        let path = self.path_for(collection);
        let dir = path
            .parent()
            .ok_or_else(|| AppError::Other(format!("Invalid metadata path: {:?}", path)))?;
        std::fs::create_dir_all(dir)?;

        // Write then rename so readers never see a torn file
        let tmp = dir.join(format!("{}.tmp", METADATA_FILE));
        std::fs::write(&tmp, serde_json::to_vec_pretty(metadata)?)?;
        std::fs::rename(&tmp, &path)?;

        tracing::debug!(
            "Saved metadata for {} ({} files)",
            collection,
            metadata.indexed_file_hashes.len()
        );
        Ok(())
    }

    fn delete(&self, collection: &str) -> AppResult<()> {
        let dir = self.root.join(collection);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_returns_none() {
        let temp = TempDir::new().unwrap();
        let store = JsonMetadataStore::new(temp.path());
        assert!(store.load("vault_x").unwrap().is_none());
    }

    #[test]
    fn test_save_load_delete() {
        let temp = TempDir::new().unwrap();
        let store = JsonMetadataStore::new(temp.path());

        let mut metadata = VaultMetadata::default();
        metadata
            .indexed_file_hashes
            .insert("a.md".to_string(), "h1".to_string());
        metadata.last_indexed_at_millis = 42;

        store.save("vault_x", &metadata).unwrap();
        assert!(temp.path().join("vaults/vault_x/metadata.json").exists());
        assert!(!temp.path().join("vaults/vault_x/metadata.json.tmp").exists());
        assert_eq!(store.load("vault_x").unwrap(), Some(metadata));

        store.delete("vault_x").unwrap();
        assert!(store.load("vault_x").unwrap().is_none());
        store.delete("vault_x").unwrap();
    }

    #[test]
    fn test_corrupt_file_is_serialization_error() {
        let temp = TempDir::new().unwrap();
        let store = JsonMetadataStore::new(temp.path());
        let path = store.path_for("vault_x");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            store.load("vault_x"),
            Err(AppError::Serialization(_))
        ));
    }
}
