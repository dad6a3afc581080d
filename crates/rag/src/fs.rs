//! File system and content hashing collaborators.

use notevault_core::{AppError, AppResult};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Read access to the vault's files.
pub trait FileSystem: Send + Sync {
    /// All regular files under `root`, skipping hidden directories.
    fn list_files(&self, root: &Path) -> AppResult<Vec<PathBuf>>;

    fn read_bytes(&self, path: &Path) -> AppResult<Vec<u8>>;

    fn exists(&self, path: &Path) -> bool;

    fn is_directory(&self, path: &Path) -> bool;
}

/// Stable content hash used for incremental indexing.
pub trait ContentHasher: Send + Sync {
    fn hash(&self, bytes: &[u8]) -> String;
}

/// Local disk, walked with `walkdir`.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn list_files(&self, root: &Path) -> AppResult<Vec<PathBuf>> {
        if !root.is_dir() {
            return Err(AppError::Config(format!(
                "Vault directory does not exist: {:?}",
                root
            )));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()))
        {
            match entry {
                Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
                Ok(_) => {}
                Err(e) => tracing::warn!("Skipping unreadable vault entry: {}", e),
            }
        }

        Ok(files)
    }

    fn read_bytes(&self, path: &Path) -> AppResult<Vec<u8>> {
        Ok(std::fs::read(path)?)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_directory(&self, path: &Path) -> bool {
        path.is_dir()
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().map(|s| s.starts_with('.')).unwrap_or(false)
}

/// SHA-256, hex-encoded.
#[derive(Debug, Clone, Default)]
pub struct Sha256Hasher;

impl ContentHasher for Sha256Hasher {
    fn hash(&self, bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        format!("{:x}", hasher.finalize())
    }
}

/// Whether `path` is a markdown note.
pub fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("md") || ext.eq_ignore_ascii_case("markdown"))
        .unwrap_or(false)
}

/// Vault-relative path with `/` separators, the key used in `VaultMetadata`.
pub fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
