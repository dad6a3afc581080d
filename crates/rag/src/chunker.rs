//! Markdown-aware chunking with stable chunk IDs.

use crate::types::Chunk;
use notevault_core::{AppError, AppResult};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use text_splitter::{ChunkConfig, MarkdownSplitter};

/// Hex characters kept from the SHA-256 chunk ID digest.
const CHUNK_ID_LEN: usize = 32;

/// Splits notes into bounded, overlapping chunks.
///
/// Output depends only on the note text and its path, so re-indexing an
/// unchanged note reproduces the same IDs.
pub struct Chunker {
    splitter: MarkdownSplitter<text_splitter::Characters>,
}

impl Chunker {
    /// # Errors
    /// `AppError::Config` if `chunk_overlap >= chunk_size` or `chunk_size == 0`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> AppResult<Self> {
        if chunk_size == 0 {
            return Err(AppError::Config(
                "Chunk size must be greater than zero".to_string(),
            ));
        }

        let config = ChunkConfig::new(chunk_size)
            .with_overlap(chunk_overlap)
            .map_err(|e| {
                AppError::Config(format!(
                    "Invalid chunk overlap {} for chunk size {}: {}",
                    chunk_overlap, chunk_size, e
                ))
            })?;

        Ok(Self {
            splitter: MarkdownSplitter::new(config),
        })
    }

    /// Split `text` of the note at vault-relative `source_path`.
    pub fn chunk(&self, source_path: &str, text: &str) -> Vec<Chunk> {
        let headings = heading_offsets(text);
        let file_name = source_path
            .rsplit('/')
            .next()
            .unwrap_or(source_path)
            .to_string();

        let chunks: Vec<Chunk> = self
            .splitter
            .chunk_indices(text)
            .filter(|(_, chunk_text)| !chunk_text.trim().is_empty())
            .enumerate()
            .map(|(position, (offset, chunk_text))| {
                let line_start = text[..offset].matches('\n').count() + 1;
                let line_end = line_start + chunk_text.trim_end().matches('\n').count();

                let mut metadata = BTreeMap::new();
                metadata.insert("offset".to_string(), offset.to_string());
                metadata.insert("position".to_string(), position.to_string());
                metadata.insert("line_start".to_string(), line_start.to_string());
                metadata.insert("line_end".to_string(), line_end.to_string());
                metadata.insert("file_name".to_string(), file_name.clone());
                if let Some(heading) = nearest_heading(&headings, offset) {
                    metadata.insert("heading".to_string(), heading.to_string());
                }

                Chunk {
                    id: chunk_id(source_path, offset),
                    text: chunk_text.to_string(),
                    source_path: source_path.to_string(),
                    metadata,
                }
            })
            .collect();

        tracing::debug!(
            "Chunked {} into {} chunks ({} bytes)",
            source_path,
            chunks.len(),
            text.len()
        );

        chunks
    }
}

/// Deterministic chunk ID: SHA-256 of path, NUL, byte offset.
pub fn chunk_id(source_path: &str, offset: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_path.as_bytes());
    hasher.update([0u8]);
    hasher.update(offset.to_string().as_bytes());
    let mut id = format!("{:x}", hasher.finalize());
    id.truncate(CHUNK_ID_LEN);
    id
}

/// Byte offsets and titles of ATX headings outside fenced code blocks.
fn heading_offsets(text: &str) -> Vec<(usize, &str)> {
    let mut headings = Vec::new();
    let mut in_fence = false;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        } else if !in_fence && trimmed.starts_with('#') {
            let title = trimmed.trim_start_matches('#');
            let level = trimmed.len() - title.len();
            if level <= 6 && (title.is_empty() || title.starts_with(' ')) {
                let title = title.trim();
                if !title.is_empty() {
                    headings.push((offset, title));
                }
            }
        }
        offset += line.len();
    }

    headings
}

fn nearest_heading<'a>(headings: &[(usize, &'a str)], offset: usize) -> Option<&'a str> {
    headings
        .iter()
        .take_while(|(heading_offset, _)| *heading_offset <= offset)
        .last()
        .map(|(_, title)| *title)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOTE: &str = "# Garden\n\nTomatoes need full sun and deep watering twice a week.\n\n## Pests\n\nAphids can be washed off with a strong jet of water. Ladybugs help too.\n\n```\n# not a heading\n```\n\nCompost in autumn.\n";

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        assert!(matches!(Chunker::new(100, 100), Err(AppError::Config(_))));
        assert!(matches!(Chunker::new(0, 0), Err(AppError::Config(_))));
        assert!(Chunker::new(100, 20).is_ok());
    }

    #[test]
    fn test_chunks_are_bounded() {
        let chunker = Chunker::new(80, 10).unwrap();
        let chunks = chunker.chunk("garden.md", NOTE);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 80);
            assert!(!chunk.text.trim().is_empty());
            assert_eq!(chunk.source_path, "garden.md");
            assert_eq!(chunk.metadata["file_name"], "garden.md");
        }
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let chunker = Chunker::new(80, 10).unwrap();
        let first = chunker.chunk("notes/garden.md", NOTE);
        let second = chunker.chunk("notes/garden.md", NOTE);
        assert_eq!(first, second);

        let moved = chunker.chunk("archive/garden.md", NOTE);
        assert_ne!(first[0].id, moved[0].id);
    }

    #[test]
    fn test_chunk_ids_unique_within_note() {
        let chunker = Chunker::new(60, 10).unwrap();
        let chunks = chunker.chunk("garden.md", &NOTE.repeat(3));
        let mut ids: Vec<_> = chunks.iter().map(|c| c.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), chunks.len());
        assert!(chunks.iter().all(|c| c.id.len() == CHUNK_ID_LEN));
    }

    #[test]
    fn test_heading_and_line_metadata() {
        let chunker = Chunker::new(1000, 0).unwrap();
        let chunks = chunker.chunk("garden.md", NOTE);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata["line_start"], "1");
        assert_eq!(chunks[0].metadata["heading"], "Garden");
        assert_eq!(chunks[0].metadata["offset"], "0");
    }

    #[test]
    fn test_heading_offsets_ignore_code_fences() {
        let headings = heading_offsets(NOTE);
        let titles: Vec<_> = headings.iter().map(|(_, t)| *t).collect();
        assert_eq!(titles, vec!["Garden", "Pests"]);
        assert_eq!(nearest_heading(&headings, NOTE.len()), Some("Pests"));
    }

    #[test]
    fn test_empty_note() {
        let chunker = Chunker::new(100, 10).unwrap();
        assert!(chunker.chunk("empty.md", "   \n\n").is_empty());
    }
}
