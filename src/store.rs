//! Persisted chunk store with similarity search.
//!
//! In-memory entries with JSON disk persistence. Its `search` runs the same
//! prefilter as the in-memory retrieval path (same weights, threshold, and
//! limit semantics), so the two Stage 1 variants are interchangeable.

use anyhow::Context;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Chunk, ScoredChunk};
use crate::retrieval::prefilter;

/// A stored chunk, tagged with the document it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredChunk {
    document_id: Uuid,
    added_at: DateTime<Utc>,
    chunk: Chunk,
}

/// In-memory chunk store with disk persistence.
pub struct ChunkStore {
    entries: RwLock<Vec<StoredChunk>>,
    persist_path: PathBuf,
}

impl ChunkStore {
    pub fn open_or_create(store_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(store_dir)
            .with_context(|| format!("Failed to create {}", store_dir.display()))?;
        let persist_path = store_dir.join("chunks.json");

        let entries = if persist_path.exists() {
            let data = std::fs::read_to_string(&persist_path)
                .context("Failed to read chunk store")?;
            serde_json::from_str(&data).unwrap_or_default()
        } else {
            Vec::new()
        };

        Ok(Self {
            entries: RwLock::new(entries),
            persist_path,
        })
    }

    /// Persist a fully processed document.
    ///
    /// Callers only reach this once every chunk has been situated and
    /// embedded, so a stored document is never partial. Chunks without a
    /// content embedding are rejected before anything is written.
    pub fn add_document(&self, document_id: Uuid, chunks: Vec<Chunk>) -> Result<usize> {
        for (i, chunk) in chunks.iter().enumerate() {
            if chunk.content_embedding.is_none() {
                return Err(Error::InvalidConfig(format!(
                    "chunk {i} of document {document_id} has no content embedding"
                )));
            }
        }

        let added_at = Utc::now();
        let count = chunks.len();

        let mut entries = self.entries.write();
        entries.extend(chunks.into_iter().map(|chunk| StoredChunk {
            document_id,
            added_at,
            chunk,
        }));
        self.persist(&entries)?;

        Ok(count)
    }

    /// Delete all chunks for a document. Returns false if none existed.
    pub fn delete_document(&self, document_id: &Uuid) -> Result<bool> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| &e.document_id != document_id);
        if entries.len() == before {
            return Ok(false);
        }
        self.persist(&entries)?;
        Ok(true)
    }

    /// Stage 1 over the stored corpus: combined-score prefilter with the
    /// same weighting, inclusive threshold, and limit as the in-memory path.
    pub fn search(
        &self,
        query_embedding: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let candidates: Vec<Chunk> = {
            let entries = self.entries.read();
            entries.iter().map(|e| e.chunk.clone()).collect()
        };
        prefilter(query_embedding, candidates, threshold, limit)
    }

    pub fn chunk_count(&self) -> usize {
        self.entries.read().len()
    }

    pub fn document_count(&self) -> usize {
        let entries = self.entries.read();
        let mut ids: Vec<Uuid> = entries.iter().map(|e| e.document_id).collect();
        ids.sort();
        ids.dedup();
        ids.len()
    }

    /// Atomic write via temp file + rename.
    fn persist(&self, entries: &[StoredChunk]) -> Result<()> {
        let data = serde_json::to_string(entries).context("Failed to serialize chunk store")?;
        let tmp_path = self.persist_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &data).context("Failed to write chunk store")?;
        std::fs::rename(&tmp_path, &self.persist_path)
            .context("Failed to replace chunk store")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(label: &str, s: f32) -> Chunk {
        Chunk {
            content: label.to_string(),
            context: None,
            content_embedding: Some(vec![s, (1.0 - s * s).sqrt(), 0.0]),
            context_embedding: None,
            metadata: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_add_and_search_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::open_or_create(dir.path()).unwrap();

        let doc = Uuid::new_v4();
        store
            .add_document(doc, vec![chunk("a", 0.9), chunk("b", 0.3)])
            .unwrap();

        let hits = store.search(&[1.0, 0.0, 0.0], 0.5, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.content, "a");
    }

    #[test]
    fn test_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let doc = Uuid::new_v4();
        {
            let store = ChunkStore::open_or_create(dir.path()).unwrap();
            store.add_document(doc, vec![chunk("persisted", 0.8)]).unwrap();
        }

        let reopened = ChunkStore::open_or_create(dir.path()).unwrap();
        assert_eq!(reopened.chunk_count(), 1);
        let hits = reopened.search(&[1.0, 0.0, 0.0], 0.0, 10).unwrap();
        assert_eq!(hits[0].chunk.content, "persisted");
    }

    #[test]
    fn test_rejects_unembedded_chunks_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::open_or_create(dir.path()).unwrap();

        let bare = Chunk {
            content: "no vector".to_string(),
            context: None,
            content_embedding: None,
            context_embedding: None,
            metadata: serde_json::Map::new(),
        };
        let err = store
            .add_document(Uuid::new_v4(), vec![chunk("ok", 0.5), bare])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert_eq!(store.chunk_count(), 0);
    }

    #[test]
    fn test_delete_document_removes_only_its_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::open_or_create(dir.path()).unwrap();

        let keep = Uuid::new_v4();
        let gone = Uuid::new_v4();
        store.add_document(keep, vec![chunk("keep", 0.5)]).unwrap();
        store.add_document(gone, vec![chunk("gone", 0.5)]).unwrap();
        assert_eq!(store.document_count(), 2);

        assert!(store.delete_document(&gone).unwrap());
        assert!(!store.delete_document(&gone).unwrap());
        assert_eq!(store.document_count(), 1);
        assert_eq!(store.chunk_count(), 1);
    }

    #[test]
    fn test_search_matches_in_memory_prefilter() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::open_or_create(dir.path()).unwrap();

        let candidates = vec![chunk("a", 0.9), chunk("b", 0.5), chunk("c", 0.7)];
        store.add_document(Uuid::new_v4(), candidates.clone()).unwrap();

        let query = [1.0, 0.0, 0.0];
        let from_store = store.search(&query, 0.6, 2).unwrap();
        let in_memory = prefilter(&query, candidates, 0.6, 2).unwrap();

        assert_eq!(from_store.len(), in_memory.len());
        for (s, m) in from_store.iter().zip(&in_memory) {
            assert_eq!(s.chunk.content, m.chunk.content);
            assert_eq!(s.combined_score, m.combined_score);
        }
    }
}
