//! In-memory cosine vector store with bincode snapshots.

use async_trait::async_trait;
use bincode::config;
use dashmap::DashMap;
use mizan_core::error::{MizanError, Result};
use mizan_core::id::{ChunkId, DocumentId};
use mizan_core::traits::VectorStore;
use mizan_core::types::{Chunk, MetadataFilter, VectorHit};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

/// Cosine similarity in [-1, 1]; 0 when either vector is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    vector: Vec<f32>,
    chunk: Chunk,
}

#[derive(Serialize, Deserialize)]
struct IndexData {
    dimension: usize,
    entries: Vec<Entry>,
}

/// Exact nearest-neighbour search over all stored vectors.
pub struct InMemoryVectorStore {
    dimension: usize,
    entries: DashMap<ChunkId, Entry>,
}

impl InMemoryVectorStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: DashMap::new(),
        }
    }

    /// Load from `path` if it exists, else start empty.
    pub async fn load_or_create(path: &Path, dimension: usize) -> Result<Self> {
        let store = Self::new(dimension);
        if path.exists() {
            store.load(path).await?;
        }
        Ok(store)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn validate_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(MizanError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        Ok(())
    }

    /// Write a snapshot of the store.
    ///
    /// The previous snapshot at `path` stays in place until the new one has
    /// been fully written.
    pub async fn save(&self, path: &Path) -> Result<()> {
        info!("Saving index to: {}", path.display());

        let mut entries: Vec<Entry> = self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| {
            a.chunk
                .document_id
                .cmp(&b.chunk.document_id)
                .then(a.chunk.sequence_index.cmp(&b.chunk.sequence_index))
        });

        let data = IndexData {
            dimension: self.dimension,
            entries,
        };
        let serialized = bincode::serde::encode_to_vec(&data, config::standard())
            .map_err(|e| MizanError::index(format!("Serialization failed: {}", e)))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, serialized).await?;
        fs::rename(&temp_path, path).await?;

        info!("Index saved successfully ({} chunks)", data.entries.len());
        Ok(())
    }

    /// Replace the contents with a snapshot.
    pub async fn load(&self, path: &Path) -> Result<()> {
        info!("Loading index from: {}", path.display());

        let bytes = fs::read(path).await?;
        let data: IndexData = bincode::serde::decode_from_slice(&bytes, config::standard())
            .map_err(|e| MizanError::index(format!("Deserialization failed: {}", e)))?
            .0;

        if data.dimension != self.dimension {
            return Err(MizanError::DimensionMismatch {
                expected: self.dimension,
                got: data.dimension,
            });
        }

        self.entries.clear();
        for entry in data.entries {
            self.entries.insert(entry.chunk.chunk_id, entry);
        }

        info!("Index loaded successfully: {} chunks", self.entries.len());
        Ok(())
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, chunk_id: ChunkId, vector: Vec<f32>, chunk: Chunk) -> Result<()> {
        self.validate_dimension(&vector)?;
        self.entries.insert(chunk_id, Entry { vector, chunk });
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorHit>> {
        self.validate_dimension(vector)?;

        let mut hits: Vec<VectorHit> = self
            .entries
            .iter()
            .filter(|e| filter.is_none_or(|f| f.matches(&e.value().chunk)))
            .map(|e| VectorHit {
                score: cosine_similarity(vector, &e.value().vector),
                chunk: e.value().chunk.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
        });
        hits.truncate(k);

        debug!("Vector query returned {} hits", hits.len());
        Ok(hits)
    }

    async fn remove_document(&self, document_id: DocumentId) -> Result<usize> {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.chunk.document_id != document_id);
        Ok(before - self.entries.len())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mizan_core::language::Language;
    use tempfile::TempDir;

    fn chunk(document_id: DocumentId, seq: usize, source: &str, language: Language) -> Chunk {
        Chunk {
            chunk_id: ChunkId::derive(document_id, seq),
            document_id,
            text: format!("chunk {}", seq),
            page_number: 1,
            total_pages: 1,
            language,
            source_label: source.to_string(),
            title: "Standards".to_string(),
            sequence_index: seq,
            start_offset: 0,
            end_offset: 7,
            extraction_degraded: false,
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_query_orders_by_similarity() {
        let store = InMemoryVectorStore::new(2);
        let doc = DocumentId::new();
        let a = chunk(doc, 0, "BNM", Language::English);
        let b = chunk(doc, 1, "BNM", Language::English);
        store.upsert(a.chunk_id, vec![1.0, 0.0], a.clone()).await.unwrap();
        store.upsert(b.chunk_id, vec![0.6, 0.8], b.clone()).await.unwrap();

        let hits = store.query(&[1.0, 0.1], 10, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.chunk_id, a.chunk_id);
        assert!(hits[0].score > hits[1].score);

        let hits = store.query(&[1.0, 0.1], 1, None).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_filter_and_remove() {
        let store = InMemoryVectorStore::new(2);
        let doc1 = DocumentId::new();
        let doc2 = DocumentId::new();
        let a = chunk(doc1, 0, "BNM", Language::English);
        let b = chunk(doc2, 0, "AAOIFI", Language::Arabic);
        store.upsert(a.chunk_id, vec![1.0, 0.0], a).await.unwrap();
        store.upsert(b.chunk_id, vec![1.0, 0.0], b).await.unwrap();

        let filter = MetadataFilter {
            source_label: Some("AAOIFI".to_string()),
            language: None,
        };
        let hits = store.query(&[1.0, 0.0], 10, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.document_id, doc2);

        assert_eq!(store.remove_document(doc1).await.unwrap(), 1);
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let store = InMemoryVectorStore::new(3);
        let doc = DocumentId::new();
        let c = chunk(doc, 0, "BNM", Language::English);
        let err = store.upsert(c.chunk_id, vec![1.0], c).await.unwrap_err();
        assert!(matches!(err, MizanError::DimensionMismatch { expected: 3, got: 1 }));
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("index.bin");

        let store = InMemoryVectorStore::new(2);
        let doc = DocumentId::new();
        for seq in 0..3 {
            let c = chunk(doc, seq, "IFSB", Language::Malay);
            store.upsert(c.chunk_id, vec![seq as f32, 1.0], c).await.unwrap();
        }
        store.save(&path).await.unwrap();
        assert!(!path.with_extension("tmp").exists());

        let restored = InMemoryVectorStore::load_or_create(&path, 2).await.unwrap();
        assert_eq!(restored.len().await.unwrap(), 3);
        let hits = restored.query(&[2.0, 1.0], 1, None).await.unwrap();
        assert_eq!(hits[0].chunk.sequence_index, 2);
        assert_eq!(hits[0].chunk.language, Language::Malay);

        assert!(InMemoryVectorStore::load_or_create(&path, 4).await.is_err());
    }

    #[tokio::test]
    async fn test_save_replaces_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.bin");
        std::fs::write(&path, b"stale snapshot").unwrap();
        std::fs::write(path.with_extension("tmp"), b"leftover from a crash").unwrap();

        let store = InMemoryVectorStore::new(2);
        let c = chunk(DocumentId::new(), 0, "BNM", Language::English);
        store.upsert(c.chunk_id, vec![1.0, 0.0], c).await.unwrap();
        store.save(&path).await.unwrap();

        assert!(!path.with_extension("tmp").exists());
        let restored = InMemoryVectorStore::load_or_create(&path, 2).await.unwrap();
        assert_eq!(restored.len().await.unwrap(), 1);
    }
}
