//! Shared fakes for ingestion integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use mizan_core::error::{MizanError, Result};
use mizan_core::id::{ChunkId, DocumentId};
use mizan_core::traits::{Embedder, VectorStore};
use mizan_core::types::{
    Chunk, DocumentSource, ExtractionMethod, MetadataFilter, PageText, VectorHit,
};
use mizan_ingestion::extractor::ExtractionTier;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Text of `total` characters of which `garbled` are '#'.
pub fn text_with_garbled(total: usize, garbled: usize) -> String {
    let clean: String = "abcd ".chars().cycle().take(total - garbled).collect();
    format!("{}{}", clean, "#".repeat(garbled))
}

/// Tier returning fixed pages, or an error when `pages` is `None`.
pub struct FixedTier {
    pub method: ExtractionMethod,
    pub threshold: Option<f32>,
    pub pages: Option<Vec<String>>,
    pub calls: Arc<AtomicUsize>,
}

impl FixedTier {
    pub fn new(
        method: ExtractionMethod,
        threshold: Option<f32>,
        pages: Option<Vec<String>>,
    ) -> Self {
        Self {
            method,
            threshold,
            pages,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl ExtractionTier for FixedTier {
    fn method(&self) -> ExtractionMethod {
        self.method
    }

    fn threshold(&self) -> Option<f32> {
        self.threshold
    }

    async fn extract(&self, _source: &DocumentSource) -> Result<Vec<PageText>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.pages {
            Some(pages) => Ok(PageText::from_pages(pages.clone())),
            None => Err(MizanError::extraction("tier unavailable")),
        }
    }
}

/// Deterministic bag-of-bytes embedder.
pub struct TestEmbedder {
    pub dimension: usize,
    pub fail: bool,
}

impl TestEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fail: false,
        }
    }

    pub fn failing(dimension: usize) -> Self {
        Self {
            dimension,
            fail: true,
        }
    }
}

#[async_trait]
impl Embedder for TestEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.fail {
            return Err(MizanError::embedding("embedding service down"));
        }
        let mut vector = vec![0.0; self.dimension];
        for byte in text.bytes() {
            vector[byte as usize % self.dimension] += 1.0;
        }
        Ok(vector)
    }

    fn model_name(&self) -> &str {
        "test-embedder"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Minimal vector store keeping entries in insertion order.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<Vec<(ChunkId, Vec<f32>, Chunk)>>,
    locked: Mutex<Option<DocumentId>>,
}

impl MemoryStore {
    /// Make `remove_document` fail for one document.
    pub fn lock_document(&self, document_id: DocumentId) {
        *self.locked.lock() = Some(document_id);
    }

    pub fn chunks(&self) -> Vec<Chunk> {
        self.entries.lock().iter().map(|(_, _, c)| c.clone()).collect()
    }

    pub fn chunks_of(&self, document_id: DocumentId) -> Vec<Chunk> {
        self.chunks()
            .into_iter()
            .filter(|c| c.document_id == document_id)
            .collect()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn upsert(&self, chunk_id: ChunkId, vector: Vec<f32>, chunk: Chunk) -> Result<()> {
        let mut entries = self.entries.lock();
        entries.retain(|(id, _, _)| *id != chunk_id);
        entries.push((chunk_id, vector, chunk));
        Ok(())
    }

    async fn query(
        &self,
        _vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorHit>> {
        Ok(self
            .entries
            .lock()
            .iter()
            .filter(|(_, _, c)| filter.is_none_or(|f| f.matches(c)))
            .take(k)
            .map(|(_, _, c)| VectorHit {
                chunk: c.clone(),
                score: 1.0,
            })
            .collect())
    }

    async fn remove_document(&self, document_id: DocumentId) -> Result<usize> {
        if *self.locked.lock() == Some(document_id) {
            return Err(MizanError::index(format!("{} is locked", document_id)));
        }
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(_, _, c)| c.document_id != document_id);
        Ok(before - entries.len())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.lock().len())
    }
}

/// `count` short English sentences about Islamic finance.
pub fn sentences(count: usize, offset: usize) -> String {
    (0..count)
        .map(|i| {
            format!(
                "Rule {} states that the seller must disclose the cost of the asset. ",
                i + offset
            )
        })
        .collect()
}
