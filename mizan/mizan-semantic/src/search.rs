//! Coarse retrieval over the chunk index.

use crate::cache::{EmbeddingCache, EmbeddingCacheKey};
use mizan_core::error::{MizanError, Result};
use mizan_core::traits::{Embedder, VectorStore};
use mizan_core::types::{MetadataFilter, RetrievalCandidate};
use mizan_ingestion::normalize::prepare_for_embedding;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Default number of coarse candidates.
pub const DEFAULT_TOP_K: usize = 60;

const DEFAULT_CACHE_CAPACITY: u64 = 1000;
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Embeds a query and runs a wide similarity search.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    cache: EmbeddingCache,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            embedder,
            store,
            cache: EmbeddingCache::new(DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL),
        }
    }

    pub fn with_cache(mut self, cache: EmbeddingCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    async fn embed_query(&self, text: &str) -> Result<Arc<Vec<f32>>> {
        let prepared = prepare_for_embedding(text);
        let key = EmbeddingCacheKey::new(prepared.as_str(), self.embedder.model_name());
        if let Some(vector) = self.cache.get(&key).await {
            debug!("Query embedding cache hit");
            return Ok(vector);
        }

        let vector = self.embedder.embed(&prepared).await?;
        if vector.len() != self.embedder.dimension() {
            return Err(MizanError::DimensionMismatch {
                expected: self.embedder.dimension(),
                got: vector.len(),
            });
        }
        Ok(self.cache.insert(key, vector).await)
    }

    /// Up to `k` candidates, best first.
    pub async fn retrieve(
        &self,
        search_text: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalCandidate>> {
        if search_text.trim().is_empty() {
            return Err(MizanError::invalid_input("empty query"));
        }

        let vector = self.embed_query(search_text).await?;
        let filter = filter.filter(|f| !f.is_empty());
        let hits = self.store.query(&vector, k, filter).await?;

        let candidates: Vec<RetrievalCandidate> = hits
            .into_iter()
            .take(k)
            .enumerate()
            .map(|(rank, hit)| RetrievalCandidate {
                chunk: hit.chunk,
                coarse_score: hit.score,
                coarse_rank: rank,
            })
            .collect();

        info!("Retrieved {} candidates (k = {})", candidates.len(), k);
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InMemoryVectorStore;
    use crate::providers::HashingEmbedder;
    use async_trait::async_trait;
    use mizan_core::id::{ChunkId, DocumentId};
    use mizan_core::language::Language;
    use mizan_core::types::Chunk;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        inner: HashingEmbedder,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed(text).await
        }

        fn model_name(&self) -> &str {
            "counting"
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
    }

    async fn seeded_store(
        embedder: &dyn Embedder,
        texts: &[(&str, &str)],
    ) -> Arc<InMemoryVectorStore> {
        let store = Arc::new(InMemoryVectorStore::new(embedder.dimension()));
        let doc = DocumentId::new();
        for (seq, (source, text)) in texts.iter().enumerate() {
            let chunk = Chunk {
                chunk_id: ChunkId::derive(doc, seq),
                document_id: doc,
                text: text.to_string(),
                page_number: 1,
                total_pages: 1,
                language: Language::English,
                source_label: source.to_string(),
                title: "Standards".to_string(),
                sequence_index: seq,
                start_offset: 0,
                end_offset: text.chars().count(),
                extraction_degraded: false,
            };
            let vector = embedder.embed(text).await.unwrap();
            store.upsert(chunk.chunk_id, vector, chunk).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_candidates_are_ranked() {
        let embedder = Arc::new(CountingEmbedder {
            inner: HashingEmbedder::new(256),
            calls: AtomicUsize::new(0),
        });
        let store = seeded_store(
            embedder.as_ref(),
            &[
                ("BNM", "zakat on gold jewellery"),
                ("AAOIFI", "murabaha is a cost plus sale"),
                ("IFSB", "capital adequacy for takaful operators"),
            ],
        )
        .await;
        let retriever = Retriever::new(embedder.clone(), store);

        let candidates = retriever.retrieve("murabaha sale", 2, None).await.unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].chunk.source_label, "AAOIFI");
        assert_eq!(candidates[0].coarse_rank, 0);
        assert_eq!(candidates[1].coarse_rank, 1);
        assert!(candidates[0].coarse_score >= candidates[1].coarse_score);
    }

    #[tokio::test]
    async fn test_query_embedding_is_cached() {
        let embedder = Arc::new(CountingEmbedder {
            inner: HashingEmbedder::new(64),
            calls: AtomicUsize::new(0),
        });
        let store = seeded_store(embedder.as_ref(), &[("BNM", "tawarruq")]).await;
        let before = embedder.calls.load(Ordering::SeqCst);
        let retriever = Retriever::new(embedder.clone(), store);

        retriever.retrieve("what is tawarruq", 5, None).await.unwrap();
        retriever.retrieve("what is tawarruq", 5, None).await.unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst) - before, 1);
    }

    #[tokio::test]
    async fn test_filter_by_source() {
        let embedder = Arc::new(HashingEmbedder::new(64));
        let store = seeded_store(
            embedder.as_ref(),
            &[("BNM", "murabaha policy document"), ("AAOIFI", "murabaha standard")],
        )
        .await;
        let retriever = Retriever::new(embedder, store);
        let filter = MetadataFilter {
            source_label: Some("BNM".to_string()),
            language: None,
        };

        let candidates = retriever.retrieve("murabaha", 10, Some(&filter)).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].chunk.source_label, "BNM");
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let embedder = Arc::new(HashingEmbedder::new(8));
        let store = Arc::new(InMemoryVectorStore::new(8));
        let retriever = Retriever::new(embedder, store);
        assert!(retriever.retrieve("   ", 10, None).await.is_err());
    }
}
