//! Query embedding cache.

use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Cache key for embeddings: the same text under a different model is a miss.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct EmbeddingCacheKey {
    text: String,
    model: String,
}

impl EmbeddingCacheKey {
    pub fn new(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: model.into(),
        }
    }
}

/// Bounded cache of query embeddings.
#[derive(Clone)]
pub struct EmbeddingCache {
    cache: Cache<EmbeddingCacheKey, Arc<Vec<f32>>>,
}

impl EmbeddingCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub async fn get(&self, key: &EmbeddingCacheKey) -> Option<Arc<Vec<f32>>> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: EmbeddingCacheKey, value: Vec<f32>) -> Arc<Vec<f32>> {
        let value = Arc::new(value);
        self.cache.insert(key, value.clone()).await;
        value
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}
