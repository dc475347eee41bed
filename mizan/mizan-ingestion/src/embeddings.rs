//! Batched embedding generation for chunks.
//!
//! Wraps an [`Embedder`] with batching, truncation and retry with exponential
//! backoff. Chunks can optionally be translated into the index language before
//! embedding; the stored chunk text is never changed.

use crate::normalize::prepare_for_embedding;
use mizan_core::error::{MizanError, Result};
use mizan_core::language::Language;
use mizan_core::traits::{Embedder, Translator, translate_or_keep};
use mizan_core::types::Chunk;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Batch size for batch processing
    pub batch_size: usize,
    /// Maximum text length in characters before truncation
    pub max_text_length: usize,
    /// Retries after the first failed attempt
    pub max_retries: u32,
    /// Base delay for exponential backoff
    pub base_delay: Duration,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            max_text_length: 8000,
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

/// Progress callback: (processed, total)
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Embedding service that manages embedding generation
pub struct EmbeddingService {
    provider: Arc<dyn Embedder>,
    config: EmbeddingConfig,
    progress_callback: Option<ProgressCallback>,
    translation: Option<(Arc<dyn Translator>, Language)>,
}

impl EmbeddingService {
    pub fn new(provider: Arc<dyn Embedder>, config: EmbeddingConfig) -> Self {
        Self {
            provider,
            config,
            progress_callback: None,
            translation: None,
        }
    }

    /// Create with default config
    pub fn with_provider(provider: Arc<dyn Embedder>) -> Self {
        Self::new(provider, EmbeddingConfig::default())
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Embed chunks not already in `index_language` from their translation.
    pub fn with_translation(
        mut self,
        translator: Arc<dyn Translator>,
        index_language: Language,
    ) -> Self {
        self.translation = Some((translator, index_language));
        self
    }

    fn truncate(&self, text: &str) -> String {
        match text.char_indices().nth(self.config.max_text_length) {
            Some((byte_idx, _)) => text[..byte_idx].to_string(),
            None => text.to_string(),
        }
    }

    /// Embed chunk texts, normalized for the embedding model.
    pub async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let mut texts = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let text = match &self.translation {
                Some((translator, target)) if chunk.language != *target => {
                    translate_or_keep(translator.as_ref(), &chunk.text, *target).await.0
                }
                _ => chunk.text.clone(),
            };
            texts.push(prepare_for_embedding(&text));
        }
        self.embed_batch(&texts).await
    }

    /// Generate embeddings in batches with retry logic
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut all_embeddings = Vec::with_capacity(texts.len());
        let total_texts = texts.len();
        let mut processed = 0;
        let batch_size = self.config.batch_size.max(1);

        for batch in texts.chunks(batch_size) {
            let truncated: Vec<String> = batch.iter().map(|t| self.truncate(t)).collect();

            let mut retries = 0;
            let batch_embeddings = loop {
                match self.provider.embed_batch(&truncated).await {
                    Ok(embeddings) => break embeddings,
                    Err(e) if retries < self.config.max_retries => {
                        retries += 1;
                        let delay = self.config.base_delay * 2u32.pow(retries);
                        warn!(
                            "Embedding batch failed (attempt {}/{}), retrying in {:?}: {}",
                            retries, self.config.max_retries, delay, e
                        );
                        tokio::time::sleep(delay).await;
                    }
                    Err(e) => return Err(e),
                }
            };

            if batch_embeddings.len() != truncated.len() {
                return Err(MizanError::embedding(format!(
                    "provider returned {} vectors for {} texts",
                    batch_embeddings.len(),
                    truncated.len()
                )));
            }

            let expected = self.provider.dimension();
            if let Some(bad) = batch_embeddings.iter().find(|v| v.len() != expected) {
                return Err(MizanError::DimensionMismatch {
                    expected,
                    got: bad.len(),
                });
            }

            all_embeddings.extend(batch_embeddings);
            processed += batch.len();
            debug!("Embedded {}/{} texts", processed, total_texts);

            if let Some(callback) = &self.progress_callback {
                callback(processed, total_texts);
            }
        }

        Ok(all_embeddings)
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }
}
