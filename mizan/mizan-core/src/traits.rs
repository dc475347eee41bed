//! Core traits defining the external collaborators of the pipelines.

use crate::error::Result;
use crate::id::{ChunkId, DocumentId};
use crate::language::Language;
use crate::types::*;
use async_trait::async_trait;
use tracing::warn;

/// Text embedding model. The same instance serves ingestion and queries.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed multiple texts, preserving order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    /// Model identifier
    fn model_name(&self) -> &str;

    /// Output vector dimension
    fn dimension(&self) -> usize;
}

/// Approximate-nearest-neighbour index over chunk vectors.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace the vector for a chunk
    async fn upsert(&self, chunk_id: ChunkId, vector: Vec<f32>, chunk: Chunk) -> Result<()>;

    /// Top-k chunks by similarity, best first
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorHit>>;

    /// Remove every chunk of a document; returns how many were removed
    async fn remove_document(&self, document_id: DocumentId) -> Result<usize>;

    /// Number of indexed chunks
    async fn len(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Cross-encoder relevance scoring of `(query, passage)` pairs.
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    /// Relevance in [0, 1]
    async fn score(&self, query: &str, passage: &str) -> Result<f32>;

    /// Score several passages against one query, preserving order
    async fn score_batch(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        let mut scores = Vec::with_capacity(passages.len());
        for passage in passages {
            scores.push(self.score(query, passage).await?);
        }
        Ok(scores)
    }
}

/// Text generation backend.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String>;

    /// Backend name, e.g. "ollama"
    fn name(&self) -> &str;

    /// Model served by the backend
    fn model(&self) -> &str;
}

/// Machine translation. Callers treat failures as non-fatal.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target: Language) -> Result<String>;
}

/// Translate, or keep the original text when translation fails.
///
/// Returns the text and whether translation succeeded.
pub async fn translate_or_keep(
    translator: &dyn Translator,
    text: &str,
    target: Language,
) -> (String, bool) {
    match translator.translate(text, target).await {
        Ok(translated) => (translated, true),
        Err(e) => {
            warn!("Translation to {} failed, keeping original text: {}", target, e);
            (text.to_string(), false)
        }
    }
}

/// Persistence for document records.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn create(&self, document: &Document) -> Result<()>;

    async fn update_status(&self, id: DocumentId, status: DocumentStatus) -> Result<()>;

    async fn get(&self, id: DocumentId) -> Result<Option<Document>>;

    async fn status(&self, id: DocumentId) -> Result<Option<DocumentStatus>>;

    /// Latest indexed document for a source label and file name
    async fn find_current(&self, source_label: &str, file_name: &str) -> Result<Option<Document>>;
}
