//! Retrieval and grounded answering for Mizan.
//!
//! This crate provides the query side of the system:
//! - Embedding providers (Ollama, OpenAI, offline feature hashing)
//! - An in-memory cosine vector index with bincode snapshots
//! - Query normalization: follow-up rewriting and translation to the index language
//! - Coarse retrieval with a query embedding cache
//! - Cross-encoder reranking with an absolute relevance threshold
//! - Grounded answer composition with an anti-hallucination gate
//!
//! # Example
//!
//! ```no_run
//! use mizan_core::config::MizanConfig;
//! use mizan_semantic::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> mizan_core::Result<()> {
//! let config = MizanConfig::default();
//! let embedder = create_embedder(&config.providers)?;
//! let store = Arc::new(InMemoryVectorStore::load_or_create(
//!     &config.snapshot_path(),
//!     embedder.dimension(),
//! ).await?);
//!
//! let orchestrator = QueryOrchestrator::from_config(&config, embedder, store)?;
//! let response = orchestrator.ask(QueryRequest::new("What is Murabaha?")).await?;
//! println!("{}", response.answer.text);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod composer;
pub mod generation;
pub mod index;
pub mod orchestration;
pub mod providers;
pub mod query;
pub mod ranking;
pub mod search;
pub mod translation;

pub use cache::{EmbeddingCache, EmbeddingCacheKey};
pub use composer::{AnswerComposer, ComposeOptions, DeclineReason};
pub use generation::{AnthropicGenerator, BackendPreference, GeneratorRegistry, OllamaGenerator};
pub use index::{InMemoryVectorStore, cosine_similarity};
pub use orchestration::{
    QueryOrchestrator, QueryRequest, QueryResponse, create_cross_encoder, create_translator,
};
pub use providers::{HashingEmbedder, OllamaEmbedder, OpenAIEmbedder, create_embedder};
pub use query::{NormalizedQuery, QueryNormalizer};
pub use ranking::{HttpCrossEncoder, Reranker, TermOverlapScorer};
pub use search::Retriever;
pub use translation::{HttpTranslator, PassthroughTranslator};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::composer::{AnswerComposer, ComposeOptions};
    pub use crate::generation::{BackendPreference, GeneratorRegistry};
    pub use crate::index::InMemoryVectorStore;
    pub use crate::orchestration::{QueryOrchestrator, QueryRequest, QueryResponse};
    pub use crate::providers::create_embedder;
    pub use crate::query::QueryNormalizer;
    pub use crate::ranking::Reranker;
    pub use crate::search::Retriever;
    pub use mizan_core::traits::{Embedder, VectorStore};
}
