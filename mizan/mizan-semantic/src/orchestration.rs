//! End-to-end question answering over the chunk index.

use crate::cache::EmbeddingCache;
use crate::composer::{AnswerComposer, ComposeOptions};
use crate::generation::{BackendPreference, GeneratorRegistry};
use crate::query::{NormalizedQuery, QueryNormalizer};
use crate::ranking::{DEFAULT_TOP_N, HttpCrossEncoder, Reranker, TermOverlapScorer};
use crate::search::{DEFAULT_TOP_K, Retriever};
use crate::translation::{HttpTranslator, PassthroughTranslator};
use mizan_core::config::{MizanConfig, ProvidersConfig};
use mizan_core::error::Result;
use mizan_core::language::Language;
use mizan_core::traits::{CrossEncoder, Embedder, Translator, VectorStore};
use mizan_core::types::{Answer, ConversationTurn, MetadataFilter};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument};

/// One question with its per-request options.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub question: String,
    /// Prior turns, oldest first
    pub history: Vec<ConversationTurn>,
    pub response_language: Option<Language>,
    pub backend: Option<BackendPreference>,
    pub filter: MetadataFilter,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    pub fn with_history(mut self, history: Vec<ConversationTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_response_language(mut self, language: Language) -> Self {
        self.response_language = Some(language);
        self
    }

    pub fn with_backend(mut self, backend: BackendPreference) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// Answer plus what the pipeline did to produce it.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub answer: Answer,
    pub query: NormalizedQuery,
    pub candidates_retrieved: usize,
    pub results_reranked: usize,
    pub duration_ms: u64,
}

/// Normalize, retrieve, rerank and compose.
pub struct QueryOrchestrator {
    normalizer: QueryNormalizer,
    retriever: Retriever,
    reranker: Reranker,
    composer: AnswerComposer,
    top_k: usize,
    top_n: usize,
}

impl QueryOrchestrator {
    pub fn new(
        normalizer: QueryNormalizer,
        retriever: Retriever,
        reranker: Reranker,
        composer: AnswerComposer,
    ) -> Self {
        Self {
            normalizer,
            retriever,
            reranker,
            composer,
            top_k: DEFAULT_TOP_K,
            top_n: DEFAULT_TOP_N,
        }
    }

    pub fn with_limits(mut self, top_k: usize, top_n: usize) -> Self {
        self.top_k = top_k;
        self.top_n = top_n;
        self
    }

    /// Wire the pipeline from configuration around an embedder and index.
    pub fn from_config(
        config: &MizanConfig,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        let translator = create_translator(&config.providers)?;
        let encoder = create_cross_encoder(&config.providers)?;
        let generators = Arc::new(GeneratorRegistry::from_config(config)?);
        let retrieval = &config.retrieval;

        let cache = EmbeddingCache::new(retrieval.query_cache_size, Duration::from_secs(3600));
        Ok(Self::new(
            QueryNormalizer::new(translator.clone(), retrieval.index_language),
            Retriever::new(embedder, store).with_cache(cache),
            Reranker::new(encoder).with_threshold(retrieval.relevance_threshold),
            AnswerComposer::new(generators, translator, &config.generation),
        )
        .with_limits(retrieval.top_k, retrieval.rerank_top_n))
    }

    #[instrument(skip(self, request), fields(question_chars = request.question.chars().count()))]
    pub async fn ask(&self, request: QueryRequest) -> Result<QueryResponse> {
        let started = Instant::now();

        let query = self.normalizer.normalize(&request.question, &request.history).await;
        let filter = (!request.filter.is_empty()).then_some(&request.filter);

        let candidates = self
            .retriever
            .retrieve(&query.search_text, self.top_k, filter)
            .await?;
        let candidates_retrieved = candidates.len();

        // Rerank against the question in its own language
        let results = self
            .reranker
            .rerank(&query.rewritten_text, candidates, self.top_n)
            .await?;
        let results_reranked = results.len();

        let options = ComposeOptions {
            response_language: request.response_language,
            backend: request.backend,
        };
        let answer = self
            .composer
            .compose(&query.rewritten_text, results, query.query_language, &options)
            .await?;

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "Answered in {}ms ({} candidates, {} reranked, {} cited, confidence {}, declined {})",
            duration_ms,
            candidates_retrieved,
            results_reranked,
            answer.citations.len(),
            answer.confidence,
            answer.declined
        );

        Ok(QueryResponse {
            answer,
            query,
            candidates_retrieved,
            results_reranked,
            duration_ms,
        })
    }
}

/// HTTP translator when an endpoint is configured, else passthrough.
pub fn create_translator(config: &ProvidersConfig) -> Result<Arc<dyn Translator>> {
    let translator: Arc<dyn Translator> = match &config.translator_url {
        Some(url) => Arc::new(HttpTranslator::new(
            url.clone(),
            config.translator_api_key.clone(),
            Duration::from_secs(config.http_timeout_secs),
        )?),
        None => Arc::new(PassthroughTranslator),
    };
    Ok(translator)
}

/// HTTP cross-encoder when an endpoint is configured, else term overlap.
pub fn create_cross_encoder(config: &ProvidersConfig) -> Result<Arc<dyn CrossEncoder>> {
    let encoder: Arc<dyn CrossEncoder> = match &config.rerank_url {
        Some(url) => Arc::new(HttpCrossEncoder::new(
            url.clone(),
            None,
            Duration::from_secs(config.http_timeout_secs),
        )?),
        None => Arc::new(TermOverlapScorer),
    };
    Ok(encoder)
}
