//! Cross-encoder reranking of coarse candidates.

use async_trait::async_trait;
use mizan_core::error::{MizanError, Result};
use mizan_core::traits::CrossEncoder;
use mizan_core::types::{RankedResult, RetrievalCandidate};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use unicode_segmentation::UnicodeSegmentation;

/// Default size of the reranked set.
pub const DEFAULT_TOP_N: usize = 25;

/// Default minimum relevance for a candidate to survive reranking.
pub const DEFAULT_RELEVANCE_THRESHOLD: f32 = 0.6;

/// Rescores candidates against the query and keeps the most relevant.
pub struct Reranker {
    encoder: Arc<dyn CrossEncoder>,
    threshold: f32,
}

impl Reranker {
    pub fn new(encoder: Arc<dyn CrossEncoder>) -> Self {
        Self {
            encoder,
            threshold: DEFAULT_RELEVANCE_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Score every candidate, drop those under the threshold and return at
    /// most `top_n`, best first. Equal scores keep coarse order, then chunk id.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RetrievalCandidate>,
        top_n: usize,
    ) -> Result<Vec<RankedResult>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let passages: Vec<String> = candidates.iter().map(|c| c.chunk.text.clone()).collect();
        let scores = self.encoder.score_batch(query, &passages).await?;
        if scores.len() != candidates.len() {
            return Err(MizanError::rerank(format!(
                "cross-encoder returned {} scores for {} passages",
                scores.len(),
                candidates.len()
            )));
        }

        let total = candidates.len();
        let mut results: Vec<RankedResult> = candidates
            .into_iter()
            .zip(scores)
            .filter(|(_, score)| *score >= self.threshold)
            .map(|(candidate, score)| RankedResult {
                chunk: candidate.chunk,
                rerank_score: score,
                coarse_score: candidate.coarse_score,
                coarse_rank: candidate.coarse_rank,
            })
            .collect();

        results.sort_by(compare_ranked);
        results.truncate(top_n);

        info!(
            "Reranked {} candidates: {} above threshold {:.2}",
            total,
            results.len(),
            self.threshold
        );
        Ok(results)
    }
}

fn compare_ranked(a: &RankedResult, b: &RankedResult) -> Ordering {
    b.rerank_score
        .total_cmp(&a.rerank_score)
        .then_with(|| a.coarse_rank.cmp(&b.coarse_rank))
        .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
}

/// Cross-encoder served over a `/rerank` HTTP API.
///
/// Request: `{"query", "documents", "model"?}`; response:
/// `{"results": [{"index", "relevance_score"}]}`. Scores outside [0, 1] are
/// treated as logits.
pub struct HttpCrossEncoder {
    client: Client,
    url: String,
    model: Option<String>,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    documents: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankScore>,
}

#[derive(Deserialize)]
struct RerankScore {
    index: usize,
    relevance_score: f32,
}

impl HttpCrossEncoder {
    pub fn new(url: impl Into<String>, model: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MizanError::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
            model,
        })
    }

    fn normalize_score(score: f32) -> f32 {
        if (0.0..=1.0).contains(&score) {
            score
        } else {
            1.0 / (1.0 + (-score).exp())
        }
    }
}

#[async_trait]
impl CrossEncoder for HttpCrossEncoder {
    async fn score(&self, query: &str, passage: &str) -> Result<f32> {
        self.score_batch(query, &[passage.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| MizanError::rerank("empty rerank response"))
    }

    async fn score_batch(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }
        debug!("Scoring {} passages with {}", passages.len(), self.url);

        let request = RerankRequest {
            query,
            documents: passages,
            model: self.model.as_deref(),
        };
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| MizanError::rerank(format!("Rerank request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(MizanError::rerank(format!(
                "Rerank API error {}: {}",
                status, error_text
            )));
        }

        let response: RerankResponse = response
            .json()
            .await
            .map_err(|e| MizanError::rerank(format!("Invalid rerank response: {}", e)))?;

        let mut scores = vec![0.0f32; passages.len()];
        for result in response.results {
            match scores.get_mut(result.index) {
                Some(slot) => *slot = Self::normalize_score(result.relevance_score),
                None => warn!("Rerank result index {} out of range", result.index),
            }
        }
        Ok(scores)
    }
}

/// Offline scorer: fraction of query terms present in the passage.
#[derive(Debug, Default, Clone, Copy)]
pub struct TermOverlapScorer;

impl TermOverlapScorer {
    fn terms(text: &str) -> HashSet<String> {
        text.unicode_words().map(|w| w.to_lowercase()).collect()
    }
}

#[async_trait]
impl CrossEncoder for TermOverlapScorer {
    async fn score(&self, query: &str, passage: &str) -> Result<f32> {
        let query_terms = Self::terms(query);
        if query_terms.is_empty() {
            return Ok(0.0);
        }
        let passage_terms = Self::terms(passage);
        let overlap = query_terms.intersection(&passage_terms).count();
        Ok(overlap as f32 / query_terms.len() as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mizan_core::id::{ChunkId, DocumentId};
    use mizan_core::language::Language;
    use mizan_core::types::Chunk;
    use std::collections::HashMap;

    struct FixedScores(HashMap<String, f32>);

    #[async_trait]
    impl CrossEncoder for FixedScores {
        async fn score(&self, _query: &str, passage: &str) -> Result<f32> {
            Ok(self.0.get(passage).copied().unwrap_or(0.0))
        }
    }

    fn candidate(doc: DocumentId, rank: usize, text: &str) -> RetrievalCandidate {
        RetrievalCandidate {
            chunk: Chunk {
                chunk_id: ChunkId::derive(doc, rank),
                document_id: doc,
                text: text.to_string(),
                page_number: 1,
                total_pages: 1,
                language: Language::English,
                source_label: "BNM".to_string(),
                title: "Policy".to_string(),
                sequence_index: rank,
                start_offset: 0,
                end_offset: text.len(),
                extraction_degraded: false,
            },
            coarse_score: 1.0 - rank as f32 * 0.1,
            coarse_rank: rank,
        }
    }

    fn encoder(scores: &[(&str, f32)]) -> Arc<dyn CrossEncoder> {
        Arc::new(FixedScores(
            scores.iter().map(|(t, s)| (t.to_string(), *s)).collect(),
        ))
    }

    #[tokio::test]
    async fn test_orders_by_rerank_score() {
        let doc = DocumentId::new();
        let candidates = vec![
            candidate(doc, 0, "A"),
            candidate(doc, 1, "B"),
            candidate(doc, 2, "C"),
        ];
        let reranker = Reranker::new(encoder(&[("A", 0.9), ("B", 0.5), ("C", 0.7)]));

        let results = reranker.rerank("q", candidates, 25).await.unwrap();
        let texts: Vec<&str> = results.iter().map(|r| r.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["A", "C"]);

        let doc = DocumentId::new();
        let candidates = vec![
            candidate(doc, 0, "A"),
            candidate(doc, 1, "B"),
            candidate(doc, 2, "C"),
        ];
        let reranker =
            Reranker::new(encoder(&[("A", 0.9), ("B", 0.5), ("C", 0.7)])).with_threshold(0.0);
        let results = reranker.rerank("q", candidates, 25).await.unwrap();
        let texts: Vec<&str> = results.iter().map(|r| r.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["A", "C", "B"]);
    }

    #[tokio::test]
    async fn test_ties_keep_coarse_order() {
        let doc = DocumentId::new();
        let candidates = vec![
            candidate(doc, 0, "first"),
            candidate(doc, 1, "second"),
            candidate(doc, 2, "third"),
        ];
        let reranker = Reranker::new(encoder(&[("first", 0.8), ("second", 0.8), ("third", 0.95)]));

        let results = reranker.rerank("q", candidates, 25).await.unwrap();
        let texts: Vec<&str> = results.iter().map(|r| r.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["third", "first", "second"]);
        assert_eq!(results[1].coarse_rank, 0);
    }

    #[tokio::test]
    async fn test_truncates_to_top_n() {
        let doc = DocumentId::new();
        let candidates: Vec<_> = (0..5).map(|i| candidate(doc, i, "same")).collect();
        let reranker = Reranker::new(encoder(&[("same", 0.7)]));

        let results = reranker.rerank("q", candidates, 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].coarse_rank, 0);
        assert_eq!(results[1].coarse_rank, 1);
    }

    #[tokio::test]
    async fn test_empty_candidates() {
        let reranker = Reranker::new(Arc::new(TermOverlapScorer));
        assert!(reranker.rerank("q", Vec::new(), 25).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_term_overlap_scorer() {
        let scorer = TermOverlapScorer;
        let score = scorer
            .score("What is Murabaha", "Murabaha is a sale at cost plus profit")
            .await
            .unwrap();
        assert!((score - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(scorer.score("", "anything").await.unwrap(), 0.0);
    }

    #[test]
    fn test_logit_scores_are_squashed() {
        assert_eq!(HttpCrossEncoder::normalize_score(0.4), 0.4);
        assert!((HttpCrossEncoder::normalize_score(0.0) - 0.0).abs() < 1e-6);
        let squashed = HttpCrossEncoder::normalize_score(5.0);
        assert!(squashed > 0.99 && squashed < 1.0);
        assert!(HttpCrossEncoder::normalize_score(-5.0) < 0.01);
    }
}
