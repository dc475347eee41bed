use async_trait::async_trait;
use mizan_core::config::GenerationConfig;
use mizan_core::error::Result;
use mizan_core::id::{ChunkId, DocumentId};
use mizan_core::language::Language;
use mizan_core::traits::{CrossEncoder, Embedder, Generator, VectorStore};
use mizan_core::types::{
    Chunk, ConfidenceLabel, ConversationTurn, DocumentSource, GenerationOptions,
};
use mizan_ingestion::embeddings::EmbeddingService;
use mizan_ingestion::extractor::ExtractionCascade;
use mizan_ingestion::ingester::IngestionOrchestrator;
use mizan_ingestion::repository::InMemoryDocumentRepository;
use mizan_ingestion::tiers::DigitalTier;
use mizan_ingestion::SentenceChunker;
use mizan_semantic::composer::AnswerComposer;
use mizan_semantic::generation::{BackendPreference, GeneratorRegistry};
use mizan_semantic::index::InMemoryVectorStore;
use mizan_semantic::orchestration::{QueryOrchestrator, QueryRequest};
use mizan_semantic::providers::HashingEmbedder;
use mizan_semantic::query::QueryNormalizer;
use mizan_semantic::ranking::{Reranker, TermOverlapScorer};
use mizan_semantic::search::Retriever;
use mizan_semantic::translation::PassthroughTranslator;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

const DIMENSION: usize = 256;

struct CountingGenerator {
    reply: String,
    calls: AtomicUsize,
}

impl CountingGenerator {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for CountingGenerator {
    async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }

    fn name(&self) -> &str {
        "counting"
    }

    fn model(&self) -> &str {
        "test"
    }
}

/// Scores passages by exact text; unknown passages score zero.
struct FixedScores(HashMap<String, f32>);

#[async_trait]
impl CrossEncoder for FixedScores {
    async fn score(&self, _query: &str, passage: &str) -> Result<f32> {
        Ok(self.0.get(passage).copied().unwrap_or(0.0))
    }
}

fn orchestrator(
    store: Arc<dyn VectorStore>,
    encoder: Arc<dyn CrossEncoder>,
    generator: Arc<CountingGenerator>,
) -> QueryOrchestrator {
    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(DIMENSION));
    let registry = GeneratorRegistry::new(BackendPreference::Local)
        .register(BackendPreference::Local, generator);
    let translator = Arc::new(PassthroughTranslator);

    QueryOrchestrator::new(
        QueryNormalizer::new(translator.clone(), Language::English),
        Retriever::new(embedder, store),
        Reranker::new(encoder),
        AnswerComposer::new(Arc::new(registry), translator, &GenerationConfig::default()),
    )
}

async fn seed(store: &InMemoryVectorStore, passages: &[(&str, &str, u32)]) -> Vec<ChunkId> {
    let embedder = HashingEmbedder::new(DIMENSION);
    let mut ids = Vec::new();
    for (source, text, page) in passages {
        let document_id = DocumentId::new();
        let chunk = Chunk {
            chunk_id: ChunkId::derive(document_id, 0),
            document_id,
            text: text.to_string(),
            page_number: *page,
            total_pages: 40,
            language: Language::English,
            source_label: source.to_string(),
            title: "Shariah Standards".to_string(),
            sequence_index: 0,
            start_offset: 0,
            end_offset: text.chars().count(),
            extraction_degraded: false,
        };
        let vector = embedder.embed(text).await.unwrap();
        ids.push(chunk.chunk_id);
        store.upsert(chunk.chunk_id, vector, chunk).await.unwrap();
    }
    ids
}

const MURABAHA: &str = "Murabaha is a sale of goods at cost plus an agreed profit, \
                        where the cost is disclosed to the buyer.";
const UNRELATED: [&str; 4] = [
    "Zakat is due on gold held for a full lunar year.",
    "Takaful operators must keep participant funds segregated.",
    "Sukuk holders share in the returns of the underlying assets.",
    "Waqf property may not be sold or inherited.",
];

#[tokio::test]
async fn test_murabaha_question_cites_single_source() {
    let store = Arc::new(InMemoryVectorStore::new(DIMENSION));
    let mut passages = vec![("AAOIFI", MURABAHA, 7u32)];
    passages.extend(UNRELATED.iter().map(|t| ("BNM", *t, 2u32)));
    let ids = seed(&store, &passages).await;

    let mut scores: HashMap<String, f32> = HashMap::new();
    scores.insert(MURABAHA.to_string(), 0.95);
    for (i, text) in UNRELATED.iter().enumerate() {
        scores.insert(text.to_string(), 0.1 + i as f32 * 0.05);
    }

    let generator = CountingGenerator::new(
        "Based on [Source 1], Murabaha is a sale at cost plus an agreed profit \
         that is disclosed to the buyer.",
    );
    let orchestrator = orchestrator(store, Arc::new(FixedScores(scores)), generator.clone());

    let response = orchestrator.ask(QueryRequest::new("What is Murabaha?")).await.unwrap();

    assert_eq!(generator.calls(), 1);
    assert_eq!(response.candidates_retrieved, 5);
    assert_eq!(response.results_reranked, 1);
    let answer = response.answer;
    assert!(!answer.declined);
    assert_eq!(answer.citations.len(), 1);
    assert_eq!(answer.citations[0].chunk_id(), ids[0]);
    assert_eq!(answer.citations[0].page_number(), 7);
    assert_eq!(answer.citations[0].total_pages(), 40);
    assert_eq!(answer.response_language, Language::English);
    assert_eq!(answer.confidence, ConfidenceLabel::Medium);
}

#[tokio::test]
async fn test_low_relevance_declines_without_generation() {
    let store = Arc::new(InMemoryVectorStore::new(DIMENSION));
    seed(&store, &UNRELATED.iter().map(|t| ("BNM", *t, 1u32)).collect::<Vec<_>>()).await;

    let scores = UNRELATED.iter().map(|t| (t.to_string(), 0.59)).collect();
    let generator = CountingGenerator::new("unused");
    let orchestrator = orchestrator(store, Arc::new(FixedScores(scores)), generator.clone());

    let response = orchestrator.ask(QueryRequest::new("What is Murabaha?")).await.unwrap();

    assert_eq!(generator.calls(), 0);
    assert!(response.answer.declined);
    assert!(response.answer.citations.is_empty());
    assert_eq!(response.answer.confidence, ConfidenceLabel::Low);
}

#[tokio::test]
async fn test_response_language_override() {
    let store = Arc::new(InMemoryVectorStore::new(DIMENSION));
    seed(&store, &[("AAOIFI", MURABAHA, 3)]).await;
    let scores = [(MURABAHA.to_string(), 0.9)].into_iter().collect();
    let generator = CountingGenerator::new("unused");
    let orchestrator = orchestrator(store, Arc::new(FixedScores(scores)), generator.clone());

    let request = QueryRequest::new("What is the weather today?")
        .with_response_language(Language::Malay);
    let response = orchestrator.ask(request).await.unwrap();

    // Off-topic wording, but a strongly relevant result passes the scope gate
    assert_eq!(generator.calls(), 1);
    assert_eq!(response.answer.response_language, Language::Malay);
}

#[tokio::test]
async fn test_follow_up_question_is_rewritten() {
    let store = Arc::new(InMemoryVectorStore::new(DIMENSION));
    seed(&store, &[("AAOIFI", MURABAHA, 3)]).await;
    let generator = CountingGenerator::new(
        "Based on [Source 1], it is a permissible sale at cost plus profit.",
    );
    let orchestrator = orchestrator(store, Arc::new(TermOverlapScorer), generator.clone());

    let request = QueryRequest::new("Is it a sale?").with_history(vec![
        ConversationTurn::user("What is Murabaha?"),
        ConversationTurn::assistant("Murabaha is a cost-plus sale."),
    ]);
    let response = orchestrator.ask(request).await.unwrap();

    assert!(response.query.rewritten);
    assert_eq!(response.query.search_text, "Is it a sale? Murabaha");
    assert_eq!(generator.calls(), 1);
    assert_eq!(response.answer.citations.len(), 1);
}

#[tokio::test]
async fn test_ingested_snapshot_answers_after_reload() {
    let dir = TempDir::new().unwrap();
    let snapshot = dir.path().join("index.bin");
    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(DIMENSION));

    {
        let store = Arc::new(InMemoryVectorStore::new(DIMENSION));
        let ingestion = IngestionOrchestrator::new(
            ExtractionCascade::new(vec![Box::new(DigitalTier::new(0.7))]),
            SentenceChunker::default_config(),
            EmbeddingService::with_provider(embedder.clone()),
            store.clone(),
            Arc::new(InMemoryDocumentRepository::new()),
        );
        let sources = vec![
            DocumentSource::new("murabaha.txt", "AAOIFI", MURABAHA.as_bytes().to_vec()),
            DocumentSource::new("takaful.txt", "BNM", UNRELATED[1].repeat(2).into_bytes()),
        ];
        let report = ingestion.ingest_batch(sources, None).await.unwrap();
        assert_eq!(report.succeeded.len(), 2);
        store.save(&snapshot).await.unwrap();
    }

    let store = Arc::new(InMemoryVectorStore::load_or_create(&snapshot, DIMENSION).await.unwrap());
    assert_eq!(store.len().await.unwrap(), 2);

    let generator =
        CountingGenerator::new("Based on [Source 1], Murabaha is a cost plus profit sale.");
    let orchestrator = orchestrator(store, Arc::new(TermOverlapScorer), generator.clone());
    let response = orchestrator.ask(QueryRequest::new("What is Murabaha?")).await.unwrap();

    assert!(!response.answer.declined);
    assert_eq!(response.answer.citations.len(), 1);
    assert_eq!(response.answer.citations[0].source_label(), "AAOIFI");
    assert_eq!(response.answer.citations[0].chunk.title, "murabaha");
}
