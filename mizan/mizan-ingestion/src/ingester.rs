//! Ingestion orchestration: extraction, chunking, embedding and indexing.

use crate::chunker::{ChunkContext, SentenceChunker};
use crate::embeddings::{EmbeddingService, ProgressCallback};
use crate::extractor::ExtractionCascade;
use crate::job::{IngestionCoordinator, JobState};
use chrono::Utc;
use mizan_core::error::{MizanError, Result};
use mizan_core::id::DocumentId;
use mizan_core::traits::{DocumentRepository, VectorStore};
use mizan_core::types::{Document, DocumentSource, DocumentStatus, ExtractionMethod, PageText};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Pipeline stage of a single document's ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extraction,
    Chunking,
    Embedding,
    Indexing,
    Supersede,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    /// Completed, but with a result below the acceptance threshold
    Degraded,
    Failed,
}

/// Outcome of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageOutcome {
    pub stage: Stage,
    pub status: StageStatus,
    pub duration_ms: u64,
    pub detail: Option<String>,
}

impl StageOutcome {
    fn new(stage: Stage, status: StageStatus, started: Instant, detail: Option<String>) -> Self {
        Self {
            stage,
            status,
            duration_ms: started.elapsed().as_millis() as u64,
            detail,
        }
    }
}

/// Report for one ingested document.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    pub document: Document,
    pub method: ExtractionMethod,
    pub quality: f32,
    pub degraded: bool,
    pub page_count: usize,
    pub chunk_count: usize,
    pub stages: Vec<StageOutcome>,
    pub duration_ms: u64,
}

/// A document that failed inside a batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub file_name: String,
    pub error: String,
}

/// Report for a batch run under the coordinator.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub succeeded: Vec<IngestionReport>,
    pub failed: Vec<BatchFailure>,
    /// File names not processed because the batch was cancelled
    pub skipped: Vec<String>,
    pub final_state: JobState,
}

/// Runs documents through extraction, chunking, embedding and indexing.
pub struct IngestionOrchestrator {
    cascade: ExtractionCascade,
    chunker: SentenceChunker,
    embeddings: EmbeddingService,
    store: Arc<dyn VectorStore>,
    repository: Arc<dyn DocumentRepository>,
    coordinator: IngestionCoordinator,
}

impl IngestionOrchestrator {
    pub fn new(
        cascade: ExtractionCascade,
        chunker: SentenceChunker,
        embeddings: EmbeddingService,
        store: Arc<dyn VectorStore>,
        repository: Arc<dyn DocumentRepository>,
    ) -> Self {
        Self {
            cascade,
            chunker,
            embeddings,
            store,
            repository,
            coordinator: IngestionCoordinator::new(),
        }
    }

    /// Share an existing coordinator, e.g. with a status endpoint.
    pub fn with_coordinator(mut self, coordinator: IngestionCoordinator) -> Self {
        self.coordinator = coordinator;
        self
    }

    pub fn coordinator(&self) -> &IngestionCoordinator {
        &self.coordinator
    }

    /// Calculate content hash
    fn hash_content(content: &[u8]) -> String {
        blake3::hash(content).to_hex().to_string()
    }

    /// Ingest one document.
    ///
    /// The document record is created once extraction has succeeded; later
    /// stage failures mark it failed and remove any chunks already written.
    /// A previous generation of the same file is marked superseded only after
    /// its chunks have left the index.
    #[instrument(
        skip(self, source),
        fields(file = %source.file_name, source_label = %source.source_label)
    )]
    pub async fn ingest_document(&self, source: &DocumentSource) -> Result<IngestionReport> {
        let started = Instant::now();
        let mut stages = Vec::new();

        let previous = self
            .repository
            .find_current(&source.source_label, &source.file_name)
            .await?;

        // Extraction
        let stage_start = Instant::now();
        let outcome = self.cascade.extract(source).await?;
        let extraction_status = if outcome.degraded {
            StageStatus::Degraded
        } else {
            StageStatus::Succeeded
        };
        stages.push(StageOutcome::new(
            Stage::Extraction,
            extraction_status,
            stage_start,
            Some(format!("{} quality {:.2}", outcome.method, outcome.quality)),
        ));

        let document = Document {
            id: DocumentId::new(),
            source_label: source.source_label.clone(),
            file_name: source.file_name.clone(),
            title: source.display_title(),
            content_hash: Self::hash_content(&source.bytes),
            size_bytes: source.bytes.len() as u64,
            language: outcome.language,
            extraction_method: outcome.method,
            extraction_quality: outcome.quality,
            extraction_degraded: outcome.degraded,
            supersedes: previous.as_ref().map(|d| d.id),
            created_at: Utc::now(),
        };
        self.repository.create(&document).await?;
        self.repository
            .update_status(document.id, DocumentStatus::Processing)
            .await?;

        let chunk_count = match self.index_document(&document, &outcome.pages, &mut stages).await {
            Ok(chunk_count) => chunk_count,
            Err(e) => return Err(self.abandon(&document, e).await),
        };

        if let Err(e) = self
            .repository
            .update_status(document.id, DocumentStatus::Indexed)
            .await
        {
            return Err(self.abandon(&document, e).await);
        }

        // The previous generation stays current until its chunks are gone
        if let Some(previous) = &previous {
            let stage_start = Instant::now();
            match self.store.remove_document(previous.id).await {
                Ok(removed) => {
                    info!("Superseded document {} ({} chunks removed)", previous.id, removed);
                    stages.push(StageOutcome::new(
                        Stage::Supersede,
                        StageStatus::Succeeded,
                        stage_start,
                        Some(format!("replaced {}", previous.id)),
                    ));
                    if let Err(e) = self
                        .repository
                        .update_status(previous.id, DocumentStatus::Superseded)
                        .await
                    {
                        warn!("Failed to mark {} superseded: {}", previous.id, e);
                    }
                }
                Err(e) => {
                    stages.push(StageOutcome::new(
                        Stage::Supersede,
                        StageStatus::Failed,
                        stage_start,
                        Some(e.to_string()),
                    ));
                    return Err(self.abandon(&document, e).await);
                }
            }
        }

        info!(
            "Indexed {} ({} pages, {} chunks, {} extraction)",
            document.file_name,
            outcome.pages.len(),
            chunk_count,
            outcome.method
        );

        Ok(IngestionReport {
            method: outcome.method,
            quality: outcome.quality,
            degraded: outcome.degraded,
            page_count: outcome.pages.len(),
            chunk_count,
            stages,
            duration_ms: started.elapsed().as_millis() as u64,
            document,
        })
    }

    /// Drop a half-ingested document: remove its chunks and mark it failed.
    /// Cleanup errors are logged; the original error is returned.
    async fn abandon(&self, document: &Document, error: MizanError) -> MizanError {
        warn!("Ingestion of {} failed: {}", document.file_name, error);
        if let Err(cleanup) = self.store.remove_document(document.id).await {
            warn!("Failed to remove partial chunks of {}: {}", document.id, cleanup);
        }
        if let Err(status) = self
            .repository
            .update_status(document.id, DocumentStatus::Failed)
            .await
        {
            warn!("Failed to mark {} failed: {}", document.id, status);
        }
        error
    }

    async fn index_document(
        &self,
        document: &Document,
        pages: &[PageText],
        stages: &mut Vec<StageOutcome>,
    ) -> Result<usize> {
        // Chunking
        let stage_start = Instant::now();
        let context = ChunkContext {
            document_id: document.id,
            source_label: document.source_label.clone(),
            title: document.title.clone(),
            extraction_degraded: document.extraction_degraded,
        };
        let chunks = self.chunker.chunk(pages, &context);
        stages.push(StageOutcome::new(
            Stage::Chunking,
            StageStatus::Succeeded,
            stage_start,
            Some(format!("{} chunks", chunks.len())),
        ));

        if chunks.is_empty() {
            warn!("{} produced no text to index", document.file_name);
            return Ok(0);
        }

        // Embedding
        let stage_start = Instant::now();
        let vectors = match self.embeddings.embed_chunks(&chunks).await {
            Ok(vectors) => vectors,
            Err(e) => {
                stages.push(StageOutcome::new(
                    Stage::Embedding,
                    StageStatus::Failed,
                    stage_start,
                    Some(e.to_string()),
                ));
                return Err(e);
            }
        };
        stages.push(StageOutcome::new(
            Stage::Embedding,
            StageStatus::Succeeded,
            stage_start,
            Some(self.embeddings.model_name().to_string()),
        ));

        // Indexing
        let stage_start = Instant::now();
        let chunk_count = chunks.len();
        for (chunk, vector) in chunks.into_iter().zip(vectors) {
            debug!("Writing chunk {} ({})", chunk.sequence_index, chunk.chunk_id);
            if let Err(e) = self.store.upsert(chunk.chunk_id, vector, chunk).await {
                stages.push(StageOutcome::new(
                    Stage::Indexing,
                    StageStatus::Failed,
                    stage_start,
                    Some(e.to_string()),
                ));
                return Err(e);
            }
        }
        stages.push(StageOutcome::new(
            Stage::Indexing,
            StageStatus::Succeeded,
            stage_start,
            None,
        ));

        Ok(chunk_count)
    }

    /// Ingest a batch under the coordinator.
    ///
    /// A failing document is recorded and the batch continues. Cancellation
    /// is observed between documents; chunks already written are kept.
    #[instrument(skip(self, sources, progress), fields(documents = sources.len()))]
    pub async fn ingest_batch(
        &self,
        sources: Vec<DocumentSource>,
        progress: Option<ProgressCallback>,
    ) -> Result<BatchReport> {
        let guard = self.coordinator.try_start(sources.len())?;
        let total = sources.len();

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        let mut skipped = Vec::new();

        for (i, source) in sources.iter().enumerate() {
            if guard.is_cancelled() {
                skipped.extend(sources[i..].iter().map(|s| s.file_name.clone()));
                break;
            }

            match self.ingest_document(source).await {
                Ok(report) => succeeded.push(report),
                Err(e) => {
                    warn!("Document {} failed: {}", source.file_name, e);
                    failed.push(BatchFailure {
                        file_name: source.file_name.clone(),
                        error: e.to_string(),
                    });
                }
            }

            let done = i + 1;
            guard.set_progress(done as f32 / total as f32);
            if let Some(callback) = &progress {
                callback(done, total);
            }
        }

        let final_state = if guard.is_cancelled() && !skipped.is_empty() {
            guard.cancelled();
            JobState::Cancelled
        } else if succeeded.is_empty() && !failed.is_empty() {
            guard.fail(format!("all {} documents failed", failed.len()));
            JobState::Failed
        } else {
            guard.complete(Some(format!(
                "{} succeeded, {} failed",
                succeeded.len(),
                failed.len()
            )));
            JobState::Completed
        };

        info!(
            "Batch finished: {} succeeded, {} failed, {} skipped",
            succeeded.len(),
            failed.len(),
            skipped.len()
        );

        Ok(BatchReport {
            succeeded,
            failed,
            skipped,
            final_state,
        })
    }
}
