//! Document ingestion for Mizan.
//!
//! This crate turns raw source documents into indexed chunks:
//! - Cascaded text extraction (digital text layer, local OCR, remote OCR)
//!   with quality scoring
//! - Page-aware, sentence-bounded chunking with overlap
//! - Arabic and OCR text normalization
//! - Batched embedding with retry
//! - Single-slot batch coordination with cancellation

pub mod chunker;
pub mod embeddings;
pub mod extractor;
pub mod ingester;
pub mod job;
pub mod normalize;
pub mod repository;
pub mod tiers;

pub use chunker::{ChunkContext, SentenceChunker};
pub use embeddings::{EmbeddingConfig, EmbeddingService, ProgressCallback};
pub use extractor::{ExtractionCascade, ExtractionOutcome, ExtractionTier, assess_quality};
pub use ingester::{
    BatchFailure, BatchReport, IngestionOrchestrator, IngestionReport, Stage, StageOutcome,
    StageStatus,
};
pub use job::{IngestionCoordinator, JobGuard, JobSnapshot, JobState};
pub use repository::InMemoryDocumentRepository;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::chunker::{ChunkContext, SentenceChunker};
    pub use crate::embeddings::EmbeddingService;
    pub use crate::extractor::{ExtractionCascade, ExtractionTier, assess_quality};
    pub use crate::ingester::{BatchReport, IngestionOrchestrator, IngestionReport};
    pub use crate::job::{IngestionCoordinator, JobState};
    pub use crate::normalize::{clean_ocr_artifacts, normalize_arabic, prepare_for_embedding};
}
