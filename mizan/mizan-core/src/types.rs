//! Core data model shared by the ingestion and query pipelines.

use crate::id::{ChunkId, DocumentId};
use crate::language::Language;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of an ingested document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Indexed,
    Failed,
    /// Replaced by a newer ingestion of the same source file; its chunks are
    /// no longer in the index
    Superseded,
}

impl DocumentStatus {
    /// Whether the document has reached a final status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Indexed | Self::Failed | Self::Superseded)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Indexed => "indexed",
            Self::Failed => "failed",
            Self::Superseded => "superseded",
        };
        f.write_str(s)
    }
}

/// Extraction tier that produced a document's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Embedded text layer of a digital document
    Digital,
    /// Local OCR over rasterised pages
    Ocr,
    /// Remote OCR service
    PremiumOcr,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Digital => "digital",
            Self::Ocr => "ocr",
            Self::PremiumOcr => "premium_ocr",
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw input handed to the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct DocumentSource {
    pub file_name: String,
    pub source_label: String,
    pub title: Option<String>,
    pub bytes: Vec<u8>,
}

impl DocumentSource {
    pub fn new(
        file_name: impl Into<String>,
        source_label: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            source_label: source_label.into(),
            title: None,
            bytes,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Explicit title, else the file name without its extension.
    pub fn display_title(&self) -> String {
        if let Some(title) = &self.title {
            return title.clone();
        }
        match self.file_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => self.file_name.clone(),
        }
    }

    /// Whether the bytes look like a PDF.
    pub fn is_pdf(&self) -> bool {
        self.bytes.starts_with(b"%PDF") || self.file_name.to_lowercase().ends_with(".pdf")
    }
}

/// A stored source document. Never mutated; re-ingestion supersedes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub source_label: String,
    pub file_name: String,
    pub title: String,
    /// blake3 hex digest of the raw bytes
    pub content_hash: String,
    pub size_bytes: u64,
    pub language: Language,
    pub extraction_method: ExtractionMethod,
    pub extraction_quality: f32,
    pub extraction_degraded: bool,
    pub supersedes: Option<DocumentId>,
    pub created_at: DateTime<Utc>,
}

/// Text of one page. Pages are 1-indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    pub page_number: u32,
    pub total_pages: u32,
    pub text: String,
}

impl PageText {
    pub fn new(page_number: u32, total_pages: u32, text: impl Into<String>) -> Self {
        Self {
            page_number,
            total_pages,
            text: text.into(),
        }
    }

    /// Build ordered pages from raw page strings.
    pub fn from_pages<I, S>(pages: I) -> Vec<PageText>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let texts: Vec<String> = pages.into_iter().map(Into::into).collect();
        let total = texts.len() as u32;
        texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| PageText::new(i as u32 + 1, total, text))
            .collect()
    }
}

/// A retrievable passage of a document.
///
/// `text` is exactly the characters `[start_offset, end_offset)` of the
/// document's concatenated page text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub text: String,
    pub page_number: u32,
    pub total_pages: u32,
    pub language: Language,
    pub source_label: String,
    pub title: String,
    pub sequence_index: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    pub extraction_degraded: bool,
}

impl Chunk {
    /// Length of the chunk in characters.
    pub fn char_len(&self) -> usize {
        self.end_offset - self.start_offset
    }
}

/// Filter applied to vector-store queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub source_label: Option<String>,
    pub language: Option<Language>,
}

impl MetadataFilter {
    pub fn is_empty(&self) -> bool {
        self.source_label.is_none() && self.language.is_none()
    }

    pub fn matches(&self, chunk: &Chunk) -> bool {
        if let Some(source) = &self.source_label {
            if &chunk.source_label != source {
                return false;
            }
        }
        if let Some(language) = self.language {
            if chunk.language != language {
                return false;
            }
        }
        true
    }
}

/// Raw hit returned by a vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    pub chunk: Chunk,
    pub score: f32,
}

/// Output of coarse retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalCandidate {
    pub chunk: Chunk,
    pub coarse_score: f32,
    pub coarse_rank: usize,
}

/// A candidate after cross-encoder rescoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub chunk: Chunk,
    pub rerank_score: f32,
    pub coarse_score: f32,
    pub coarse_rank: usize,
}

impl RankedResult {
    pub fn chunk_id(&self) -> ChunkId {
        self.chunk.chunk_id
    }

    pub fn page_number(&self) -> u32 {
        self.chunk.page_number
    }

    pub fn total_pages(&self) -> u32 {
        self.chunk.total_pages
    }

    pub fn source_label(&self) -> &str {
        &self.chunk.source_label
    }
}

/// Coarse confidence attached to an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConfidenceLabel {
    Low,
    Medium,
    High,
}

impl fmt::Display for ConfidenceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        };
        f.write_str(s)
    }
}

/// A composed answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub response_language: Language,
    pub citations: Vec<RankedResult>,
    pub confidence: ConfidenceLabel,
    pub declined: bool,
    pub backend: Option<String>,
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One prior turn of a conversation, supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

/// Options passed to a generation backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub system_prompt: Option<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 2000,
            system_prompt: None,
        }
    }
}
