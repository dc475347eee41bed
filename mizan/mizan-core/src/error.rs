//! Error types for the Mizan system.

/// Result type alias for Mizan operations.
pub type Result<T> = std::result::Result<T, MizanError>;

/// Main error type for the Mizan system.
#[derive(Debug, thiserror::Error)]
pub enum MizanError {
    /// Text extraction failed on every tier of the cascade
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Embedding service errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Vector index errors
    #[error("Index error: {0}")]
    Index(String),

    /// Cross-encoder scoring errors
    #[error("Rerank error: {0}")]
    Rerank(String),

    /// Generation backend errors
    #[error("Generation error: {0}")]
    Generation(String),

    /// Translation service errors
    #[error("Translation error: {0}")]
    Translation(String),

    /// Document repository errors
    #[error("Repository error: {0}")]
    Repository(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// An ingestion batch is already running against the index
    #[error("Ingestion job conflict: {0}")]
    JobConflict(String),

    /// Vector dimension mismatch between embedder and index
    #[error("Invalid dimension: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// Wrapped anyhow errors for compatibility
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MizanError {
    /// Create a new extraction error
    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction(msg.into())
    }

    /// Create a new embedding error
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    /// Create a new index error
    pub fn index(msg: impl Into<String>) -> Self {
        Self::Index(msg.into())
    }

    /// Create a new rerank error
    pub fn rerank(msg: impl Into<String>) -> Self {
        Self::Rerank(msg.into())
    }

    /// Create a new generation error
    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }

    /// Create a new translation error
    pub fn translation(msg: impl Into<String>) -> Self {
        Self::Translation(msg.into())
    }

    /// Create a new repository error
    pub fn repository(msg: impl Into<String>) -> Self {
        Self::Repository(msg.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new job conflict error
    pub fn job_conflict(msg: impl Into<String>) -> Self {
        Self::JobConflict(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the caller may retry the operation that produced this error.
    ///
    /// External-service failures (embedding, index, reranking, generation,
    /// repository) are transient from the core's point of view.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Embedding(_)
                | Self::Index(_)
                | Self::Rerank(_)
                | Self::Generation(_)
                | Self::Repository(_)
                | Self::Io(_)
        )
    }
}
