//! Core types and abstractions for Mizan, a grounded question-answering
//! system over Islamic-finance regulatory and scholarly documents.
//!
//! This crate provides the data model, language detection, configuration,
//! error handling and the traits for external collaborators used by the
//! ingestion and query pipelines.

pub mod config;
pub mod error;
pub mod id;
pub mod language;
pub mod traits;
pub mod types;

pub use config::MizanConfig;
pub use error::{MizanError, Result};
pub use id::{ChunkId, DocumentId};
pub use language::{Language, LanguageDetection, LanguageDetector, LanguageScores};
pub use traits::*;
pub use types::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::MizanConfig;
    pub use crate::error::{MizanError, Result};
    pub use crate::id::{ChunkId, DocumentId};
    pub use crate::language::{Language, LanguageDetection, LanguageDetector};
    pub use crate::traits::*;
    pub use crate::types::*;
}
