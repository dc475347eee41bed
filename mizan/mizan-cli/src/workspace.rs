//! On-disk state shared by CLI invocations: the index snapshot and the
//! document records, both under the configured data directory.

use anyhow::{Context, Result};
use mizan_core::config::MizanConfig;
use mizan_core::traits::Embedder;
use mizan_core::types::{Document, DocumentStatus};
use mizan_ingestion::repository::InMemoryDocumentRepository;
use mizan_semantic::index::InMemoryVectorStore;
use mizan_semantic::providers::create_embedder;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

const DOCUMENTS_FILE: &str = "documents.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document: Document,
    pub status: DocumentStatus,
}

/// Loaded state for one CLI invocation.
pub struct Workspace {
    pub config: MizanConfig,
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<InMemoryVectorStore>,
    pub repository: Arc<InMemoryDocumentRepository>,
}

impl Workspace {
    pub async fn open(config: MizanConfig) -> Result<Self> {
        let embedder = create_embedder(&config.providers)?;
        Self::open_with_embedder(config, embedder).await
    }

    pub async fn open_with_embedder(
        config: MizanConfig,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let snapshot = config.snapshot_path();
        let store = InMemoryVectorStore::load_or_create(&snapshot, embedder.dimension())
            .await
            .with_context(|| format!("Failed to load index snapshot {}", snapshot.display()))?;

        let repository = InMemoryDocumentRepository::new();
        let documents_path = documents_path(&config);
        if documents_path.exists() {
            let content = tokio::fs::read_to_string(&documents_path)
                .await
                .with_context(|| format!("Failed to read {}", documents_path.display()))?;
            let records: Vec<DocumentRecord> = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", documents_path.display()))?;
            debug!("Restoring {} document records", records.len());
            repository.restore(records.into_iter().map(|r| (r.document, r.status)));
        }

        Ok(Self {
            config,
            embedder,
            store: Arc::new(store),
            repository: Arc::new(repository),
        })
    }

    pub fn documents(&self) -> Vec<DocumentRecord> {
        self.repository
            .list()
            .into_iter()
            .map(|(document, status)| DocumentRecord { document, status })
            .collect()
    }

    /// Write the index snapshot and document records.
    pub async fn persist(&self) -> Result<()> {
        self.store.save(&self.config.snapshot_path()).await?;

        let path = documents_path(&self.config);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(&self.documents())?;
        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, content).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        info!("Workspace saved to {}", self.config.general.data_dir.display());
        Ok(())
    }
}

fn documents_path(config: &MizanConfig) -> PathBuf {
    config.general.data_dir.join(DOCUMENTS_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mizan_core::traits::DocumentRepository;
    use mizan_semantic::providers::HashingEmbedder;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> MizanConfig {
        let mut config = MizanConfig::default();
        config.general.data_dir = dir.path().join("data");
        config.providers.embedding_provider = "hashing".to_string();
        config.providers.embedding_dimension = 32;
        config
    }

    #[tokio::test]
    async fn test_empty_workspace() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::open(config(&dir)).await.unwrap();
        assert!(workspace.documents().is_empty());
        assert_eq!(workspace.embedder.dimension(), 32);
    }

    #[tokio::test]
    async fn test_documents_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(32));
        let workspace = Workspace::open_with_embedder(config(&dir), embedder.clone())
            .await
            .unwrap();

        let document = Document {
            id: mizan_core::id::DocumentId::new(),
            source_label: "BNM".to_string(),
            file_name: "tawarruq.pdf".to_string(),
            title: "tawarruq".to_string(),
            content_hash: "abc".to_string(),
            size_bytes: 3,
            language: mizan_core::language::Language::English,
            extraction_method: mizan_core::types::ExtractionMethod::Digital,
            extraction_quality: 0.9,
            extraction_degraded: false,
            supersedes: None,
            created_at: chrono::Utc::now(),
        };
        workspace.repository.create(&document).await.unwrap();
        workspace
            .repository
            .update_status(document.id, DocumentStatus::Indexed)
            .await
            .unwrap();
        workspace.persist().await.unwrap();

        let reopened = Workspace::open_with_embedder(config(&dir), embedder).await.unwrap();
        let documents = reopened.documents();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].document, document);
        assert_eq!(documents[0].status, DocumentStatus::Indexed);
        let current = reopened.repository.find_current("BNM", "tawarruq.pdf").await.unwrap();
        assert_eq!(current.map(|d| d.id), Some(document.id));
    }
}
