//! In-memory document repository.

use async_trait::async_trait;
use mizan_core::error::{MizanError, Result};
use mizan_core::id::DocumentId;
use mizan_core::traits::DocumentRepository;
use mizan_core::types::{Document, DocumentStatus};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct Record {
    document: Document,
    status: DocumentStatus,
}

/// Keeps document records and their statuses in process memory.
#[derive(Debug, Default)]
pub struct InMemoryDocumentRepository {
    records: RwLock<HashMap<DocumentId, Record>>,
}

impl InMemoryDocumentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// All documents with their statuses, oldest first.
    pub fn list(&self) -> Vec<(Document, DocumentStatus)> {
        let mut all: Vec<(Document, DocumentStatus)> = self
            .records
            .read()
            .values()
            .map(|r| (r.document.clone(), r.status))
            .collect();
        all.sort_by_key(|(doc, _)| doc.created_at);
        all
    }

    /// Seed the repository, e.g. from a persisted snapshot.
    pub fn restore(&self, documents: impl IntoIterator<Item = (Document, DocumentStatus)>) {
        let mut records = self.records.write();
        for (document, status) in documents {
            records.insert(document.id, Record { document, status });
        }
    }
}

#[async_trait]
impl DocumentRepository for InMemoryDocumentRepository {
    async fn create(&self, document: &Document) -> Result<()> {
        let mut records = self.records.write();
        if records.contains_key(&document.id) {
            return Err(MizanError::repository(format!(
                "document {} already exists",
                document.id
            )));
        }
        records.insert(
            document.id,
            Record {
                document: document.clone(),
                status: DocumentStatus::Pending,
            },
        );
        Ok(())
    }

    async fn update_status(&self, id: DocumentId, status: DocumentStatus) -> Result<()> {
        let mut records = self.records.write();
        let record = records
            .get_mut(&id)
            .ok_or_else(|| MizanError::repository(format!("document {} not found", id)))?;
        record.status = status;
        Ok(())
    }

    async fn get(&self, id: DocumentId) -> Result<Option<Document>> {
        Ok(self.records.read().get(&id).map(|r| r.document.clone()))
    }

    async fn status(&self, id: DocumentId) -> Result<Option<DocumentStatus>> {
        Ok(self.records.read().get(&id).map(|r| r.status))
    }

    async fn find_current(&self, source_label: &str, file_name: &str) -> Result<Option<Document>> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|r| {
                r.status == DocumentStatus::Indexed
                    && r.document.source_label == source_label
                    && r.document.file_name == file_name
            })
            .max_by_key(|r| r.document.created_at)
            .map(|r| r.document.clone()))
    }
}
