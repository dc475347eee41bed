//! Digital text-layer extraction.

use super::split_form_feeds;
use crate::extractor::ExtractionTier;
use async_trait::async_trait;
use lopdf::Document as PdfDocument;
use mizan_core::error::{MizanError, Result};
use mizan_core::types::{DocumentSource, ExtractionMethod, PageText};
use pdf_extract::extract_text_from_mem;
use tracing::debug;

/// Reads the embedded text layer of a PDF, or plain UTF-8 text for other
/// inputs (form feeds separate pages).
pub struct DigitalTier {
    threshold: f32,
}

impl DigitalTier {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Extract text per page using lopdf
    fn extract_pages(pdf: &PdfDocument) -> Vec<String> {
        pdf.get_pages()
            .keys()
            .map(|page_num| pdf.extract_text(&[*page_num]).unwrap_or_default())
            .collect()
    }

    fn extract_pdf(bytes: &[u8]) -> Result<Vec<PageText>> {
        match PdfDocument::load_mem(bytes) {
            Ok(pdf) => {
                let pages = Self::extract_pages(&pdf);
                if pages.iter().any(|p| !p.trim().is_empty()) {
                    return Ok(PageText::from_pages(pages));
                }
                debug!("lopdf found no text layer, trying pdf-extract");
            }
            Err(e) => debug!("lopdf failed to parse PDF, trying pdf-extract: {}", e),
        }

        let text = extract_text_from_mem(bytes)
            .map_err(|e| MizanError::extraction(format!("Failed to extract PDF text: {}", e)))?;
        Ok(split_form_feeds(&text))
    }

    fn extract_plain(bytes: &[u8]) -> Result<Vec<PageText>> {
        let text = std::str::from_utf8(bytes).map_err(|e| {
            MizanError::extraction(format!("Input is neither PDF nor UTF-8 text: {}", e))
        })?;
        Ok(split_form_feeds(text))
    }
}

impl Default for DigitalTier {
    fn default() -> Self {
        Self::new(0.7)
    }
}

#[async_trait]
impl ExtractionTier for DigitalTier {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Digital
    }

    fn threshold(&self) -> Option<f32> {
        Some(self.threshold)
    }

    async fn extract(&self, source: &DocumentSource) -> Result<Vec<PageText>> {
        if !source.is_pdf() {
            return Self::extract_plain(&source.bytes);
        }

        let bytes = source.bytes.clone();
        tokio::task::spawn_blocking(move || Self::extract_pdf(&bytes))
            .await
            .map_err(|e| MizanError::internal(format!("PDF extraction task failed: {}", e)))?
    }
}
