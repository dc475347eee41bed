//! Remote OCR service, used as the last resort.

use crate::extractor::ExtractionTier;
use crate::normalize::clean_ocr_artifacts;
use async_trait::async_trait;
use mizan_core::error::{MizanError, Result};
use mizan_core::types::{DocumentSource, ExtractionMethod, PageText};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct OcrResponse {
    pages: Vec<String>,
}

/// Posts the raw document to an HTTP OCR endpoint that answers with
/// `{"pages": ["...", ...]}`. Its result is accepted unconditionally.
pub struct PremiumOcrTier {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl PremiumOcrTier {
    pub fn new(endpoint: String, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MizanError::config(format!("Failed to build OCR HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl ExtractionTier for PremiumOcrTier {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::PremiumOcr
    }

    fn threshold(&self) -> Option<f32> {
        None
    }

    async fn extract(&self, source: &DocumentSource) -> Result<Vec<PageText>> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/octet-stream")
            .header("X-File-Name", source.file_name.as_str())
            .body(source.bytes.clone());

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MizanError::extraction(format!("OCR service request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MizanError::extraction(format!(
                "OCR service error ({}): {}",
                status, body
            )));
        }

        let parsed: OcrResponse = response
            .json()
            .await
            .map_err(|e| MizanError::extraction(format!("Invalid OCR service response: {}", e)))?;

        if parsed.pages.is_empty() {
            return Err(MizanError::extraction("OCR service returned no pages"));
        }

        Ok(PageText::from_pages(
            parsed.pages.iter().map(|page| clean_ocr_artifacts(page)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_shape() {
        let parsed: OcrResponse =
            serde_json::from_str(r#"{"pages": ["first", "second"]}"#).unwrap();
        assert_eq!(parsed.pages.len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_service_is_an_error() {
        let tier = PremiumOcrTier::new(
            "http://127.0.0.1:9/ocr".to_string(),
            None,
            Duration::from_secs(2),
        )
        .unwrap();
        let source = DocumentSource::new("scan.pdf", "AAOIFI", b"%PDF-1.4".to_vec());
        assert!(tier.extract(&source).await.is_err());
        assert_eq!(tier.threshold(), None);
    }
}
