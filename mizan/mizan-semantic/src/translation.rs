//! Machine translation for queries and answers.
//!
//! Translation is best effort: callers go through [`translate_or_keep`], which
//! logs a failure and keeps the original text.

use async_trait::async_trait;
use mizan_core::error::{MizanError, Result};
use mizan_core::language::Language;
pub use mizan_core::traits::translate_or_keep;
use mizan_core::traits::Translator;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Longest text sent in one request.
pub const MAX_REQUEST_CHARS: usize = 4500;

/// Client for a LibreTranslate-compatible `/translate` endpoint.
pub struct HttpTranslator {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
    translated_text: String,
}

impl HttpTranslator {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MizanError::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn translate_piece(&self, text: &str, target: Language) -> Result<String> {
        let request = TranslateRequest {
            q: text,
            source: "auto",
            target: target.code(),
            format: "text",
            api_key: self.api_key.as_deref(),
        };
        let url = format!("{}/translate", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| MizanError::translation(format!("Translation request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(MizanError::translation(format!(
                "Translation API error {}: {}",
                status, error_text
            )));
        }

        let response: TranslateResponse = response
            .json()
            .await
            .map_err(|e| MizanError::translation(format!("Invalid translation response: {}", e)))?;
        Ok(response.translated_text)
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(&self, text: &str, target: Language) -> Result<String> {
        if text.trim().is_empty() {
            return Ok(text.to_string());
        }

        let pieces = split_for_translation(text, MAX_REQUEST_CHARS);
        debug!("Translating {} piece(s) to {}", pieces.len(), target);

        let mut translated = Vec::with_capacity(pieces.len());
        for piece in &pieces {
            translated.push(self.translate_piece(piece, target).await?);
        }
        Ok(translated.join("\n\n"))
    }
}

/// Translator that returns its input unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughTranslator;

#[async_trait]
impl Translator for PassthroughTranslator {
    async fn translate(&self, text: &str, _target: Language) -> Result<String> {
        Ok(text.to_string())
    }
}

/// Split text into pieces of at most `max_chars` characters, on paragraph
/// boundaries where possible.
pub fn split_for_translation(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for paragraph in text.split("\n\n") {
        let len = paragraph.chars().count();

        if len > max_chars {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = paragraph.chars().collect();
            pieces.extend(chars.chunks(max_chars).map(|c| c.iter().collect::<String>()));
            continue;
        }

        let joined_len = if current.is_empty() { len } else { current_len + 2 + len };
        if joined_len > max_chars {
            pieces.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push_str("\n\n");
            current_len += 2;
        }
        current.push_str(paragraph);
        current_len += len;
    }

    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingTranslator;

    #[async_trait]
    impl Translator for FailingTranslator {
        async fn translate(&self, _text: &str, _target: Language) -> Result<String> {
            Err(MizanError::translation("service unavailable"))
        }
    }

    #[test]
    fn test_short_text_is_one_piece() {
        assert_eq!(split_for_translation("hello", 10), vec!["hello".to_string()]);
    }

    #[test]
    fn test_split_on_paragraphs() {
        let text = "aaaa\n\nbbbb\n\ncccc";
        let pieces = split_for_translation(text, 10);
        assert_eq!(pieces, vec!["aaaa\n\nbbbb".to_string(), "cccc".to_string()]);
    }

    #[test]
    fn test_long_paragraph_is_hard_split() {
        let text = "x".repeat(25);
        let pieces = split_for_translation(&text, 10);
        assert_eq!(pieces.len(), 3);
        assert!(pieces.iter().all(|p| p.chars().count() <= 10));
        assert_eq!(pieces.concat(), text);
    }

    #[tokio::test]
    async fn test_translate_or_keep_falls_back() {
        let question = "ما هي المرابحة؟";
        let (text, ok) = translate_or_keep(&FailingTranslator, question, Language::English).await;
        assert!(!ok);
        assert_eq!(text, question);

        let (text, ok) = translate_or_keep(&PassthroughTranslator, "hello", Language::Malay).await;
        assert!(ok);
        assert_eq!(text, "hello");
    }
}
