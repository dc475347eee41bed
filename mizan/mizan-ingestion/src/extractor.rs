//! Cascaded text extraction with quality assessment.
//!
//! Extraction runs through an ordered list of tiers, from cheap to expensive.
//! Each tier's output is scored with [`assess_quality`]; the first result that
//! meets its tier's threshold is accepted. Nothing here aborts ingestion just
//! because quality is low: when no tier is satisfied, the most escalated
//! successful result is returned and flagged as degraded.

use crate::tiers::{DigitalTier, OcrTier, PremiumOcrTier};
use async_trait::async_trait;
use mizan_core::config::ExtractionConfig;
use mizan_core::error::{MizanError, Result};
use mizan_core::language::{Language, LanguageDetector, is_arabic_char};
use mizan_core::types::{DocumentSource, ExtractionMethod, PageText};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Minimum trimmed length for text to be scored at all.
pub const MIN_QUALITY_CHARS: usize = 50;

const ALLOWED_PUNCTUATION: &[char] = &[
    '.', ',', ';', ':', '!', '?', '(', ')', '[', ']', '{', '}', '\'', '"', '؛', '،', '-', '–', '—',
];

fn is_garbled(c: char) -> bool {
    !(c.is_alphanumeric()
        || c == '_'
        || c.is_whitespace()
        || is_arabic_char(c)
        || ALLOWED_PUNCTUATION.contains(&c))
}

/// Score extracted text in [0, 1].
///
/// Text shorter than [`MIN_QUALITY_CHARS`] (after trimming) scores 0.
/// Otherwise the score starts at `1 - 3 * garbled_ratio`, gains 0.1 above
/// 100 words and another 0.1 above 500 words, and is clipped to [0, 1].
pub fn assess_quality(text: &str) -> f32 {
    let trimmed = text.trim();
    let total = trimmed.chars().count();
    if total < MIN_QUALITY_CHARS {
        return 0.0;
    }

    let garbled = trimmed.chars().filter(|c| is_garbled(*c)).count();
    let garbled_ratio = garbled as f32 / total as f32;
    let mut quality = 1.0 - 3.0 * garbled_ratio;

    let words = trimmed.split_whitespace().count();
    if words > 100 {
        quality += 0.1;
    }
    if words > 500 {
        quality += 0.1;
    }

    quality.clamp(0.0, 1.0)
}

/// One stage of the extraction cascade.
#[async_trait]
pub trait ExtractionTier: Send + Sync {
    /// Method recorded for results of this tier
    fn method(&self) -> ExtractionMethod;

    /// Minimum quality for acceptance; `None` accepts unconditionally
    fn threshold(&self) -> Option<f32>;

    /// Extract ordered, 1-indexed pages
    async fn extract(&self, source: &DocumentSource) -> Result<Vec<PageText>>;
}

/// Result of running the cascade over one document.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionOutcome {
    pub pages: Vec<PageText>,
    pub method: ExtractionMethod,
    pub quality: f32,
    pub degraded: bool,
    pub language: Language,
}

impl ExtractionOutcome {
    /// Concatenated text of all pages
    pub fn full_text(&self) -> String {
        join_pages(&self.pages)
    }
}

fn join_pages(pages: &[PageText]) -> String {
    pages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Ordered extraction tiers, tried from cheapest to most expensive.
pub struct ExtractionCascade {
    tiers: Vec<Box<dyn ExtractionTier>>,
    detector: LanguageDetector,
}

impl ExtractionCascade {
    pub fn new(tiers: Vec<Box<dyn ExtractionTier>>) -> Self {
        Self {
            tiers,
            detector: LanguageDetector::new(),
        }
    }

    /// Build the standard cascade: digital text layer, local OCR when
    /// enabled, and the remote OCR service when an endpoint is configured.
    pub fn from_config(config: &ExtractionConfig, http_timeout: Duration) -> Result<Self> {
        let mut tiers: Vec<Box<dyn ExtractionTier>> =
            vec![Box::new(DigitalTier::new(config.digital_threshold))];

        if config.ocr_enabled {
            tiers.push(Box::new(
                OcrTier::new(config.ocr_threshold)
                    .with_languages(config.ocr_languages.clone())
                    .with_dpi(config.ocr_dpi)
                    .with_psm(config.ocr_psm),
            ));
        }

        if let Some(endpoint) = &config.premium_endpoint {
            tiers.push(Box::new(PremiumOcrTier::new(
                endpoint.clone(),
                config.premium_api_key.clone(),
                http_timeout,
            )?));
        }

        Ok(Self::new(tiers))
    }

    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }

    /// Run the cascade.
    ///
    /// Fails only when every tier returns an error.
    pub async fn extract(&self, source: &DocumentSource) -> Result<ExtractionOutcome> {
        let mut fallback: Option<ExtractionOutcome> = None;
        let mut failures = Vec::new();

        for tier in &self.tiers {
            let method = tier.method();
            debug!("Trying {} extraction for {}", method, source.file_name);

            let pages = match tier.extract(source).await {
                Ok(pages) => pages,
                Err(e) => {
                    warn!("{} extraction failed for {}: {}", method, source.file_name, e);
                    failures.push(format!("{}: {}", method, e));
                    continue;
                }
            };

            let text = join_pages(&pages);
            let quality = assess_quality(&text);
            let language = self.detector.detect(&text).primary;

            let outcome = ExtractionOutcome {
                pages,
                method,
                quality,
                degraded: false,
                language,
            };

            match tier.threshold() {
                Some(threshold) if quality < threshold => {
                    info!(
                        "{} extraction quality {:.2} below {:.2} for {}, escalating",
                        method, quality, threshold, source.file_name
                    );
                    fallback = Some(ExtractionOutcome {
                        degraded: true,
                        ..outcome
                    });
                }
                _ => {
                    info!(
                        "Accepted {} extraction for {} (quality {:.2}, {} pages)",
                        method,
                        source.file_name,
                        quality,
                        outcome.pages.len()
                    );
                    return Ok(outcome);
                }
            }
        }

        match fallback {
            Some(outcome) => {
                warn!(
                    "No extraction tier met its threshold for {}; \
                     keeping degraded {} result (quality {:.2})",
                    source.file_name, outcome.method, outcome.quality
                );
                Ok(outcome)
            }
            None if failures.is_empty() => Err(MizanError::extraction(format!(
                "no extraction tiers configured for {}",
                source.file_name
            ))),
            None => Err(MizanError::extraction(format!(
                "all extraction tiers failed for {}: {}",
                source.file_name,
                failures.join("; ")
            ))),
        }
    }
}
