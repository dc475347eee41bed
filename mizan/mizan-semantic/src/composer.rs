//! Grounded answer composition.
//!
//! The composer is the last stage of a query. It refuses to call a generation
//! backend when there is no relevant context or the question is outside the
//! Islamic-finance domain; otherwise it builds a prompt whose context blocks
//! carry `[Source N: ...]` labels, generates, enforces the response language
//! and derives citations and a confidence label.

use crate::generation::{BackendPreference, GeneratorRegistry};
use crate::translation::translate_or_keep;
use mizan_core::config::GenerationConfig;
use mizan_core::error::Result;
use mizan_core::language::{Language, LanguageDetector};
use mizan_core::traits::Translator;
use mizan_core::types::{Answer, ConfidenceLabel, GenerationOptions, RankedResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use unicode_segmentation::UnicodeSegmentation;

static SOURCE_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[Source (\d+)").unwrap());

/// Per-request composition options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposeOptions {
    /// Answer in this language instead of the query language
    pub response_language: Option<Language>,
    pub backend: Option<BackendPreference>,
}

/// Why a question was declined without generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclineReason {
    NoRelevantContext,
    OutOfScope,
}

/// Fixed decline text in the response language.
pub fn decline_message(reason: DeclineReason, language: Language) -> &'static str {
    match (reason, language) {
        (DeclineReason::NoRelevantContext, Language::English) => {
            "I don't find enough information in the available Shariah sources \
             to fully answer this question."
        }
        (DeclineReason::NoRelevantContext, Language::Malay) => {
            "Maaf, saya tidak menemui maklumat yang mencukupi dalam sumber Syariah yang tersedia."
        }
        (DeclineReason::NoRelevantContext, Language::Arabic) => {
            "عذراً، لا أجد معلومات كافية في المصادر الشرعية المتاحة."
        }
        (DeclineReason::OutOfScope, Language::English) => {
            "I am Mizan, specialized only in Islamic finance and Shariah compliance. \
             I can help with questions about Islamic banking, takaful, sukuk, zakat \
             and Shariah rulings. Please ask a question related to Islamic finance."
        }
        (DeclineReason::OutOfScope, Language::Malay) => {
            "Saya Mizan, pakar dalam kewangan Islam dan pematuhan Syariah sahaja. \
             Saya boleh membantu anda dengan soalan tentang perbankan Islam, takaful, \
             sukuk, zakat dan keputusan Syariah. Sila tanya soalan berkaitan kewangan Islam."
        }
        (DeclineReason::OutOfScope, Language::Arabic) => {
            "أنا ميزان، متخصص فقط في التمويل الإسلامي والامتثال الشرعي. \
             يمكنني مساعدتك في الأسئلة حول البنوك الإسلامية \
             والتكافل والصكوك والزكاة والأحكام الشرعية."
        }
    }
}

/// Confidence from the size, strength and spread of the ranked results.
pub fn confidence_for(results: &[RankedResult]) -> ConfidenceLabel {
    if results.is_empty() {
        return ConfidenceLabel::Low;
    }

    let mut points = 0;
    if results.len() >= 4 {
        points += 2;
    } else if results.len() >= 2 {
        points += 1;
    }

    let top = results
        .iter()
        .map(|r| r.rerank_score)
        .fold(f32::MIN, f32::max);
    if top >= 0.85 {
        points += 1;
    }

    let mean = results.iter().map(|r| r.rerank_score).sum::<f32>() / results.len() as f32;
    if mean >= 0.75 {
        points += 1;
    }

    let sources: HashSet<&str> = results.iter().map(|r| r.source_label()).collect();
    let languages: HashSet<Language> = results.iter().map(|r| r.chunk.language).collect();
    if sources.len() > 1 || languages.len() > 1 {
        points += 1;
    }

    match points {
        p if p >= 4 => ConfidenceLabel::High,
        p if p >= 2 => ConfidenceLabel::Medium,
        _ => ConfidenceLabel::Low,
    }
}

/// Source numbers (1-based) referenced in `text` that exist in `0..count`.
pub fn cited_sources(text: &str, count: usize) -> BTreeSet<usize> {
    SOURCE_REF
        .captures_iter(text)
        .filter_map(|c| c.get(1)?.as_str().parse::<usize>().ok())
        .filter(|n| (1..=count).contains(n))
        .collect()
}

/// Label placed before each context block.
pub fn source_label(index: usize, result: &RankedResult) -> String {
    format!(
        "[Source {}: {} - {}, Page {} of {}]",
        index + 1,
        result.source_label(),
        result.chunk.title,
        result.page_number(),
        result.total_pages()
    )
}

fn system_prompt(response_language: Language) -> String {
    format!(
        "You are Mizan, an assistant specialized only in Islamic finance and Shariah compliance. \
         Answer strictly from the numbered sources you are given and never from general knowledge. \
         Cite sources inline using their labels, for example [Source 1]. \
         If the sources do not answer the question, say so plainly. \
         Respond entirely in {}.",
        response_language.display_name()
    )
}

fn build_prompt(
    query: &str,
    results: &[RankedResult],
    query_language: Language,
    response_language: Language,
) -> String {
    let context = results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}\n{}", source_label(i, r), r.chunk.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    format!(
        "Context from Shariah sources:\n\n{context}\n\n\
         Question ({query_lang}): {query}\n\n\
         Instructions:\n\
         1. Use only the context above. Do not add facts that are not in it.\n\
         2. Cite every source you rely on with its [Source N] label.\n\
         3. If the context is insufficient, say: \"{insufficient}\"\n\
         4. Respond in {response_lang}.\n\n\
         Answer ({response_lang}):",
        context = context,
        query_lang = query_language.display_name(),
        query = query,
        insufficient = decline_message(DeclineReason::NoRelevantContext, response_language),
        response_lang = response_language.display_name(),
    )
}

/// Builds grounded answers from reranked results.
pub struct AnswerComposer {
    generators: Arc<GeneratorRegistry>,
    translator: Arc<dyn Translator>,
    detector: LanguageDetector,
    domain_terms: Vec<String>,
    strong_relevance_floor: f32,
    generation: GenerationOptions,
}

impl AnswerComposer {
    pub fn new(
        generators: Arc<GeneratorRegistry>,
        translator: Arc<dyn Translator>,
        config: &GenerationConfig,
    ) -> Self {
        Self {
            generators,
            translator,
            detector: LanguageDetector::new(),
            domain_terms: config.domain_terms.iter().map(|t| t.to_lowercase()).collect(),
            strong_relevance_floor: config.strong_relevance_floor,
            generation: GenerationOptions {
                temperature: config.temperature,
                max_tokens: config.max_tokens,
                system_prompt: None,
            },
        }
    }

    fn mentions_domain_term(&self, query: &str) -> bool {
        query.unicode_words().any(|word| {
            let word = word.to_lowercase();
            self.domain_terms.iter().any(|term| {
                if term.chars().any(|c| c.is_ascii_alphabetic()) {
                    word == *term || word.starts_with(term.as_str())
                } else {
                    word.contains(term.as_str())
                }
            })
        })
    }

    /// Whether the question belongs to the corpus domain: it names a domain
    /// term, or the best result is strongly relevant.
    pub fn is_in_scope(&self, query: &str, results: &[RankedResult]) -> bool {
        self.mentions_domain_term(query)
            || results
                .first()
                .is_some_and(|r| r.rerank_score >= self.strong_relevance_floor)
    }

    fn decline(&self, reason: DeclineReason, language: Language) -> Answer {
        info!("Declining question ({:?})", reason);
        Answer {
            text: decline_message(reason, language).to_string(),
            response_language: language,
            citations: Vec::new(),
            confidence: ConfidenceLabel::Low,
            declined: true,
            backend: None,
        }
    }

    /// Compose an answer from `results`, which must already be reranked.
    pub async fn compose(
        &self,
        query: &str,
        results: Vec<RankedResult>,
        query_language: Language,
        options: &ComposeOptions,
    ) -> Result<Answer> {
        let response_language = options.response_language.unwrap_or(query_language);

        if !self.is_in_scope(query, &results) {
            return Ok(self.decline(DeclineReason::OutOfScope, response_language));
        }
        if results.is_empty() {
            return Ok(self.decline(DeclineReason::NoRelevantContext, response_language));
        }

        let generator = self.generators.select(options.backend)?;
        let prompt = build_prompt(query, &results, query_language, response_language);
        let generation = GenerationOptions {
            system_prompt: Some(system_prompt(response_language)),
            ..self.generation.clone()
        };

        debug!(
            "Generating with {} ({}) from {} sources",
            generator.name(),
            generator.model(),
            results.len()
        );
        let generated = generator.generate(&prompt, &generation).await?;
        let generated = generated.trim();
        if generated.is_empty() {
            warn!("{} returned an empty answer", generator.name());
            return Ok(self.decline(DeclineReason::NoRelevantContext, response_language));
        }

        let detected = self.detector.detect(generated);
        let text = if !detected.includes(response_language) {
            info!(
                "Answer came back in {} instead of {}, translating",
                detected.primary, response_language
            );
            translate_or_keep(self.translator.as_ref(), generated, response_language)
                .await
                .0
        } else {
            generated.to_string()
        };

        let confidence = confidence_for(&results);
        let cited = cited_sources(&text, results.len());
        let citations: Vec<RankedResult> = if cited.is_empty() {
            results
        } else {
            results
                .into_iter()
                .enumerate()
                .filter(|(i, _)| cited.contains(&(i + 1)))
                .map(|(_, r)| r)
                .collect()
        };

        info!(
            "Composed answer with {} citation(s), confidence {}",
            citations.len(),
            confidence
        );

        Ok(Answer {
            text,
            response_language,
            citations,
            confidence,
            declined: false,
            backend: Some(generator.name().to_string()),
        })
    }
}
