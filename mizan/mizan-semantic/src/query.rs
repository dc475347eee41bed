//! Query normalization: language detection, follow-up rewriting and
//! translation into the index language.

use crate::translation::translate_or_keep;
use mizan_core::language::{Language, LanguageDetection, LanguageDetector};
use mizan_core::traits::Translator;
use mizan_core::types::{ConversationTurn, TurnRole};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

/// Pronouns that refer back to an earlier turn.
static ANAPHORS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "it", "that", "this", "they", "them", "its", "those", "these", "ia", "itu", "ini",
        "tersebut", "هذا", "ذلك", "هي", "هو",
    ]
    .into_iter()
    .collect()
});

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // English
        "a", "an", "the", "is", "are", "was", "were", "be", "been", "am", "do", "does", "did",
        "what", "which", "who", "whom", "how", "why", "when", "where", "of", "in", "on", "at",
        "for", "to", "from", "by", "with", "and", "or", "not", "no", "about", "can", "could",
        "would", "should", "may", "might", "will", "shall", "i", "me", "my", "you", "your",
        "we", "our", "tell", "explain", "please", "describe", "there", "any", "some", "if",
        "so", "as", "than", "then", "also", "more", "most",
        // Malay
        "apa", "apakah", "adalah", "ialah", "yang", "dan", "atau", "dalam", "untuk", "dari",
        "daripada", "ke", "di", "pada", "bagaimana", "mengapa", "kenapa", "boleh", "tolong",
        "terangkan", "jelaskan", "saya", "kami", "anda", "dengan", "tentang", "mengenai",
        "ada", "tidak", "juga", "lagi",
        // Arabic
        "ما", "ماذا", "هل", "في", "من", "على", "إلى", "الى", "عن", "كيف", "لماذا", "متى",
        "أين", "و", "أو", "ثم", "هذه", "تلك", "الذي", "التي",
    ]
    .into_iter()
    .collect()
});

/// A query prepared for retrieval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedQuery {
    /// The question as asked
    pub original: String,
    /// The question after follow-up rewriting, before translation
    pub rewritten_text: String,
    /// Text embedded for retrieval, in the index language when translation succeeded
    pub search_text: String,
    pub query_language: Language,
    pub detection: LanguageDetection,
    pub rewritten: bool,
    pub translated: bool,
}

/// Prepares user questions for retrieval against a single-language index.
pub struct QueryNormalizer {
    detector: LanguageDetector,
    translator: Arc<dyn Translator>,
    index_language: Language,
}

impl QueryNormalizer {
    pub fn new(translator: Arc<dyn Translator>, index_language: Language) -> Self {
        Self {
            detector: LanguageDetector::new(),
            translator,
            index_language,
        }
    }

    pub fn index_language(&self) -> Language {
        self.index_language
    }

    pub fn detect(&self, text: &str) -> LanguageDetection {
        self.detector.detect(text)
    }

    pub async fn normalize(&self, query: &str, history: &[ConversationTurn]) -> NormalizedQuery {
        let query = query.trim();
        let detection = self.detector.detect(query);

        let (rewritten_text, rewritten) = match rewrite_follow_up(query, history) {
            Some(text) => (text, true),
            None => (query.to_string(), false),
        };

        let (search_text, translated) =
            if detection.primary != self.index_language || detection.is_mixed {
                translate_or_keep(self.translator.as_ref(), &rewritten_text, self.index_language)
                    .await
            } else {
                (rewritten_text.clone(), false)
            };

        debug!(
            "Normalized query ({}, rewritten: {}, translated: {}): {}",
            detection.primary, rewritten, translated, search_text
        );

        NormalizedQuery {
            original: query.to_string(),
            rewritten_text,
            search_text,
            query_language: detection.primary,
            detection,
            rewritten,
            translated,
        }
    }
}

/// Whether the text contains a pronoun referring to an earlier turn.
pub fn has_anaphor(text: &str) -> bool {
    text.unicode_words()
        .any(|w| ANAPHORS.contains(w.to_lowercase().as_str()))
}

/// Content words of a turn, in order, without duplicates.
pub fn topic_terms(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.unicode_words()
        .filter(|w| {
            let lower = w.to_lowercase();
            !STOP_WORDS.contains(lower.as_str()) && !ANAPHORS.contains(lower.as_str())
        })
        .filter(|w| seen.insert(w.to_lowercase()))
        .map(String::from)
        .collect()
}

/// Append the topic of the most recent user turn to a follow-up question.
///
/// Only words copied from the history are added. Returns `None` when the
/// query has no anaphor, there is no prior user turn, or it adds nothing new.
pub fn rewrite_follow_up(query: &str, history: &[ConversationTurn]) -> Option<String> {
    if !has_anaphor(query) {
        return None;
    }

    let prior = history.iter().rev().find(|t| t.role == TurnRole::User)?;
    let present: HashSet<String> = query.unicode_words().map(|w| w.to_lowercase()).collect();
    let terms: Vec<String> = topic_terms(&prior.content)
        .into_iter()
        .filter(|t| !present.contains(&t.to_lowercase()))
        .collect();

    if terms.is_empty() {
        return None;
    }
    Some(format!("{} {}", query, terms.join(" ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::PassthroughTranslator;
    use async_trait::async_trait;
    use mizan_core::error::{MizanError, Result};
    use parking_lot::Mutex;

    struct RecordingTranslator {
        calls: Mutex<Vec<(String, Language)>>,
        output: Option<String>,
    }

    impl RecordingTranslator {
        fn new(output: Option<&str>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                output: output.map(String::from),
            }
        }
    }

    #[async_trait]
    impl Translator for RecordingTranslator {
        async fn translate(&self, text: &str, target: Language) -> Result<String> {
            self.calls.lock().push((text.to_string(), target));
            self.output
                .clone()
                .ok_or_else(|| MizanError::translation("unavailable"))
        }
    }

    #[test]
    fn test_anaphor_detection() {
        assert!(has_anaphor("Is it permissible?"));
        assert!(has_anaphor("Adakah ia dibenarkan?"));
        assert!(has_anaphor("ما حكم هذا؟"));
        assert!(!has_anaphor("What is Murabaha?"));
    }

    #[test]
    fn test_rewrite_uses_prior_user_turn_only() {
        let history = vec![
            ConversationTurn::user("What is Murabaha?"),
            ConversationTurn::assistant("Murabaha is a cost-plus sale [Source 1]."),
        ];
        let rewritten = rewrite_follow_up("Is it permissible?", &history).unwrap();
        assert_eq!(rewritten, "Is it permissible? Murabaha");
    }

    #[test]
    fn test_no_rewrite_without_history_or_anaphor() {
        assert!(rewrite_follow_up("Is it permissible?", &[]).is_none());
        let history = vec![ConversationTurn::user("What is Murabaha?")];
        assert!(rewrite_follow_up("What is Ijarah?", &history).is_none());
    }

    #[test]
    fn test_rewrite_adds_only_history_words() {
        let history = vec![ConversationTurn::user("Explain the rules of tawarruq financing")];
        let rewritten = rewrite_follow_up("Are they binding?", &history).unwrap();
        let added: Vec<&str> = rewritten
            .trim_start_matches("Are they binding?")
            .split_whitespace()
            .collect();
        assert_eq!(added, vec!["rules", "tawarruq", "financing"]);
        for word in added {
            assert!(history[0].content.contains(word));
        }
    }

    #[tokio::test]
    async fn test_english_query_is_not_translated() {
        let translator = Arc::new(RecordingTranslator::new(Some("unused")));
        let normalizer = QueryNormalizer::new(translator.clone(), Language::English);
        let query = normalizer.normalize("What is Murabaha?", &[]).await;

        assert_eq!(query.search_text, "What is Murabaha?");
        assert_eq!(query.query_language, Language::English);
        assert!(!query.translated);
        assert!(!query.rewritten);
        assert!(translator.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_mixed_query_is_translated() {
        let translator = Arc::new(RecordingTranslator::new(Some(
            "What is the ruling on bai sale in murabaha?",
        )));
        let normalizer = QueryNormalizer::new(translator.clone(), Language::English);
        let query = normalizer
            .normalize("Apakah hukum jualan bai dalam مرابحة?", &[])
            .await;

        assert_eq!(query.query_language, Language::Malay);
        assert!(query.detection.is_mixed);
        assert!(query.translated);
        assert_eq!(query.search_text, "What is the ruling on bai sale in murabaha?");
        assert_eq!(translator.calls.lock()[0].1, Language::English);
    }

    #[tokio::test]
    async fn test_translation_failure_keeps_query() {
        let translator = Arc::new(RecordingTranslator::new(None));
        let normalizer = QueryNormalizer::new(translator, Language::English);
        let query = normalizer.normalize("ما هي المرابحة؟", &[]).await;

        assert_eq!(query.query_language, Language::Arabic);
        assert!(!query.translated);
        assert_eq!(query.search_text, "ما هي المرابحة؟");
    }

    #[tokio::test]
    async fn test_rewrite_happens_before_translation() {
        let translator = Arc::new(RecordingTranslator::new(Some("translated")));
        let normalizer = QueryNormalizer::new(translator.clone(), Language::English);
        let history = vec![ConversationTurn::user("Apakah tawarruq?")];
        let query = normalizer.normalize("Adakah ia dibenarkan?", &history).await;

        assert!(query.rewritten);
        assert_eq!(query.rewritten_text, "Adakah ia dibenarkan? tawarruq");
        assert_eq!(translator.calls.lock()[0].0, "Adakah ia dibenarkan? tawarruq");
    }

    #[tokio::test]
    async fn test_passthrough_translator() {
        let normalizer = QueryNormalizer::new(Arc::new(PassthroughTranslator), Language::English);
        let query = normalizer.normalize("  Apakah murabahah?  ", &[]).await;
        assert_eq!(query.original, "Apakah murabahah?");
        assert_eq!(query.search_text, "Apakah murabahah?");
    }
}
