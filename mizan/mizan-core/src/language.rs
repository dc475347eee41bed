//! Language detection for the trilingual working set (Arabic, English, Malay).
//!
//! Detection is heuristic and cheap: Arabic is recognised by script, English by
//! Latin letters, and Malay (which shares the Latin script with English) by
//! whole-word hits against a fixed marker list. Marker hits are whole-word
//! signals, so each one is weighted like [`MARKER_WEIGHT`] characters.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use unicode_segmentation::UnicodeSegmentation;

/// Weight of one Malay marker-word hit relative to one script character.
pub const MARKER_WEIGHT: f32 = 10.0;

/// A language counts towards `is_mixed` / `secondary` above this score.
pub const MIXED_THRESHOLD: f32 = 0.2;

/// Texts with more Latin words than this are judged by marker density.
pub const SHORT_TEXT_WORDS: usize = 5;

/// Share of Latin words that must be Malay markers for a longer text to read
/// as Malay prose.
pub const MALAY_MARKER_DENSITY: f32 = 0.08;

/// Languages of the working set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "ar")]
    Arabic,
    #[serde(rename = "en")]
    English,
    #[serde(rename = "ms")]
    Malay,
}

impl Language {
    /// All languages, in tie-break precedence order.
    pub const ALL: [Language; 3] = [Language::Arabic, Language::Malay, Language::English];

    /// ISO 639-1 code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Arabic => "ar",
            Self::English => "en",
            Self::Malay => "ms",
        }
    }

    /// Human-readable name used in prompts
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Arabic => "العربية (Arabic)",
            Self::English => "English",
            Self::Malay => "Bahasa Melayu",
        }
    }

    /// Parse an ISO 639-1 code.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_lowercase().as_str() {
            "ar" | "ara" | "arabic" => Some(Self::Arabic),
            "en" | "eng" | "english" => Some(Self::English),
            "ms" | "msa" | "may" | "malay" | "id" => Some(Self::Malay),
            _ => None,
        }
    }
}

impl Default for Language {
    fn default() -> Self {
        Self::English
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s).ok_or_else(|| format!("unsupported language: {s}"))
    }
}

/// Relative language scores; they sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LanguageScores {
    pub arabic: f32,
    pub english: f32,
    pub malay: f32,
}

impl LanguageScores {
    pub fn get(&self, language: Language) -> f32 {
        match language {
            Language::Arabic => self.arabic,
            Language::English => self.english,
            Language::Malay => self.malay,
        }
    }

    /// Languages ordered by descending score; ties keep precedence order.
    pub fn ranked(&self) -> Vec<(Language, f32)> {
        let mut ranked: Vec<(Language, f32)> =
            Language::ALL.iter().map(|l| (*l, self.get(*l))).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }
}

/// Result of language detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageDetection {
    pub primary: Language,
    pub secondary: Option<Language>,
    pub is_mixed: bool,
    pub scores: LanguageScores,
}

impl LanguageDetection {
    /// Score of the primary language.
    pub fn confidence(&self) -> f32 {
        self.scores.get(self.primary)
    }

    /// True when `language` is the primary or the secondary language.
    pub fn includes(&self, language: Language) -> bool {
        self.primary == language || self.secondary == Some(language)
    }

    fn default_language() -> Self {
        Self {
            primary: Language::English,
            secondary: None,
            is_mixed: false,
            scores: LanguageScores {
                arabic: 0.0,
                english: 1.0,
                malay: 0.0,
            },
        }
    }
}

// Loanwords shared with English Islamic-finance prose (riba, halal, haram)
// are left out so English questions about them stay English.
static MALAY_MARKERS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // common words
        "adalah", "dengan", "untuk", "yang", "ini", "itu", "boleh", "tidak", "ada", "saya",
        "kita", "dalam", "kepada", "daripada", "seperti", "oleh", "tetapi", "atau", "jika",
        "apabila", "kerana", "supaya",
        // question words
        "apakah", "bagaimana", "mengapa", "siapa", "bila", "adakah", "berapa", "mana",
        "kenapa", "macam",
        // domain vocabulary
        "perbankan", "kewangan", "patuh", "syariah", "faedah", "pinjaman", "pelaburan",
        // verbs
        "mahu", "hendak", "perlu", "ingin", "akan", "telah", "sudah", "sedang", "dapat",
        "bolehkah",
    ]
    .into_iter()
    .collect()
});

/// True for characters of the Arabic script blocks.
pub fn is_arabic_char(c: char) -> bool {
    matches!(c,
        '\u{0600}'..='\u{06FF}'
        | '\u{0750}'..='\u{077F}'
        | '\u{08A0}'..='\u{08FF}'
        | '\u{FB50}'..='\u{FDFF}'
        | '\u{FE70}'..='\u{FEFF}')
}

/// Heuristic detector for Arabic, English and Malay.
#[derive(Debug, Clone)]
pub struct LanguageDetector {
    marker_weight: f32,
    mixed_threshold: f32,
}

impl Default for LanguageDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageDetector {
    pub fn new() -> Self {
        Self {
            marker_weight: MARKER_WEIGHT,
            mixed_threshold: MIXED_THRESHOLD,
        }
    }

    /// Override the marker-hit weight.
    pub fn with_marker_weight(mut self, weight: f32) -> Self {
        self.marker_weight = weight;
        self
    }

    /// Detect the language mix of `text`. Never fails; text without any
    /// script signal is reported as English with full confidence.
    pub fn detect(&self, text: &str) -> LanguageDetection {
        if text.trim().is_empty() {
            return LanguageDetection::default_language();
        }

        let arabic_chars = text.chars().filter(|c| is_arabic_char(*c)).count();
        let latin_chars = text.chars().filter(|c| c.is_ascii_alphabetic()).count();

        let mut latin_words = 0usize;
        let mut marker_hits = 0usize;
        let mut marker_letters = 0usize;
        for word in text.unicode_words() {
            if !word.chars().any(|c| c.is_ascii_alphabetic()) {
                continue;
            }
            latin_words += 1;
            let lower = word.to_lowercase();
            if MALAY_MARKERS.contains(lower.as_str()) {
                marker_hits += 1;
                marker_letters += word.chars().filter(|c| c.is_ascii_alphabetic()).count();
            }
        }

        let arabic = arabic_chars as f32;
        let mut english = latin_chars.saturating_sub(marker_letters) as f32;
        let mut malay = marker_hits as f32 * self.marker_weight;

        // In running Malay prose most words are not markers, so a fixed
        // per-hit weight loses to the letter count as text grows. Past a few
        // words, a dense enough marker share claims the Latin text for Malay.
        if latin_words > SHORT_TEXT_WORDS
            && marker_hits >= 2
            && marker_hits as f32 / latin_words as f32 >= MALAY_MARKER_DENSITY
        {
            malay += english;
            english = 0.0;
        }

        let total = arabic + english + malay;

        if total <= 0.0 {
            return LanguageDetection::default_language();
        }

        let scores = LanguageScores {
            arabic: arabic / total,
            english: english / total,
            malay: malay / total,
        };

        let ranked = scores.ranked();
        let primary = ranked[0].0;
        let secondary = ranked
            .get(1)
            .filter(|(_, score)| *score > self.mixed_threshold)
            .map(|(lang, _)| *lang);
        let is_mixed = ranked
            .iter()
            .filter(|(_, score)| *score > self.mixed_threshold)
            .count()
            > 1;

        LanguageDetection {
            primary,
            secondary,
            is_mixed,
            scores,
        }
    }
}

/// Primary language of `text` using the default detector.
pub fn detect_language(text: &str) -> Language {
    LanguageDetector::new().detect(text).primary
}
