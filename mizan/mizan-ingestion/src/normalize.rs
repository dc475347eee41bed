//! Text normalization for Arabic script and OCR output.
//!
//! Normalization is applied to OCR output and to text sent to the embedder.
//! Stored chunk text is never normalized, so offsets stay exact.

use once_cell::sync::Lazy;
use regex::Regex;

static HORIZONTAL_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\u{00A0}]+").unwrap());
static PAGE_NUMBER_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\-–—\s]*(?:page\s+)?[0-9\u{0660}-\u{0669}]{1,4}[\-–—\s]*$").unwrap()
});
static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static ANY_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Fold Arabic orthographic variants into one canonical form.
///
/// Strips tashkeel (U+064B..U+0652) and the superscript alef (U+0670),
/// unifies alef variants to bare alef, maps alef maqsura to ya, drops tatweel
/// and converts Eastern Arabic digits to ASCII.
pub fn normalize_arabic(text: &str) -> String {
    text.chars()
        .filter_map(|c| match c {
            '\u{064B}'..='\u{0652}' | '\u{0670}' | '\u{0640}' => None,
            'إ' | 'أ' | 'ٱ' | 'آ' => Some('ا'),
            'ى' => Some('ي'),
            '\u{0660}'..='\u{0669}' => char::from_digit(c as u32 - 0x0660, 10),
            '\u{06F0}'..='\u{06F9}' => char::from_digit(c as u32 - 0x06F0, 10),
            other => Some(other),
        })
        .collect()
}

/// Remove common OCR noise: runs of spaces, standalone page numbers and
/// long blank stretches.
pub fn clean_ocr_artifacts(text: &str) -> String {
    let lines: Vec<String> = text
        .lines()
        .map(|line| HORIZONTAL_WS.replace_all(line.trim(), " ").into_owned())
        .filter(|line| !PAGE_NUMBER_LINE.is_match(&line.to_lowercase()))
        .collect();

    let joined = lines.join("\n");
    BLANK_RUNS.replace_all(joined.trim(), "\n\n").into_owned()
}

/// Text representation handed to the embedding model.
pub fn prepare_for_embedding(text: &str) -> String {
    let normalized = normalize_arabic(text);
    ANY_WS.replace_all(normalized.trim(), " ").into_owned()
}
