//! Extraction tiers, ordered from cheapest to most expensive.

pub mod digital;
pub mod ocr;
pub mod premium;

pub use digital::DigitalTier;
pub use ocr::OcrTier;
pub use premium::PremiumOcrTier;

use mizan_core::types::PageText;

/// Split text on form feeds into ordered pages. A trailing empty page left
/// by a final form feed is dropped.
pub(crate) fn split_form_feeds(text: &str) -> Vec<PageText> {
    let mut pages: Vec<&str> = text.split('\u{c}').collect();
    if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
        pages.pop();
    }
    PageText::from_pages(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_form_feeds() {
        let pages = split_form_feeds("one\u{c}two\u{c}");
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].text, "two");
        assert_eq!(pages[1].total_pages, 2);

        let pages = split_form_feeds("single page");
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].page_number, 1);
    }
}
