//! Page-aware, sentence-bounded chunking with overlap.
//!
//! Pages are concatenated with a `"\n\n"` separator (attributed to the page
//! before it) and walked in windows of `target_size` characters. A window is
//! cut after the last sentence terminator in its final 20%, falling back to
//! the last whitespace there and finally to the raw window edge. The next
//! chunk starts `overlap` characters before the cut, moved forward to the
//! first sentence start (or word start) inside the overlap. All offsets are
//! in characters, and every chunk's text is exactly
//! `full_text[start_offset..end_offset]`.

use mizan_core::config::ChunkingConfig;
use mizan_core::error::{MizanError, Result};
use mizan_core::id::{ChunkId, DocumentId};
use mizan_core::language::LanguageDetector;
use mizan_core::types::{Chunk, PageText};

/// Characters that end a sentence when followed by whitespace.
pub const SENTENCE_TERMINATORS: &[char] = &['.', '?', '!', '؟', '۔', '。'];

/// Separator inserted between pages.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Metadata copied onto every chunk of a document.
#[derive(Debug, Clone)]
pub struct ChunkContext {
    pub document_id: DocumentId,
    pub source_label: String,
    pub title: String,
    pub extraction_degraded: bool,
}

/// Concatenated page text with page start offsets.
#[derive(Debug, Clone)]
pub struct PagedText {
    chars: Vec<char>,
    page_starts: Vec<usize>,
    page_numbers: Vec<u32>,
    total_pages: u32,
}

impl PagedText {
    pub fn new(pages: &[PageText]) -> Self {
        let mut chars = Vec::new();
        let mut page_starts = Vec::with_capacity(pages.len());
        let mut page_numbers = Vec::with_capacity(pages.len());

        for (i, page) in pages.iter().enumerate() {
            page_starts.push(chars.len());
            page_numbers.push(page.page_number);
            chars.extend(page.text.chars());
            if i + 1 < pages.len() {
                chars.extend(PAGE_SEPARATOR.chars());
            }
        }

        let total_pages = pages
            .iter()
            .map(|p| p.total_pages)
            .max()
            .unwrap_or(0)
            .max(pages.len() as u32);

        Self {
            chars,
            page_starts,
            page_numbers,
            total_pages,
        }
    }

    /// Number of characters.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// The characters `[start, end)` as a string.
    pub fn slice(&self, start: usize, end: usize) -> String {
        self.chars[start..end].iter().collect()
    }

    /// Full concatenated text.
    pub fn text(&self) -> String {
        self.chars.iter().collect()
    }

    /// Page number covering `offset`.
    pub fn page_at(&self, offset: usize) -> u32 {
        let idx = self.page_starts.partition_point(|start| *start <= offset);
        self.page_numbers
            .get(idx.saturating_sub(1))
            .copied()
            .unwrap_or(1)
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }
}

/// Splits page text into overlapping, sentence-clean chunks.
#[derive(Debug, Clone)]
pub struct SentenceChunker {
    target_size: usize,
    overlap: usize,
    detector: LanguageDetector,
}

impl SentenceChunker {
    /// Create a chunker; `overlap` must be smaller than `target_size`.
    pub fn new(target_size: usize, overlap: usize) -> Result<Self> {
        if target_size == 0 {
            return Err(MizanError::invalid_input("chunk target size must be greater than 0"));
        }
        if overlap >= target_size {
            return Err(MizanError::invalid_input(format!(
                "chunk overlap ({}) must be smaller than target size ({})",
                overlap, target_size
            )));
        }
        Ok(Self {
            target_size,
            overlap,
            detector: LanguageDetector::new(),
        })
    }

    /// Default chunker with 1000 char chunks and 200 char overlap
    pub fn default_config() -> Self {
        Self {
            target_size: 1000,
            overlap: 200,
            detector: LanguageDetector::new(),
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.target_size, config.overlap)
    }

    pub fn target_size(&self) -> usize {
        self.target_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Chunk a document's pages.
    pub fn chunk(&self, pages: &[PageText], context: &ChunkContext) -> Vec<Chunk> {
        let paged = PagedText::new(pages);
        self.chunk_ranges(&paged)
            .into_iter()
            .enumerate()
            .map(|(sequence_index, (start, end))| {
                let text = paged.slice(start, end);
                let language = self.detector.detect(&text).primary;
                Chunk {
                    chunk_id: ChunkId::derive(context.document_id, sequence_index),
                    document_id: context.document_id,
                    text,
                    page_number: paged.page_at(start),
                    total_pages: paged.total_pages(),
                    language,
                    source_label: context.source_label.clone(),
                    title: context.title.clone(),
                    sequence_index,
                    start_offset: start,
                    end_offset: end,
                    extraction_degraded: context.extraction_degraded,
                }
            })
            .collect()
    }

    /// Character ranges of the chunks, in order.
    pub fn chunk_ranges(&self, paged: &PagedText) -> Vec<(usize, usize)> {
        let chars = &paged.chars;
        let n = chars.len();
        let mut ranges = Vec::new();

        let Some(mut start) = chars.iter().position(|c| !c.is_whitespace()) else {
            return ranges;
        };

        loop {
            let window_end = start + self.target_size;
            let end = if window_end >= n {
                n
            } else {
                self.find_cut(chars, start, window_end)
            };

            if chars[start..end].iter().any(|c| !c.is_whitespace()) {
                ranges.push((start, end));
            }

            if end >= n {
                break;
            }

            let overlap_start = end.saturating_sub(self.overlap).max(start + 1);
            start = next_start(chars, overlap_start, end);
        }

        ranges
    }

    /// Cut position for the window `[start, window_end)`; always `> start`.
    fn find_cut(&self, chars: &[char], start: usize, window_end: usize) -> usize {
        let search_len = (self.target_size / 5).max(1);
        let region_start = window_end.saturating_sub(search_len).max(start + 1);

        for i in (region_start..window_end).rev() {
            if is_sentence_end(chars, i) {
                return skip_whitespace(chars, i + 1, chars.len());
            }
        }

        for i in (region_start..window_end).rev() {
            if chars[i].is_whitespace() {
                return i + 1;
            }
        }

        window_end
    }
}

impl Default for SentenceChunker {
    fn default() -> Self {
        Self::default_config()
    }
}

/// True when `chars[i]` is a terminator followed by whitespace.
fn is_sentence_end(chars: &[char], i: usize) -> bool {
    SENTENCE_TERMINATORS.contains(&chars[i])
        && chars.get(i + 1).is_some_and(|c| c.is_whitespace())
}

fn skip_whitespace(chars: &[char], mut pos: usize, limit: usize) -> usize {
    while pos < limit && chars[pos].is_whitespace() {
        pos += 1;
    }
    pos
}

/// Start of the next chunk within `[overlap_start, cut]`: after the first
/// sentence end in the overlap, else the first word start, else
/// `overlap_start` itself.
fn next_start(chars: &[char], overlap_start: usize, cut: usize) -> usize {
    for i in overlap_start..cut {
        if is_sentence_end(chars, i) {
            return skip_whitespace(chars, i + 1, cut);
        }
    }

    for i in overlap_start..cut {
        let at_word_start = !chars[i].is_whitespace() && (i == 0 || chars[i - 1].is_whitespace());
        if at_word_start {
            return i;
        }
    }

    overlap_start
}
