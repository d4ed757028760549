//! Sliding-window chunking with soft boundaries.
//!
//! Windows advance through the concatenated document text by `size - overlap` characters.
//! A window normally ends at exactly `size` characters, but when a paragraph break, sentence
//! end, or line break sits within `break_tolerance` characters before that cut, the window
//! ends there instead. The next window always starts exactly `overlap` characters before the
//! previous one ended, so consecutive chunks share precisely `overlap` characters and their
//! union covers the whole text. Lengths are counted in `char`s, never bytes.

use crate::config::ChunkingConfig;
use sha2::{Digest, Sha256};
use std::ops::Range;

use super::types::{Chunk, ChunkingError, Document};

/// Splits documents into overlapping, bounded chunks.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    size: usize,
    overlap: usize,
    tolerance: usize,
}

impl Chunker {
    /// Validate parameters and build a chunker.
    ///
    /// The tolerance is clamped so every window stays longer than the overlap, which keeps the
    /// window moving forward.
    pub fn new(config: ChunkingConfig) -> Result<Self, ChunkingError> {
        let ChunkingConfig {
            chunk_size: size,
            chunk_overlap: overlap,
            break_tolerance,
        } = config;
        if size == 0 || overlap >= size {
            return Err(ChunkingError::InvalidParameters { size, overlap });
        }

        Ok(Self {
            size,
            overlap,
            tolerance: break_tolerance.min(size - overlap - 1),
        })
    }

    /// Split `document` into chunks in reading order.
    pub fn split(&self, document: &Document) -> Result<Vec<Chunk>, ChunkingError> {
        if !document.has_text() {
            return Err(ChunkingError::EmptyDocument);
        }

        let (text, segment_ranges) = document.concatenated();
        let chars: Vec<char> = text.chars().collect();

        let chunks: Vec<Chunk> = self
            .windows(&chars)
            .into_iter()
            .enumerate()
            .map(|(index, window)| {
                let text: String = chars[window.clone()].iter().collect();
                Chunk {
                    id: chunk_id(window.start, &text),
                    index,
                    start: window.start,
                    char_len: window.len(),
                    pages: pages_for(&window, &segment_ranges, document),
                    text,
                }
            })
            .collect();

        tracing::debug!(
            source = %document.source.display(),
            chunks = chunks.len(),
            size = self.size,
            overlap = self.overlap,
            "Document split into chunks"
        );
        Ok(chunks)
    }

    fn windows(&self, chars: &[char]) -> Vec<Range<usize>> {
        let total = chars.len();
        let mut windows = Vec::new();
        let mut start = 0;

        loop {
            let hard_end = start + self.size;
            if hard_end >= total {
                windows.push(start..total);
                break;
            }

            let earliest = hard_end - self.tolerance;
            let end = find_breakpoint(chars, earliest, hard_end).unwrap_or(hard_end);
            windows.push(start..end);
            start = end - self.overlap;
        }

        windows
    }
}

/// Best natural window end within `earliest..=latest`, scanning backwards from `latest`.
///
/// Paragraph breaks win over sentence ends, which win over plain line breaks. The returned
/// position is exclusive: the break characters stay with the earlier chunk.
fn find_breakpoint(chars: &[char], earliest: usize, latest: usize) -> Option<usize> {
    let candidates = || (earliest.max(2)..=latest).rev();

    let paragraph = candidates().find(|&end| chars[end - 1] == '\n' && chars[end - 2] == '\n');
    if paragraph.is_some() {
        return paragraph;
    }

    let sentence = candidates()
        .find(|&end| chars[end - 1].is_whitespace() && matches!(chars[end - 2], '.' | '!' | '?'));
    if sentence.is_some() {
        return sentence;
    }

    candidates().find(|&end| chars[end - 1] == '\n')
}

fn pages_for(window: &Range<usize>, segment_ranges: &[Range<usize>], document: &Document) -> Vec<usize> {
    segment_ranges
        .iter()
        .zip(&document.segments)
        .filter(|(range, _)| !range.is_empty() && range.start < window.end && window.start < range.end)
        .map(|(_, segment)| segment.page)
        .collect()
}

/// Deterministic identity for a chunk: SHA-256 over its start offset and text.
pub fn chunk_id(start: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(start.to_le_bytes());
    hasher.update(b":");
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
