//! Core data types and error definitions for the ingest side of the pipeline.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while turning a document into chunks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    /// Chunk length and overlap do not describe a forward-moving window.
    #[error("invalid chunk parameters: size {size}, overlap {overlap} (overlap must be smaller than size)")]
    InvalidParameters {
        /// Requested maximum chunk length.
        size: usize,
        /// Requested overlap.
        overlap: usize,
    },
    /// The document has no extractable text.
    #[error("document contains no extractable text")]
    EmptyDocument,
}

/// One ordered piece of loader output, usually a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Extracted text.
    pub text: String,
    /// 1-based page number reported by the loader.
    pub page: usize,
}

/// Ordered text segments of a single source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Where the text came from.
    pub source: PathBuf,
    /// Segments in reading order.
    pub segments: Vec<Segment>,
}

impl Document {
    /// Separator placed between segments when they are concatenated.
    pub const SEGMENT_SEPARATOR: &'static str = "\n\n";

    /// Construct a document from already-extracted segments.
    pub fn new(source: impl Into<PathBuf>, segments: Vec<Segment>) -> Self {
        Self {
            source: source.into(),
            segments,
        }
    }

    /// Whether any segment carries non-whitespace text.
    pub fn has_text(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| !segment.text.trim().is_empty())
    }

    /// Full text with segments joined by [`Self::SEGMENT_SEPARATOR`], plus each segment's
    /// character range inside it.
    pub fn concatenated(&self) -> (String, Vec<Range<usize>>) {
        let mut text = String::new();
        let mut ranges = Vec::with_capacity(self.segments.len());
        let mut cursor = 0;

        for (index, segment) in self.segments.iter().enumerate() {
            if index > 0 {
                text.push_str(Self::SEGMENT_SEPARATOR);
                cursor += Self::SEGMENT_SEPARATOR.chars().count();
            }
            let len = segment.text.chars().count();
            text.push_str(&segment.text);
            ranges.push(cursor..cursor + len);
            cursor += len;
        }

        (text, ranges)
    }
}

/// Contiguous text window that is the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable identity derived from position and content.
    pub id: String,
    /// Position of the chunk in document order.
    pub index: usize,
    /// Character offset of the first character within the concatenated document.
    pub start: usize,
    /// Length in characters.
    pub char_len: usize,
    /// Pages the chunk was drawn from.
    pub pages: Vec<usize>,
    /// Chunk text.
    pub text: String,
}
