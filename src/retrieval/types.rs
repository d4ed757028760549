//! Data types and errors for the question-answering side of the pipeline.

use crate::processing::types::Chunk;
use crate::providers::ProviderError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors raised while gathering context for a question.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Query expansion failed in a way that points at configuration rather than load.
    #[error("Query expansion failed: {0}")]
    Expansion(#[source] ProviderError),
    /// Embedding a query variant failed.
    #[error("Failed to embed query variant: {0}")]
    Embedding(#[source] ProviderError),
    /// Searching the collection failed.
    #[error("Vector search failed: {0}")]
    Store(#[from] StoreError),
}

/// Errors raised while synthesizing an answer.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The generation provider failed.
    #[error("Answer generation failed: {0}")]
    Provider(#[from] ProviderError),
    /// The model answered with nothing but whitespace.
    #[error("Generation model returned an empty answer")]
    EmptyResponse,
}

/// A chunk found by searching with one query variant.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    /// Retrieved chunk.
    pub chunk: Chunk,
    /// Similarity to the variant that first found it. Not comparable across variants.
    pub score: f32,
    /// Index into [`ContextSet::variants`] of the variant that first found it.
    pub variant: usize,
}

/// Deduplicated chunks gathered for one question.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextSet {
    /// The question as asked.
    pub query: String,
    /// Variants searched, the original question first.
    pub variants: Vec<String>,
    /// Unique chunks grouped by the variant that first found them.
    pub chunks: Vec<RetrievedChunk>,
    /// Whether expansion failed and only the original question was searched.
    pub expansion_degraded: bool,
}

impl ContextSet {
    /// Whether retrieval found nothing.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of unique chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Chunk texts in presentation order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.chunks.iter().map(|retrieved| retrieved.chunk.text.as_str())
    }
}
