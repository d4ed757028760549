//! Shared types used by the vector store.

use crate::processing::types::Chunk;
use crate::providers::ProviderError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Version written into every manifest; bumped when the on-disk layout changes.
pub const FORMAT_VERSION: u32 = 1;

/// Errors returned while building, opening, or searching collections.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The embedding provider failed or returned unusable vectors.
    #[error("Embedding service failed: {0}")]
    EmbeddingService(#[source] ProviderError),
    /// Reading or writing persisted data failed.
    #[error("Storage error at {}: {source}", .path.display())]
    Storage {
        /// Path involved in the failing operation.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// A persisted collection exists but is incomplete or unreadable.
    #[error("Collection at {} is corrupt: {reason}", .path.display())]
    Corrupt {
        /// Collection directory.
        path: PathBuf,
        /// What failed validation.
        reason: String,
    },
    /// The collection was built with another embedding model; vectors are not comparable.
    #[error(
        "Collection '{collection}' was built with embedding model '{built_with}' but '{configured}' is configured; rebuild the collection"
    )]
    ModelMismatch {
        /// Collection name.
        collection: String,
        /// Model recorded in the manifest.
        built_with: String,
        /// Model currently configured.
        configured: String,
    },
    /// A query vector does not match the collection's dimensionality.
    #[error("Query vector has {actual} dimensions, collection expects {expected}")]
    DimensionMismatch {
        /// Dimension stored in the manifest.
        expected: usize,
        /// Dimension of the supplied vector.
        actual: usize,
    },
    /// Nothing to index.
    #[error("Cannot build collection '{0}' from zero chunks")]
    NoChunks(String),
}

impl StoreError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Similarity metric used when the collection was indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Cosine similarity; higher is closer.
    Cosine,
}

/// Description of a persisted collection, written after every record is on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionManifest {
    /// On-disk layout version.
    pub format_version: u32,
    /// Collection name.
    pub collection: String,
    /// Embedding model that produced every stored vector.
    pub embedding_model: String,
    /// Width of every stored vector.
    pub dimension: usize,
    /// Number of records in `records.jsonl`.
    pub chunk_count: usize,
    /// Metric the vectors are compared with.
    pub metric: DistanceMetric,
    /// RFC 3339 build timestamp.
    pub created_at: String,
}

/// One persisted chunk with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Chunk text and metadata.
    pub chunk: Chunk,
    /// Embedding of `chunk.text`.
    pub vector: Vec<f32>,
}

/// Chunk returned by a similarity search together with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    /// Matched chunk.
    pub chunk: Chunk,
    /// Similarity to the query vector under the collection's metric.
    pub score: f32,
}

/// Tuning knobs for [`super::VectorStore::build`].
#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    /// Chunk texts sent per embedding request.
    pub batch_size: usize,
    /// Budget for each embedding request.
    pub request_timeout: std::time::Duration,
}

/// Summary of a `build` call.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    /// Built or reopened collection.
    pub collection: super::Collection,
    /// `true` when an existing collection was reopened and nothing was embedded. A build that
    /// embedded and then found another build's collection already published reports `false`.
    pub reused: bool,
    /// Calls made to the embedding provider.
    pub embedding_requests: usize,
}
