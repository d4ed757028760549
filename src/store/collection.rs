//! In-memory view of a fully built collection and brute-force similarity search.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::processing::types::Chunk;

use super::types::{CollectionManifest, DistanceMetric, ScoredChunk, StoreError, StoredRecord};

/// A complete, read-only collection.
///
/// Cloning is cheap; records are shared behind an `Arc`, so concurrent questions can search the
/// same collection without locking.
#[derive(Debug, Clone)]
pub struct Collection {
    path: PathBuf,
    manifest: CollectionManifest,
    records: Arc<Vec<StoredRecord>>,
}

impl Collection {
    pub(crate) fn new(path: PathBuf, manifest: CollectionManifest, records: Vec<StoredRecord>) -> Self {
        Self {
            path,
            manifest,
            records: Arc::new(records),
        }
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.manifest.collection
    }

    /// Directory the collection is persisted in.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Manifest describing the collection.
    pub fn manifest(&self) -> &CollectionManifest {
        &self.manifest
    }

    /// Number of stored chunks.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the collection holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Stored chunks in document order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.records.iter().map(|record| &record.chunk)
    }

    /// Return up to `k` chunks closest to `query`, best first.
    ///
    /// Ties keep document order so results are deterministic.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, StoreError> {
        if query.len() != self.manifest.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.manifest.dimension,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .records
            .iter()
            .enumerate()
            .map(|(position, record)| (position, self.similarity(&record.vector, query)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(position, score)| ScoredChunk {
                chunk: self.records[position].chunk.clone(),
                score,
            })
            .collect())
    }

    fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        match self.manifest.metric {
            DistanceMetric::Cosine => cosine_similarity(a, b),
        }
    }
}

/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
