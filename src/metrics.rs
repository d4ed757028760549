use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingest and question activity.
#[derive(Default)]
pub struct PipelineMetrics {
    embedding_requests: AtomicU64,
    texts_embedded: AtomicU64,
    chunks_indexed: AtomicU64,
    collections_built: AtomicU64,
    collections_reused: AtomicU64,
    questions_answered: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one call to the embedding provider covering `texts` inputs.
    pub fn record_embedding_request(&self, texts: u64) {
        self.embedding_requests.fetch_add(1, Ordering::Relaxed);
        self.texts_embedded.fetch_add(texts, Ordering::Relaxed);
    }

    /// Record a freshly built collection and its chunk count.
    pub fn record_build(&self, chunk_count: u64) {
        self.collections_built.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record that an existing collection was reopened instead of rebuilt.
    pub fn record_reuse(&self) {
        self.collections_reused.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a question that produced an answer.
    pub fn record_answer(&self) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            embedding_requests: self.embedding_requests.load(Ordering::Relaxed),
            texts_embedded: self.texts_embedded.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            collections_built: self.collections_built.load(Ordering::Relaxed),
            collections_reused: self.collections_reused.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Calls made to the embedding provider.
    pub embedding_requests: u64,
    /// Individual texts sent for embedding across all calls.
    pub texts_embedded: u64,
    /// Chunks written into freshly built collections.
    pub chunks_indexed: u64,
    /// Collections built from scratch.
    pub collections_built: u64,
    /// Collections reopened from disk.
    pub collections_reused: u64,
    /// Questions that reached an answer.
    pub questions_answered: u64,
}
