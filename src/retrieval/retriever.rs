//! Multi-query retrieval.
//!
//! A single nearest-neighbour search is sensitive to phrasing. The retriever searches with the
//! original question plus several generated rephrasings, then merges the hits. Scores from
//! different variants are not comparable, so the merged set is never re-ranked globally: it is
//! grouped by the variant that first found each chunk, and within a group ordered by that
//! variant's score. More variants and a larger `k` raise recall at the cost of more embedding
//! calls.

use crate::embedding::{EmbeddingClient, check_embeddings};
use crate::providers::{ProviderError, with_timeout};
use crate::store::{Collection, ScoredChunk};
use futures_util::future::try_join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use super::expander::QueryExpander;
use super::types::{ContextSet, RetrievalError, RetrievedChunk};

/// Retrieves context for a question by searching with several phrasings of it.
#[derive(Clone)]
pub struct MultiQueryRetriever {
    expander: QueryExpander,
    embedder: Arc<dyn EmbeddingClient>,
    timeout: Duration,
}

impl MultiQueryRetriever {
    /// Retriever that expands with `expander` and embeds with `embedder`, bounding each
    /// embedding call by `timeout`.
    pub fn new(expander: QueryExpander, embedder: Arc<dyn EmbeddingClient>, timeout: Duration) -> Self {
        Self {
            expander,
            embedder,
            timeout,
        }
    }

    /// Gather deduplicated context for `query` from `collection`.
    ///
    /// The original question counts as one of the `variants_per_query` variants; the rest are
    /// generated. Each variant is searched for `k_per_variant` neighbours and searches run
    /// concurrently. An empty result is returned as an empty [`ContextSet`] and logged, never
    /// hidden.
    pub async fn retrieve(
        &self,
        query: &str,
        collection: &Collection,
        variants_per_query: usize,
        k_per_variant: usize,
    ) -> Result<ContextSet, RetrievalError> {
        let original = query.trim().to_string();
        let (generated, expansion_degraded) =
            match self.expander.expand(&original, variants_per_query.saturating_sub(1)).await {
                Ok(expansion) => (expansion.variants, expansion.degraded),
                Err(error) if is_configuration_error(&error) => {
                    return Err(RetrievalError::Expansion(error));
                }
                Err(error) => {
                    tracing::warn!(error = %error, "Query expansion failed; searching with the original question only");
                    (Vec::new(), true)
                }
            };

        let mut variants = merge_variants(original.clone(), generated);
        variants.truncate(variants_per_query.max(1));
        tracing::debug!(
            collection = collection.name(),
            variants = variants.len(),
            k = k_per_variant,
            "Searching with query variants"
        );

        let searches = variants
            .iter()
            .map(|variant| self.search_variant(variant, collection, k_per_variant));
        let per_variant = try_join_all(searches).await?;

        let chunks = dedupe_hits(per_variant);
        let total_hits = chunks.len();
        if chunks.is_empty() {
            tracing::warn!(collection = collection.name(), "Retrieval found no context for the question");
        } else {
            tracing::info!(
                collection = collection.name(),
                variants = variants.len(),
                unique_chunks = total_hits,
                "Context retrieved"
            );
        }

        Ok(ContextSet {
            query: original,
            variants,
            chunks,
            expansion_degraded,
        })
    }

    async fn search_variant(
        &self,
        variant: &str,
        collection: &Collection,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, RetrievalError> {
        let vectors = with_timeout(
            self.timeout,
            "query embedding",
            self.embedder.generate_embeddings(vec![variant.to_string()]),
        )
        .await
        .map_err(RetrievalError::Embedding)?;
        check_embeddings(1, &vectors).map_err(RetrievalError::Embedding)?;

        let vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| RetrievalError::Embedding(ProviderError::InvalidResponse("no vector returned".into())))?;
        Ok(collection.search(&vector, k)?)
    }
}

/// Configuration mistakes are reported; load or output problems degrade to the original query.
fn is_configuration_error(error: &ProviderError) -> bool {
    matches!(
        error,
        ProviderError::ModelNotFound(_) | ProviderError::InvalidEndpoint(_)
    )
}

/// Original question first, then generated variants not already present.
fn merge_variants(original: String, generated: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    seen.insert(original.to_lowercase());
    let mut variants = vec![original];
    for variant in generated {
        if seen.insert(variant.trim().to_lowercase()) {
            variants.push(variant);
        }
    }
    variants
}

/// Union hits by chunk identity, keeping the first variant that found each chunk.
fn dedupe_hits(per_variant: Vec<Vec<ScoredChunk>>) -> Vec<RetrievedChunk> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();

    for (variant, hits) in per_variant.into_iter().enumerate() {
        for hit in hits {
            if seen.insert(hit.chunk.id.clone()) {
                merged.push(RetrievedChunk {
                    chunk: hit.chunk,
                    score: hit.score,
                    variant,
                });
            }
        }
    }

    merged
}
