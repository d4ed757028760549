use crate::config::{Config, EmbeddingProvider};
use crate::providers::{ProviderError, classify_ollama_error, connect_ollama, ensure_ollama_model};
use async_trait::async_trait;
use ollama_rs::Ollama;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use std::sync::Arc;

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Identifier of the model producing the vectors.
    fn model_name(&self) -> &str;

    /// Make the model usable, downloading it if needed. Calling it again is a no-op.
    async fn ensure_available(&self) -> Result<(), ProviderError>;

    /// Produce an embedding vector for each supplied text, in input order.
    async fn generate_embeddings(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ProviderError>;
}

/// Embedding client backed by a local Ollama runtime.
pub struct OllamaEmbeddingClient {
    ollama: Ollama,
    model: String,
}

impl OllamaEmbeddingClient {
    /// Connect to the runtime at `base_url` using `model` for every request.
    pub fn new(base_url: &str, model: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            ollama: connect_ollama(base_url)?,
            model: model.into(),
        })
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn ensure_available(&self) -> Result<(), ProviderError> {
        ensure_ollama_model(&self.ollama, &self.model).await
    }

    async fn generate_embeddings(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let expected = texts.len();
        tracing::debug!(model = %self.model, texts = expected, "Requesting embeddings");
        let request =
            GenerateEmbeddingsRequest::new(self.model.clone(), EmbeddingsInput::Multiple(texts));
        let response = self
            .ollama
            .generate_embeddings(request)
            .await
            .map_err(|error| classify_ollama_error(&self.model, error))?;

        check_embeddings(expected, &response.embeddings)?;
        Ok(response.embeddings)
    }
}

/// Deterministic embedding client that hashes bytes into a normalized vector.
///
/// Needs no network and no model download; similarity is lexical rather than semantic.
pub struct HashingEmbeddingClient {
    model: String,
    dimension: usize,
}

impl HashingEmbeddingClient {
    /// Construct a hashing embedder producing `dimension`-wide vectors.
    pub fn new(dimension: usize) -> Self {
        Self {
            model: format!("hashing-{dimension}"),
            dimension,
        }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        if text.is_empty() {
            return embedding;
        }

        for word in text.split_whitespace() {
            let normalized = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if normalized.is_empty() {
                continue;
            }
            let slot = fnv1a(normalized.as_bytes()) as usize % dimension;
            embedding[slot] += 1.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

#[async_trait]
impl EmbeddingClient for HashingEmbeddingClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn ensure_available(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn generate_embeddings(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ProviderError> {
        if self.dimension == 0 {
            return Err(ProviderError::Failed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        Ok(texts
            .iter()
            .map(|text| Self::encode(text, self.dimension))
            .collect())
    }
}

/// Verify a provider returned one non-empty vector per input, all of the same width.
///
/// Returns the common dimension.
pub fn check_embeddings(expected: usize, embeddings: &[Vec<f32>]) -> Result<usize, ProviderError> {
    if embeddings.len() != expected {
        return Err(ProviderError::InvalidResponse(format!(
            "expected {expected} embeddings, received {}",
            embeddings.len()
        )));
    }

    let Some(first) = embeddings.first() else {
        return Ok(0);
    };
    let dimension = first.len();
    if dimension == 0 {
        return Err(ProviderError::InvalidResponse(
            "provider returned an empty vector".into(),
        ));
    }
    if let Some(bad) = embeddings.iter().find(|vector| vector.len() != dimension) {
        return Err(ProviderError::InvalidResponse(format!(
            "inconsistent embedding widths: {dimension} and {}",
            bad.len()
        )));
    }
    if embeddings.iter().flatten().any(|value| !value.is_finite()) {
        return Err(ProviderError::InvalidResponse(
            "embedding contains non-finite values".into(),
        ));
    }
    Ok(dimension)
}

/// Build an embedding client suitable for the given configuration.
pub fn get_embedding_client(config: &Config) -> Result<Arc<dyn EmbeddingClient>, ProviderError> {
    match config.embedding_provider {
        EmbeddingProvider::Ollama => Ok(Arc::new(OllamaEmbeddingClient::new(
            &config.ollama_url,
            config.embedding_model.clone(),
        )?)),
        EmbeddingProvider::Hashing => Ok(Arc::new(HashingEmbeddingClient::new(
            config.embedding_dimension,
        ))),
    }
}
