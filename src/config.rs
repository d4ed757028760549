use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_GENERATION_MODEL: &str = "llama3.2";
const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
const DEFAULT_DOC_PATH: &str = "./data/document.pdf";
const DEFAULT_PERSIST_DIRECTORY: &str = "./vector_db";
const DEFAULT_COLLECTION_NAME: &str = "simple-rag";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// Values parsed individually but contradict each other.
    #[error("Inconsistent configuration: {0}")]
    Inconsistent(String),
}

/// Runtime configuration for the question-answering pipeline.
///
/// Built once at process start and handed to each component by value or reference; nothing
/// reads configuration from globals.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the Ollama runtime serving both models.
    pub ollama_url: String,
    /// Model used for query expansion and answer synthesis.
    pub generation_model: String,
    /// Backend used to produce embedding vectors.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Vector width produced by the hashing embedder.
    pub embedding_dimension: usize,
    /// Number of chunk texts sent per embedding request during ingest.
    pub embedding_batch_size: usize,
    /// Document that gets ingested.
    pub doc_path: PathBuf,
    /// Directory holding persisted collections.
    pub persist_directory: PathBuf,
    /// Name of the collection for the ingested document.
    pub collection_name: String,
    /// Chunking parameters.
    pub chunking: ChunkingConfig,
    /// Multi-query retrieval parameters.
    pub retrieval: RetrievalConfig,
    /// Upper bound for each embedding or generation call.
    pub request_timeout: Duration,
    /// Upper bound for making a model available (may include a download).
    pub model_pull_timeout: Duration,
}

/// Parameters for splitting documents into overlapping windows.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks.
    pub chunk_overlap: usize,
    /// How far before the hard cut a natural breakpoint may be used.
    pub break_tolerance: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1200,
            chunk_overlap: 300,
            break_tolerance: 120,
        }
    }
}

/// Parameters controlling how a question fans out into searches.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct RetrievalConfig {
    /// Query variants searched per question, the original question included.
    pub variants_per_query: usize,
    /// Nearest neighbours fetched for every variant.
    pub results_per_variant: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            variants_per_query: 5,
            results_per_variant: 4,
        }
    }
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic byte-hashing embedder that needs no network.
    Hashing,
}

impl Config {
    /// Load `.env` (if present) and then read configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config = Self::from_env()?;
        tracing::debug!(
            ollama_url = %config.ollama_url,
            generation_model = %config.generation_model,
            embedding_provider = ?config.embedding_provider,
            embedding_model = %config.embedding_model,
            collection = %config.collection_name,
            persist_directory = %config.persist_directory.display(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Read configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let text = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let chunking_defaults = ChunkingConfig::default();
        let retrieval_defaults = RetrievalConfig::default();

        let config = Self {
            ollama_url: text("OLLAMA_URL", DEFAULT_OLLAMA_URL),
            generation_model: text("GENERATION_MODEL", DEFAULT_GENERATION_MODEL),
            embedding_provider: match get("EMBEDDING_PROVIDER") {
                Some(value) => value
                    .parse()
                    .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".into()))?,
                None => EmbeddingProvider::Ollama,
            },
            embedding_model: text("EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
            embedding_dimension: parse_or(&get, "EMBEDDING_DIMENSION", 384)?,
            embedding_batch_size: parse_or(&get, "EMBEDDING_BATCH_SIZE", 32)?,
            doc_path: PathBuf::from(text("DOC_PATH", DEFAULT_DOC_PATH)),
            persist_directory: PathBuf::from(text("PERSIST_DIRECTORY", DEFAULT_PERSIST_DIRECTORY)),
            collection_name: text("COLLECTION_NAME", DEFAULT_COLLECTION_NAME),
            chunking: ChunkingConfig {
                chunk_size: parse_or(&get, "CHUNK_SIZE", chunking_defaults.chunk_size)?,
                chunk_overlap: parse_or(&get, "CHUNK_OVERLAP", chunking_defaults.chunk_overlap)?,
                break_tolerance: parse_or(
                    &get,
                    "CHUNK_BREAK_TOLERANCE",
                    chunking_defaults.break_tolerance,
                )?,
            },
            retrieval: RetrievalConfig {
                variants_per_query: parse_or(
                    &get,
                    "QUERY_VARIANTS",
                    retrieval_defaults.variants_per_query,
                )?,
                results_per_variant: parse_or(
                    &get,
                    "RESULTS_PER_VARIANT",
                    retrieval_defaults.results_per_variant,
                )?,
            },
            request_timeout: Duration::from_secs(parse_or(&get, "REQUEST_TIMEOUT_SECS", 120)?),
            model_pull_timeout: Duration::from_secs(parse_or(
                &get,
                "MODEL_PULL_TIMEOUT_SECS",
                900,
            )?),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunking.chunk_size == 0 {
            return Err(ConfigError::Inconsistent(
                "CHUNK_SIZE must be greater than zero".into(),
            ));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(ConfigError::Inconsistent(format!(
                "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.retrieval.variants_per_query == 0 {
            return Err(ConfigError::Inconsistent(
                "QUERY_VARIANTS must be at least 1 (the original question)".into(),
            ));
        }
        if self.retrieval.results_per_variant == 0 {
            return Err(ConfigError::Inconsistent(
                "RESULTS_PER_VARIANT must be greater than zero".into(),
            ));
        }
        if self.embedding_batch_size == 0 {
            return Err(ConfigError::Inconsistent(
                "EMBEDDING_BATCH_SIZE must be greater than zero".into(),
            ));
        }
        if self.embedding_provider == EmbeddingProvider::Hashing && self.embedding_dimension == 0 {
            return Err(ConfigError::Inconsistent(
                "EMBEDDING_DIMENSION must be greater than zero".into(),
            ));
        }
        if self.collection_name.contains(['/', '\\']) || self.collection_name.starts_with('.') {
            return Err(ConfigError::InvalidValue("COLLECTION_NAME".into()));
        }
        Ok(())
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "hashing" | "hash" => Ok(Self::Hashing),
            _ => Err(()),
        }
    }
}
