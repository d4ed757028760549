//! Text-generation providers used for query expansion and answer synthesis.
//!
//! The Ollama-backed client mirrors the embedding adapter: one `ollama-rs` handle, an explicit
//! availability step, and errors folded into [`ProviderError`].

use crate::config::Config;
use crate::providers::{ProviderError, classify_ollama_error, connect_ollama, ensure_ollama_model};
use async_trait::async_trait;
use ollama_rs::Ollama;
use ollama_rs::generation::completion::request::GenerationRequest;
use std::sync::Arc;

/// Prompt passed to the generation provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    /// Prompt text, fully rendered.
    pub prompt: String,
}

impl CompletionRequest {
    /// Request carrying `prompt` as the only turn.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

/// Interface implemented by text-generation providers.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Identifier of the model producing completions.
    fn model_name(&self) -> &str;

    /// Make the model usable, downloading it if needed. Calling it again is a no-op.
    async fn ensure_available(&self) -> Result<(), ProviderError>;

    /// Generate raw completion text for the request.
    async fn generate(&self, request: CompletionRequest) -> Result<String, ProviderError>;
}

/// Generation client backed by a local Ollama runtime.
pub struct OllamaGenerationClient {
    ollama: Ollama,
    model: String,
}

impl OllamaGenerationClient {
    /// Connect to the runtime at `base_url` using `model` for every request.
    pub fn new(base_url: &str, model: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            ollama: connect_ollama(base_url)?,
            model: model.into(),
        })
    }
}

#[async_trait]
impl GenerationClient for OllamaGenerationClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn ensure_available(&self) -> Result<(), ProviderError> {
        ensure_ollama_model(&self.ollama, &self.model).await
    }

    async fn generate(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        tracing::debug!(model = %self.model, prompt_chars = request.prompt.len(), "Requesting completion");

        let response = self
            .ollama
            .generate(GenerationRequest::new(self.model.clone(), request.prompt))
            .await
            .map_err(|error| classify_ollama_error(&self.model, error))?;

        Ok(response.response)
    }
}

/// Build a generation client for the configured model.
pub fn get_generation_client(config: &Config) -> Result<Arc<dyn GenerationClient>, ProviderError> {
    Ok(Arc::new(OllamaGenerationClient::new(
        &config.ollama_url,
        config.generation_model.clone(),
    )?))
}
