//! Shared plumbing for the external inference services.
//!
//! Both the embedding and the generation adapters talk to an Ollama runtime through
//! `ollama-rs`. This module owns what they share: the connection builder, the idempotent
//! "make the model available" step, error classification, and the timeout wrapper applied to
//! every outbound call.

use ollama_rs::Ollama;
use reqwest::{Client, Url};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised by embedding and generation providers.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The service endpoint could not be reached.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
    /// The requested model does not exist on the provider.
    #[error("Model '{0}' not found on provider")]
    ModelNotFound(String),
    /// The call did not complete within its time budget.
    #[error("{operation} timed out after {}s", after.as_secs_f32())]
    Timeout {
        /// Operation that was cut off.
        operation: &'static str,
        /// Budget that elapsed.
        after: Duration,
    },
    /// The provider answered with something unusable.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
    /// The provider reported a failure that fits no other category.
    #[error("Provider request failed: {0}")]
    Failed(String),
    /// The configured endpoint is not a usable URL.
    #[error("Invalid provider endpoint '{0}'")]
    InvalidEndpoint(String),
}

impl ProviderError {
    /// Whether retrying the same call later could plausibly succeed.
    ///
    /// Configuration problems (unknown model, bad endpoint) are not transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout { .. })
    }
}

/// Run `future`, converting an elapsed `limit` into [`ProviderError::Timeout`].
pub async fn with_timeout<T, F>(
    limit: Duration,
    operation: &'static str,
    future: F,
) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, timeout_secs = limit.as_secs_f32(), "Provider call timed out");
            Err(ProviderError::Timeout {
                operation,
                after: limit,
            })
        }
    }
}

/// Build an `ollama-rs` handle for the given base URL.
pub fn connect_ollama(base_url: &str) -> Result<Ollama, ProviderError> {
    let url = Url::parse(base_url.trim())
        .map_err(|_| ProviderError::InvalidEndpoint(base_url.to_string()))?;
    let host = url
        .host_str()
        .ok_or_else(|| ProviderError::InvalidEndpoint(base_url.to_string()))?;
    let port = url.port_or_known_default().unwrap_or(11434);

    let http = Client::builder()
        .user_agent("pdf-rag/0.1")
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|error| ProviderError::Failed(format!("failed to build HTTP client: {error}")))?;

    tracing::debug!(host, port, "Initialized Ollama client");
    Ok(Ollama::new_with_client(
        format!("{}://{}", url.scheme(), host),
        port,
        http,
    ))
}

/// Make sure `model` is present locally, pulling it only when absent.
pub(crate) async fn ensure_ollama_model(ollama: &Ollama, model: &str) -> Result<(), ProviderError> {
    let local = ollama
        .list_local_models()
        .await
        .map_err(|error| classify_ollama_error(model, error))?;

    if local.iter().any(|candidate| model_matches(&candidate.name, model)) {
        tracing::debug!(model, "Model already available");
        return Ok(());
    }

    tracing::info!(model, "Pulling model");
    ollama
        .pull_model(model.to_string(), false)
        .await
        .map_err(|error| classify_ollama_error(model, error))?;
    tracing::info!(model, "Model pulled");
    Ok(())
}

/// Ollama reports untagged models with an implicit `:latest` suffix.
pub(crate) fn model_matches(local_name: &str, wanted: &str) -> bool {
    let wanted = wanted.trim();
    if local_name == wanted {
        return true;
    }
    !wanted.contains(':') && local_name.strip_suffix(":latest") == Some(wanted)
}

/// Map an `ollama-rs` failure onto the provider taxonomy.
pub(crate) fn classify_ollama_error(model: &str, error: impl std::fmt::Display) -> ProviderError {
    let message = error.to_string();
    let lower = message.to_lowercase();
    if lower.contains("not found") && (lower.contains("model") || lower.contains(model)) {
        ProviderError::ModelNotFound(model.to_string())
    } else if lower.contains("error sending request")
        || lower.contains("connect")
        || lower.contains("connection refused")
    {
        ProviderError::Unavailable(message)
    } else {
        ProviderError::Failed(message)
    }
}
