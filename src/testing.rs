//! Test doubles shared by unit tests.

use crate::embedding::{EmbeddingClient, HashingEmbeddingClient};
use crate::generation::{CompletionRequest, GenerationClient};
use crate::providers::ProviderError;
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// How a [`CountingEmbedder`] responds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EmbedBehaviour {
    Normal,
    Unavailable,
    Hang,
    DropLastVector,
}

/// Hashing embedder that counts calls and can be told to misbehave.
pub(crate) struct CountingEmbedder {
    inner: HashingEmbeddingClient,
    model: String,
    behaviour: EmbedBehaviour,
    calls: AtomicUsize,
}

impl CountingEmbedder {
    pub(crate) fn new() -> Self {
        Self::with_behaviour(EmbedBehaviour::Normal)
    }

    pub(crate) fn with_behaviour(behaviour: EmbedBehaviour) -> Self {
        Self {
            inner: HashingEmbeddingClient::new(64),
            model: "counting-embedder".into(),
            behaviour,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingClient for CountingEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn ensure_available(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn generate_embeddings(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            EmbedBehaviour::Normal => self.inner.generate_embeddings(texts).await,
            EmbedBehaviour::Unavailable => {
                Err(ProviderError::Unavailable("connection refused".into()))
            }
            EmbedBehaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                self.inner.generate_embeddings(texts).await
            }
            EmbedBehaviour::DropLastVector => {
                let mut vectors = self.inner.generate_embeddings(texts).await?;
                vectors.pop();
                Ok(vectors)
            }
        }
    }
}

type Responder = Box<dyn Fn(&CompletionRequest) -> Result<String, ProviderError> + Send + Sync>;

/// Generation double that answers through a closure and records every request.
pub(crate) struct ScriptedGenerator {
    responder: Responder,
    hang: bool,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedGenerator {
    pub(crate) fn new<F>(responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            hang: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn replying(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Generator whose every call stalls for an hour before replying.
    pub(crate) fn hanging(text: &str) -> Self {
        Self {
            hang: true,
            ..Self::replying(text)
        }
    }

    pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl GenerationClient for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn ensure_available(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn generate(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        if self.hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let reply = (self.responder)(&request);
        self.requests.lock().expect("requests lock").push(request);
        reply
    }
}

/// Fresh temporary directory, removed when the handle drops.
pub(crate) fn scratch_dir(label: &str) -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix(&format!("pdf-rag-{label}-"))
        .tempdir()
        .expect("scratch dir")
}
