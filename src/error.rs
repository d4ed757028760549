//! Stage-tagged errors surfaced by the question-answering pipeline.

use crate::loader::LoaderError;
use crate::processing::types::ChunkingError;
use crate::providers::ProviderError;
use crate::retrieval::{GenerationError, RetrievalError};
use crate::store::StoreError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Validating the document path or the question.
    Input,
    /// Loading, chunking, embedding, and persisting the document.
    Ingest,
    /// Generating query variants.
    Expansion,
    /// Embedding query variants and searching the collection.
    Retrieval,
    /// Synthesizing the answer.
    Generation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Input => "input",
            Self::Ingest => "ingest",
            Self::Expansion => "expansion",
            Self::Retrieval => "retrieval",
            Self::Generation => "generation",
        };
        f.write_str(name)
    }
}

/// Problems with what the caller supplied.
#[derive(Debug, Error)]
pub enum InputError {
    /// The configured document does not exist.
    #[error("document not found at {}", .0.display())]
    MissingDocument(PathBuf),
    /// The document exists but the loader could not read it.
    #[error("document could not be loaded: {0}")]
    UnreadableDocument(#[source] LoaderError),
    /// The question is empty or whitespace.
    #[error("please enter a question")]
    EmptyQuestion,
}

/// Failures while turning the document into a searchable collection.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The document produced no chunks.
    #[error(transparent)]
    Chunking(#[from] ChunkingError),
    /// Embedding or persisting the collection failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A model could not be made available.
    #[error("model unavailable: {0}")]
    ModelUnavailable(#[source] ProviderError),
}

/// Any failure that aborts a run or a single question.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid input.
    #[error(transparent)]
    Input(#[from] InputError),
    /// Ingest failed; no question was processed.
    #[error(transparent)]
    Ingest(#[from] IngestError),
    /// Query expansion failed for a reason degradation cannot cover.
    #[error(transparent)]
    Expansion(RetrievalError),
    /// Retrieval failed.
    #[error(transparent)]
    Retrieval(RetrievalError),
    /// Answer synthesis failed.
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl From<RetrievalError> for PipelineError {
    fn from(error: RetrievalError) -> Self {
        match error {
            RetrievalError::Expansion(_) => Self::Expansion(error),
            other => Self::Retrieval(other),
        }
    }
}

impl PipelineError {
    /// Stage the failure belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Input(_) => Stage::Input,
            Self::Ingest(_) => Stage::Ingest,
            Self::Expansion(_) => Stage::Expansion,
            Self::Retrieval(_) => Stage::Retrieval,
            Self::Generation(_) => Stage::Generation,
        }
    }

    /// Whether retrying later could succeed (service unreachable or slow) as opposed to a
    /// configuration or data problem.
    pub fn is_transient(&self) -> bool {
        self.provider_error().is_some_and(ProviderError::is_transient)
    }

    /// Provider failure underlying this error, if any.
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            Self::Input(_) => None,
            Self::Ingest(IngestError::ModelUnavailable(error)) => Some(error),
            Self::Ingest(IngestError::Store(StoreError::EmbeddingService(error))) => Some(error),
            Self::Ingest(_) => None,
            Self::Expansion(error) | Self::Retrieval(error) => match error {
                RetrievalError::Expansion(error) | RetrievalError::Embedding(error) => Some(error),
                RetrievalError::Store(StoreError::EmbeddingService(error)) => Some(error),
                RetrievalError::Store(_) => None,
            },
            Self::Generation(GenerationError::Provider(error)) => Some(error),
            Self::Generation(GenerationError::EmptyResponse) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn expansion_errors_map_to_their_own_stage() {
        let error: PipelineError =
            RetrievalError::Expansion(ProviderError::ModelNotFound("llama".into())).into();
        assert_eq!(error.stage(), Stage::Expansion);
        assert!(!error.is_transient());
        assert_eq!(error.stage().to_string(), "expansion");
    }

    #[test]
    fn embedding_timeouts_are_transient_retrieval_failures() {
        let error: PipelineError = RetrievalError::Embedding(ProviderError::Timeout {
            operation: "query embedding",
            after: Duration::from_secs(1),
        })
        .into();
        assert_eq!(error.stage(), Stage::Retrieval);
        assert!(error.is_transient());
    }

    #[test]
    fn empty_documents_are_not_transient() {
        let error: PipelineError = IngestError::Chunking(ChunkingError::EmptyDocument).into();
        assert_eq!(error.stage(), Stage::Ingest);
        assert!(!error.is_transient());
    }

    #[test]
    fn empty_answers_belong_to_generation() {
        let error: PipelineError = GenerationError::EmptyResponse.into();
        assert_eq!(error.stage(), Stage::Generation);
        assert!(error.provider_error().is_none());
    }

    #[test]
    fn empty_question_message_is_user_facing() {
        let error: PipelineError = InputError::EmptyQuestion.into();
        assert_eq!(error.to_string(), "please enter a question");
        assert_eq!(error.stage(), Stage::Input);
    }
}
