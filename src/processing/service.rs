//! Pipeline service coordinating loading, chunking, persistence, retrieval, and answering.

use crate::{
    config::{Config, RetrievalConfig},
    embedding::EmbeddingClient,
    error::{IngestError, InputError, PipelineError},
    generation::GenerationClient,
    loader::{DocumentLoader, LoaderError},
    metrics::{MetricsSnapshot, PipelineMetrics},
    processing::chunking::Chunker,
    providers::{ProviderError, with_timeout},
    retrieval::{AnswerChain, ContextSet, MultiQueryRetriever, QueryExpander},
    store::{BuildOptions, Collection, VectorStore},
};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Result of making the document searchable.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// Collection ready for questions.
    pub collection: Collection,
    /// `true` when a persisted collection was reopened without embedding anything.
    pub reused: bool,
    /// Chunks in the collection.
    pub chunk_count: usize,
}

/// Answer to one question plus the context it was grounded in.
#[derive(Debug, Clone)]
pub struct AnswerOutcome {
    /// Trimmed model answer.
    pub answer: String,
    /// Context handed to the model.
    pub context: ContextSet,
    /// Retrieval found nothing, so the answer is not grounded in the document.
    pub context_empty: bool,
}

/// Coordinates the full question-answering pipeline over one document.
///
/// The service owns the provider handles, the store, and the metrics registry. Construct it
/// once near process start; [`RagService::ingest`] once per run, then [`RagService::ask`] for
/// every question against the returned collection.
pub struct RagService {
    loader: Arc<dyn DocumentLoader>,
    embedder: Arc<dyn EmbeddingClient>,
    generator: Arc<dyn GenerationClient>,
    store: VectorStore,
    chunker: Chunker,
    retriever: MultiQueryRetriever,
    answer_chain: AnswerChain,
    doc_path: PathBuf,
    collection_name: String,
    retrieval: RetrievalConfig,
    build_options: BuildOptions,
    model_pull_timeout: Duration,
    metrics: Arc<PipelineMetrics>,
}

impl RagService {
    /// Assemble the pipeline from configuration and provider handles.
    pub fn new(
        config: &Config,
        embedder: Arc<dyn EmbeddingClient>,
        generator: Arc<dyn GenerationClient>,
        loader: Arc<dyn DocumentLoader>,
    ) -> Result<Self, PipelineError> {
        let chunker = Chunker::new(config.chunking).map_err(IngestError::Chunking)?;
        let metrics = Arc::new(PipelineMetrics::new());
        let embedder: Arc<dyn EmbeddingClient> = Arc::new(MeteredEmbedder {
            inner: embedder,
            metrics: metrics.clone(),
        });

        let expander = QueryExpander::new(generator.clone(), config.request_timeout);
        let retriever = MultiQueryRetriever::new(expander, embedder.clone(), config.request_timeout);
        let answer_chain = AnswerChain::new(generator.clone(), config.request_timeout);

        tracing::debug!(
            collection = %config.collection_name,
            embedding_model = embedder.model_name(),
            generation_model = generator.model_name(),
            "Pipeline service initialized"
        );

        Ok(Self {
            loader,
            embedder,
            generator,
            store: VectorStore::new(&config.persist_directory),
            chunker,
            retriever,
            answer_chain,
            doc_path: config.doc_path.clone(),
            collection_name: config.collection_name.clone(),
            retrieval: config.retrieval,
            build_options: BuildOptions {
                batch_size: config.embedding_batch_size,
                request_timeout: config.request_timeout,
            },
            model_pull_timeout: config.model_pull_timeout,
            metrics,
        })
    }

    /// Make both models available, pulling them when absent. Safe to call repeatedly.
    pub async fn ensure_models(&self) -> Result<(), PipelineError> {
        let limit = self.model_pull_timeout;
        with_timeout(limit, "embedding model pull", self.embedder.ensure_available())
            .await
            .map_err(IngestError::ModelUnavailable)?;
        with_timeout(limit, "generation model pull", self.generator.ensure_available())
            .await
            .map_err(IngestError::ModelUnavailable)?;
        tracing::info!(
            embedding_model = self.embedder.model_name(),
            generation_model = self.generator.model_name(),
            "Models ready"
        );
        Ok(())
    }

    /// Make the configured document searchable.
    ///
    /// A complete persisted collection is reopened without loading the document or calling
    /// the embedding provider. Otherwise the document is loaded, chunked, embedded, and
    /// published atomically.
    pub async fn ingest(&self) -> Result<IngestOutcome, PipelineError> {
        let name = self.collection_name.as_str();
        if let Some(collection) = self
            .store
            .open(name, self.embedder.model_name())
            .await
            .map_err(IngestError::Store)?
        {
            tracing::info!(
                collection = name,
                chunks = collection.len(),
                path = %collection.path().display(),
                "Reusing persisted collection"
            );
            self.metrics.record_reuse();
            return Ok(IngestOutcome {
                chunk_count: collection.len(),
                collection,
                reused: true,
            });
        }

        let exists = tokio::fs::try_exists(&self.doc_path)
            .await
            .map_err(|source| {
                InputError::UnreadableDocument(LoaderError::Unreadable {
                    path: self.doc_path.clone(),
                    source,
                })
            })?;
        if !exists {
            return Err(InputError::MissingDocument(self.doc_path.clone()).into());
        }

        let document = self.loader.load(&self.doc_path).await.map_err(|error| match error {
            LoaderError::NotFound(path) => InputError::MissingDocument(path),
            other => InputError::UnreadableDocument(other),
        })?;
        let chunks = self.chunker.split(&document).map_err(IngestError::Chunking)?;
        tracing::info!(
            path = %self.doc_path.display(),
            pages = document.segments.len(),
            chunks = chunks.len(),
            "Document chunked"
        );

        let outcome = self
            .store
            .build(&chunks, self.embedder.as_ref(), name, self.build_options)
            .await
            .map_err(IngestError::Store)?;
        if outcome.reused {
            self.metrics.record_reuse();
        } else {
            self.metrics.record_build(outcome.collection.len() as u64);
        }

        Ok(IngestOutcome {
            chunk_count: outcome.collection.len(),
            collection: outcome.collection,
            reused: outcome.reused,
        })
    }

    /// Delete the persisted collection, then ingest from scratch.
    pub async fn rebuild(&self) -> Result<IngestOutcome, PipelineError> {
        let removed = self
            .store
            .remove(&self.collection_name)
            .await
            .map_err(IngestError::Store)?;
        tracing::info!(collection = %self.collection_name, removed, "Rebuilding collection");
        self.ingest().await
    }

    /// Answer `question` from `collection`.
    pub async fn ask(&self, collection: &Collection, question: &str) -> Result<AnswerOutcome, PipelineError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(InputError::EmptyQuestion.into());
        }

        let context = self
            .retriever
            .retrieve(
                question,
                collection,
                self.retrieval.variants_per_query,
                self.retrieval.results_per_variant,
            )
            .await?;
        let context_empty = context.is_empty();
        if context_empty {
            tracing::warn!(collection = collection.name(), "Answering without retrieved context");
        }

        let answer = self.answer_chain.answer(question, &context).await?;
        self.metrics.record_answer();
        Ok(AnswerOutcome {
            answer,
            context,
            context_empty,
        })
    }

    /// Current pipeline counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Embedding client wrapper that counts every provider call.
struct MeteredEmbedder {
    inner: Arc<dyn EmbeddingClient>,
    metrics: Arc<PipelineMetrics>,
}

#[async_trait]
impl EmbeddingClient for MeteredEmbedder {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn ensure_available(&self) -> Result<(), ProviderError> {
        self.inner.ensure_available().await
    }

    async fn generate_embeddings(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.metrics.record_embedding_request(texts.len() as u64);
        self.inner.generate_embeddings(texts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;
    use crate::loader::FileDocumentLoader;
    use crate::testing::{CountingEmbedder, EmbedBehaviour, ScriptedGenerator, scratch_dir};
    use std::path::Path;

    fn test_config(root: &Path, doc_path: PathBuf) -> Config {
        let mut config = Config::from_lookup(|_| None).expect("default config");
        config.doc_path = doc_path;
        config.persist_directory = root.join("db");
        config.collection_name = "service-test".into();
        config.chunking.chunk_size = 120;
        config.chunking.chunk_overlap = 30;
        config.chunking.break_tolerance = 20;
        config.embedding_batch_size = 4;
        config.request_timeout = Duration::from_secs(5);
        config
    }

    fn write_document(root: &Path) -> PathBuf {
        let path = root.join("notes.txt");
        let pages = [
            "Purpose. This handbook explains how the lab stores and shares research data.",
            "Storage. Raw data lives on the shared cluster and is backed up every night.",
            "Sharing. Datasets are published with a licence and a short description.",
        ];
        std::fs::write(&path, pages.join("\u{c}")).expect("write document");
        path
    }

    fn service(config: &Config, embedder: Arc<CountingEmbedder>, generator: Arc<ScriptedGenerator>) -> RagService {
        RagService::new(config, embedder, generator, Arc::new(FileDocumentLoader::new())).expect("service")
    }

    #[tokio::test]
    async fn ingest_then_ask_answers_from_context() {
        let scratch = scratch_dir("service-ask");
        let root = scratch.path();
        let config = test_config(root, write_document(root));
        let embedder = Arc::new(CountingEmbedder::new());
        let generator = Arc::new(ScriptedGenerator::new(|request| {
            if request.prompt.starts_with("Answer the question") {
                Ok("It explains how research data is stored and shared.".into())
            } else {
                Ok("Why was the handbook written?\nWhat does the handbook cover?".into())
            }
        }));
        let service = service(&config, embedder.clone(), generator.clone());

        let ingest = service.ingest().await.expect("ingest");
        assert!(!ingest.reused);
        assert!(ingest.chunk_count > 1);

        let outcome = service
            .ask(&ingest.collection, "What is the purpose of the document?")
            .await
            .expect("answer");
        assert_eq!(outcome.answer, "It explains how research data is stored and shared.");
        assert!(!outcome.context_empty);
        assert_eq!(outcome.context.variants.len(), 3);
        assert_eq!(generator.requests().len(), 2);

        let snapshot = service.metrics_snapshot();
        assert_eq!(snapshot.collections_built, 1);
        assert_eq!(snapshot.questions_answered, 1);
        assert_eq!(snapshot.embedding_requests, embedder.calls() as u64);
    }

    #[tokio::test]
    async fn second_ingest_reuses_the_collection() {
        let scratch = scratch_dir("service-reuse");
        let root = scratch.path();
        let config = test_config(root, write_document(root));
        let embedder = Arc::new(CountingEmbedder::new());
        let generator = Arc::new(ScriptedGenerator::replying("unused"));

        let first = service(&config, embedder.clone(), generator.clone())
            .ingest()
            .await
            .expect("first ingest");
        let calls_after_first = embedder.calls();
        assert!(calls_after_first > 0);

        let second_service = service(&config, embedder.clone(), generator);
        let second = second_service.ingest().await.expect("second ingest");
        assert!(second.reused);
        assert_eq!(second.chunk_count, first.chunk_count);
        assert_eq!(embedder.calls(), calls_after_first);
        assert_eq!(second_service.metrics_snapshot().collections_reused, 1);
    }

    #[tokio::test]
    async fn missing_document_is_an_input_error() {
        let scratch = scratch_dir("service-missing");
        let root = scratch.path();
        let config = test_config(root, root.join("absent.pdf"));
        let embedder = Arc::new(CountingEmbedder::new());
        let service = service(&config, embedder.clone(), Arc::new(ScriptedGenerator::replying("x")));

        let error = service.ingest().await.unwrap_err();
        assert_eq!(error.stage(), Stage::Input);
        assert!(matches!(error, PipelineError::Input(InputError::MissingDocument(_))));
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn uninspectable_document_path_is_unreadable_not_missing() {
        let scratch = scratch_dir("service-uninspectable");
        let root = scratch.path();
        let not_a_dir = write_document(root);
        let config = test_config(root, not_a_dir.join("inner.pdf"));
        let embedder = Arc::new(CountingEmbedder::new());
        let service = service(&config, embedder.clone(), Arc::new(ScriptedGenerator::replying("x")));

        let error = service.ingest().await.unwrap_err();
        assert_eq!(error.stage(), Stage::Input);
        assert!(matches!(
            error,
            PipelineError::Input(InputError::UnreadableDocument(LoaderError::Unreadable { .. }))
        ));
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn blank_document_fails_ingest_without_a_collection() {
        let scratch = scratch_dir("service-blank");
        let root = scratch.path();
        let path = root.join("blank.txt");
        std::fs::write(&path, "  \n\u{c}\n ").expect("write");
        let config = test_config(root, path);
        let service = service(
            &config,
            Arc::new(CountingEmbedder::new()),
            Arc::new(ScriptedGenerator::replying("x")),
        );

        let error = service.ingest().await.unwrap_err();
        assert_eq!(error.stage(), Stage::Ingest);
        assert!(!config.persist_directory.join("service-test").exists());
    }

    #[tokio::test]
    async fn embedding_outage_during_ingest_is_transient() {
        let scratch = scratch_dir("service-outage");
        let root = scratch.path();
        let config = test_config(root, write_document(root));
        let service = service(
            &config,
            Arc::new(CountingEmbedder::with_behaviour(EmbedBehaviour::Unavailable)),
            Arc::new(ScriptedGenerator::replying("x")),
        );

        let error = service.ingest().await.unwrap_err();
        assert_eq!(error.stage(), Stage::Ingest);
        assert!(error.is_transient());
        assert!(!config.persist_directory.join("service-test").exists());
    }

    #[tokio::test]
    async fn empty_question_is_rejected_before_any_model_call() {
        let scratch = scratch_dir("service-empty-question");
        let root = scratch.path();
        let config = test_config(root, write_document(root));
        let embedder = Arc::new(CountingEmbedder::new());
        let generator = Arc::new(ScriptedGenerator::replying("x"));
        let service = service(&config, embedder.clone(), generator.clone());
        let ingest = service.ingest().await.expect("ingest");
        let calls = embedder.calls();

        let error = service.ask(&ingest.collection, "   ").await.unwrap_err();
        assert!(matches!(error, PipelineError::Input(InputError::EmptyQuestion)));
        assert_eq!(embedder.calls(), calls);
        assert!(generator.requests().is_empty());
    }

    #[tokio::test]
    async fn rebuild_embeds_again() {
        let scratch = scratch_dir("service-rebuild");
        let root = scratch.path();
        let config = test_config(root, write_document(root));
        let embedder = Arc::new(CountingEmbedder::new());
        let service = service(&config, embedder.clone(), Arc::new(ScriptedGenerator::replying("x")));

        service.ingest().await.expect("ingest");
        let calls = embedder.calls();
        let rebuilt = service.rebuild().await.expect("rebuild");
        assert!(!rebuilt.reused);
        assert!(embedder.calls() > calls);
    }

    #[tokio::test]
    async fn switching_embedding_model_requires_rebuild() {
        let scratch = scratch_dir("service-mismatch");
        let root = scratch.path();
        let config = test_config(root, write_document(root));
        let generator = Arc::new(ScriptedGenerator::replying("x"));
        service(&config, Arc::new(CountingEmbedder::new()), generator.clone())
            .ingest()
            .await
            .expect("ingest");

        let other = Arc::new(CountingEmbedder::new().with_model("other-embedder"));
        let service = service(&config, other, generator);
        let error = service.ingest().await.unwrap_err();
        assert!(matches!(
            error,
            PipelineError::Ingest(IngestError::Store(crate::store::StoreError::ModelMismatch { .. }))
        ));
        let rebuilt = service.rebuild().await.expect("rebuild");
        assert!(!rebuilt.reused);
    }
}
