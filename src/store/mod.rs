//! Persistent vector store.
//!
//! Each collection lives in `<root>/<collection>/` as a `records.jsonl` file (one chunk and its
//! vector per line) plus a `manifest.json` written last. Builds happen in a hidden staging
//! directory that is renamed into place only once complete, so readers see either no
//! collection or a full one. A staging directory left by a failed or cancelled build is
//! removed when the build future is dropped; one left by a killed process is swept by the next
//! build once it is an hour old.

mod collection;
pub mod types;

pub use collection::Collection;
pub use types::{
    BuildOptions, BuildOutcome, CollectionManifest, DistanceMetric, ScoredChunk, StoreError,
    StoredRecord,
};

use crate::embedding::{EmbeddingClient, check_embeddings};
use crate::processing::types::Chunk;
use crate::providers::with_timeout;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use types::FORMAT_VERSION;

const MANIFEST_FILE: &str = "manifest.json";
const RECORDS_FILE: &str = "records.jsonl";
const STALE_STAGING_AGE: Duration = Duration::from_secs(60 * 60);

/// Owner of the collections persisted under one directory.
#[derive(Debug, Clone)]
pub struct VectorStore {
    root: PathBuf,
}

impl VectorStore {
    /// Store rooted at `root`; the directory is created on first build.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory a published collection occupies.
    pub fn collection_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Open a published collection.
    ///
    /// Returns `Ok(None)` when nothing has been published under `name`. A directory that exists
    /// but fails validation is reported as [`StoreError::Corrupt`]; one built with another
    /// embedding model as [`StoreError::ModelMismatch`].
    pub async fn open(
        &self,
        name: &str,
        embedding_model: &str,
    ) -> Result<Option<Collection>, StoreError> {
        let path = self.collection_path(name);
        let exists = tokio::fs::try_exists(&path)
            .await
            .map_err(|source| StoreError::storage(&path, source))?;
        if !exists {
            return Ok(None);
        }

        let manifest = read_manifest(&path).await?;
        if manifest.collection != name {
            return Err(StoreError::corrupt(
                &path,
                format!("manifest names collection '{}'", manifest.collection),
            ));
        }
        if manifest.format_version != FORMAT_VERSION {
            return Err(StoreError::corrupt(
                &path,
                format!("unsupported format version {}", manifest.format_version),
            ));
        }
        if manifest.embedding_model != embedding_model {
            return Err(StoreError::ModelMismatch {
                collection: name.to_string(),
                built_with: manifest.embedding_model,
                configured: embedding_model.to_string(),
            });
        }

        let records = read_records(&path, &manifest).await?;
        tracing::debug!(
            collection = name,
            chunks = records.len(),
            dimension = manifest.dimension,
            "Opened collection"
        );
        Ok(Some(Collection::new(path, manifest, records)))
    }

    /// Embed `chunks` and publish them as collection `name`.
    ///
    /// If a complete collection already exists it is reopened and the embedding provider is
    /// not called.
    pub async fn build(
        &self,
        chunks: &[Chunk],
        embedder: &dyn EmbeddingClient,
        name: &str,
        options: BuildOptions,
    ) -> Result<BuildOutcome, StoreError> {
        let model = embedder.model_name().to_string();
        if let Some(collection) = self.open(name, &model).await? {
            tracing::info!(collection = name, chunks = collection.len(), "Reusing persisted collection");
            return Ok(BuildOutcome {
                collection,
                reused: true,
                embedding_requests: 0,
            });
        }
        if chunks.is_empty() {
            return Err(StoreError::NoChunks(name.to_string()));
        }

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| StoreError::storage(&self.root, source))?;
        sweep_stale_staging(&self.root, name, STALE_STAGING_AGE).await;
        let staging = StagingDir::create(
            self.root
                .join(format!("{}{}", staging_prefix(name), uuid::Uuid::new_v4())),
        )
        .await?;

        tracing::info!(collection = name, chunks = chunks.len(), model = %model, "Building collection");
        let (records, embedding_requests) = embed_chunks(chunks, embedder, options).await?;
        let manifest = CollectionManifest {
            format_version: FORMAT_VERSION,
            collection: name.to_string(),
            embedding_model: model.clone(),
            dimension: records.first().map(|record| record.vector.len()).unwrap_or(0),
            chunk_count: records.len(),
            metric: DistanceMetric::Cosine,
            created_at: current_timestamp_rfc3339(),
        };

        write_records(staging.path(), &records).await?;
        write_manifest(staging.path(), &manifest).await?;

        let target = self.collection_path(name);
        if let Err(source) = tokio::fs::rename(staging.path(), &target).await {
            if tokio::fs::try_exists(&target).await.unwrap_or(false) {
                tracing::info!(collection = name, "Collection published concurrently; reopening");
                drop(staging);
                let collection = self
                    .open(name, &model)
                    .await?
                    .ok_or_else(|| StoreError::corrupt(&target, "collection vanished after publish"))?;
                return Ok(BuildOutcome {
                    collection,
                    reused: false,
                    embedding_requests,
                });
            }
            return Err(StoreError::storage(&target, source));
        }
        staging.disarm();

        tracing::info!(
            collection = name,
            chunks = manifest.chunk_count,
            dimension = manifest.dimension,
            embedding_requests,
            "Collection built"
        );
        Ok(BuildOutcome {
            collection: Collection::new(target, manifest, records),
            reused: false,
            embedding_requests,
        })
    }

    /// Delete a published collection. Returns whether anything was removed.
    pub async fn remove(&self, name: &str) -> Result<bool, StoreError> {
        let path = self.collection_path(name);
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => {
                tracing::info!(collection = name, "Removed collection");
                Ok(true)
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::storage(path, source)),
        }
    }
}

fn staging_prefix(name: &str) -> String {
    format!(".{name}.building-")
}

/// Remove staging directories for `name` last modified at least `older_than` ago.
///
/// Failures are logged and otherwise ignored; a leftover directory never blocks a build.
async fn sweep_stale_staging(root: &Path, name: &str, older_than: Duration) {
    let prefix = staging_prefix(name);
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(error) => {
            tracing::warn!(path = %root.display(), error = %error, "Failed to scan for stale staging directories");
            return;
        }
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        if !entry.file_name().to_string_lossy().starts_with(&prefix) {
            continue;
        }
        let age = match entry.metadata().await.and_then(|metadata| metadata.modified()) {
            Ok(modified) => SystemTime::now().duration_since(modified).unwrap_or_default(),
            Err(_) => continue,
        };
        if age < older_than {
            continue;
        }

        let path = entry.path();
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => tracing::info!(path = %path.display(), "Removed stale staging directory"),
            Err(error) => {
                tracing::warn!(path = %path.display(), error = %error, "Failed to remove stale staging directory");
            }
        }
    }
}

async fn embed_chunks(
    chunks: &[Chunk],
    embedder: &dyn EmbeddingClient,
    options: BuildOptions,
) -> Result<(Vec<StoredRecord>, usize), StoreError> {
    let mut records = Vec::with_capacity(chunks.len());
    let mut dimension = None;
    let mut requests = 0;

    for batch in chunks.chunks(options.batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
        requests += 1;
        let vectors = with_timeout(
            options.request_timeout,
            "embedding request",
            embedder.generate_embeddings(texts),
        )
        .await
        .map_err(StoreError::EmbeddingService)?;
        let width = check_embeddings(batch.len(), &vectors).map_err(StoreError::EmbeddingService)?;

        match dimension {
            None => dimension = Some(width),
            Some(expected) if expected != width => {
                return Err(StoreError::EmbeddingService(
                    crate::providers::ProviderError::InvalidResponse(format!(
                        "embedding width changed from {expected} to {width} between batches"
                    )),
                ));
            }
            Some(_) => {}
        }

        tracing::debug!(embedded = records.len() + batch.len(), total = chunks.len(), "Embedded batch");
        records.extend(
            batch
                .iter()
                .cloned()
                .zip(vectors)
                .map(|(chunk, vector)| StoredRecord { chunk, vector }),
        );
    }

    Ok((records, requests))
}

async fn write_records(dir: &Path, records: &[StoredRecord]) -> Result<(), StoreError> {
    let path = dir.join(RECORDS_FILE);
    let mut body = String::new();
    for record in records {
        let line = serde_json::to_string(record)
            .map_err(|error| StoreError::storage(&path, std::io::Error::other(error)))?;
        body.push_str(&line);
        body.push('\n');
    }
    tokio::fs::write(&path, body)
        .await
        .map_err(|source| StoreError::storage(&path, source))
}

async fn write_manifest(dir: &Path, manifest: &CollectionManifest) -> Result<(), StoreError> {
    let path = dir.join(MANIFEST_FILE);
    let body = serde_json::to_vec_pretty(manifest)
        .map_err(|error| StoreError::storage(&path, std::io::Error::other(error)))?;
    tokio::fs::write(&path, body)
        .await
        .map_err(|source| StoreError::storage(&path, source))
}

async fn read_manifest(dir: &Path) -> Result<CollectionManifest, StoreError> {
    let path = dir.join(MANIFEST_FILE);
    let body = match tokio::fs::read(&path).await {
        Ok(body) => body,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return Err(StoreError::corrupt(dir, "manifest.json is missing"));
        }
        Err(source) => return Err(StoreError::storage(&path, source)),
    };
    serde_json::from_slice(&body)
        .map_err(|error| StoreError::corrupt(dir, format!("unreadable manifest: {error}")))
}

async fn read_records(
    dir: &Path,
    manifest: &CollectionManifest,
) -> Result<Vec<StoredRecord>, StoreError> {
    let path = dir.join(RECORDS_FILE);
    let body = match tokio::fs::read_to_string(&path).await {
        Ok(body) => body,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return Err(StoreError::corrupt(dir, "records.jsonl is missing"));
        }
        Err(source) => return Err(StoreError::storage(&path, source)),
    };

    let mut records = Vec::with_capacity(manifest.chunk_count);
    for (line_number, line) in body.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: StoredRecord = serde_json::from_str(line).map_err(|error| {
            StoreError::corrupt(dir, format!("record {} unreadable: {error}", line_number + 1))
        })?;
        if record.vector.len() != manifest.dimension {
            return Err(StoreError::corrupt(
                dir,
                format!(
                    "record {} has {} dimensions, manifest says {}",
                    line_number + 1,
                    record.vector.len(),
                    manifest.dimension
                ),
            ));
        }
        records.push(record);
    }

    if records.len() != manifest.chunk_count {
        return Err(StoreError::corrupt(
            dir,
            format!(
                "manifest lists {} chunks but {} records are present",
                manifest.chunk_count,
                records.len()
            ),
        ));
    }
    Ok(records)
}

/// Current timestamp formatted for manifests.
fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Staging directory deleted on drop unless disarmed after a successful publish.
struct StagingDir {
    path: PathBuf,
    armed: bool,
}

impl StagingDir {
    async fn create(path: PathBuf) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|source| StoreError::storage(&path, source))?;
        Ok(Self { path, armed: true })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if self.armed
            && let Err(error) = std::fs::remove_dir_all(&self.path)
            && error.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %self.path.display(), error = %error, "Failed to remove staging directory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::chunking::chunk_id;
    use crate::providers::ProviderError;
    use crate::testing::{CountingEmbedder, EmbedBehaviour, scratch_dir};

    fn options() -> BuildOptions {
        BuildOptions {
            batch_size: 2,
            request_timeout: Duration::from_secs(5),
        }
    }

    fn chunks(texts: &[&str]) -> Vec<Chunk> {
        texts
            .iter()
            .enumerate()
            .map(|(index, text)| Chunk {
                id: chunk_id(index * 100, text),
                index,
                start: index * 100,
                char_len: text.chars().count(),
                pages: vec![index + 1],
                text: text.to_string(),
            })
            .collect()
    }

    fn leftover_entries(root: &Path) -> Vec<String> {
        std::fs::read_dir(root)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|entry| entry.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn build_persists_and_reopens() {
        let scratch = scratch_dir("store-build");
        let root = scratch.path();
        let store = VectorStore::new(root);
        let embedder = CountingEmbedder::new();
        let input = chunks(&["alpha beta", "gamma delta", "epsilon zeta"]);

        let outcome = store.build(&input, &embedder, "docs", options()).await.expect("build");
        assert!(!outcome.reused);
        assert_eq!(outcome.embedding_requests, 2);
        assert_eq!(outcome.collection.len(), 3);
        assert_eq!(embedder.calls(), 2);

        let reopened = store
            .open("docs", embedder.model_name())
            .await
            .expect("open")
            .expect("collection exists");
        assert_eq!(reopened.manifest().chunk_count, 3);
        assert_eq!(reopened.path(), root.join("docs"));
        let texts: Vec<&str> = reopened.chunks().map(|chunk| chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["alpha beta", "gamma delta", "epsilon zeta"]);
        assert_eq!(leftover_entries(root), vec!["docs".to_string()]);
    }

    #[tokio::test]
    async fn second_build_reuses_without_embedding() {
        let scratch = scratch_dir("store-idempotent");
        let root = scratch.path();
        let store = VectorStore::new(root);
        let embedder = CountingEmbedder::new();
        let input = chunks(&["one", "two", "three"]);

        store.build(&input, &embedder, "docs", options()).await.expect("first build");
        let calls_after_first = embedder.calls();

        let again = store.build(&input, &embedder, "docs", options()).await.expect("second build");
        assert!(again.reused);
        assert_eq!(again.embedding_requests, 0);
        assert_eq!(embedder.calls(), calls_after_first);
        assert_eq!(again.collection.len(), 3);
    }

    #[tokio::test]
    async fn open_missing_collection_returns_none() {
        let scratch = scratch_dir("store-missing");
        let root = scratch.path();
        let store = VectorStore::new(root);
        assert!(store.open("docs", "model").await.expect("open").is_none());
    }

    #[tokio::test]
    async fn failed_embedding_leaves_nothing_behind() {
        let scratch = scratch_dir("store-failure");
        let root = scratch.path();
        let store = VectorStore::new(root);
        let embedder = CountingEmbedder::with_behaviour(EmbedBehaviour::Unavailable);

        let error = store
            .build(&chunks(&["a", "b"]), &embedder, "docs", options())
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            StoreError::EmbeddingService(ProviderError::Unavailable(_))
        ));
        assert!(leftover_entries(root).is_empty());
        assert!(store.open("docs", embedder.model_name()).await.expect("open").is_none());
    }

    #[tokio::test]
    async fn malformed_vectors_are_embedding_errors() {
        let scratch = scratch_dir("store-malformed");
        let root = scratch.path();
        let store = VectorStore::new(root);
        let embedder = CountingEmbedder::with_behaviour(EmbedBehaviour::DropLastVector);

        let error = store
            .build(&chunks(&["a", "b"]), &embedder, "docs", options())
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            StoreError::EmbeddingService(ProviderError::InvalidResponse(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_embedding_times_out() {
        let scratch = scratch_dir("store-timeout");
        let root = scratch.path();
        let store = VectorStore::new(root);
        let embedder = CountingEmbedder::with_behaviour(EmbedBehaviour::Hang);

        let error = store
            .build(&chunks(&["a"]), &embedder, "docs", options())
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            StoreError::EmbeddingService(ProviderError::Timeout { .. })
        ));
        assert!(leftover_entries(root).is_empty());
    }

    #[tokio::test]
    async fn truncated_records_are_corrupt() {
        let scratch = scratch_dir("store-corrupt");
        let root = scratch.path();
        let store = VectorStore::new(root);
        let embedder = CountingEmbedder::new();
        store
            .build(&chunks(&["a", "b", "c"]), &embedder, "docs", options())
            .await
            .expect("build");

        let records_path = root.join("docs").join(RECORDS_FILE);
        let body = std::fs::read_to_string(&records_path).expect("records");
        let first_line = body.lines().next().expect("one line").to_string();
        std::fs::write(&records_path, format!("{first_line}\n")).expect("truncate");

        let error = store.open("docs", embedder.model_name()).await.unwrap_err();
        assert!(matches!(error, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn directory_without_manifest_is_corrupt() {
        let scratch = scratch_dir("store-no-manifest");
        let root = scratch.path();
        std::fs::create_dir_all(root.join("docs")).expect("dir");
        let store = VectorStore::new(root);

        let error = store.open("docs", "model").await.unwrap_err();
        assert!(matches!(error, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn different_embedding_model_requires_rebuild() {
        let scratch = scratch_dir("store-model");
        let root = scratch.path();
        let store = VectorStore::new(root);
        let embedder = CountingEmbedder::new();
        store
            .build(&chunks(&["a"]), &embedder, "docs", options())
            .await
            .expect("build");

        let other = CountingEmbedder::new().with_model("other-model");
        let error = store
            .build(&chunks(&["a"]), &other, "docs", options())
            .await
            .unwrap_err();
        assert!(matches!(error, StoreError::ModelMismatch { .. }));
        assert_eq!(other.calls(), 0);

        assert!(store.remove("docs").await.expect("remove"));
        assert!(!store.remove("docs").await.expect("second remove"));
        let rebuilt = store
            .build(&chunks(&["a"]), &other, "docs", options())
            .await
            .expect("rebuild");
        assert!(!rebuilt.reused);
    }

    #[tokio::test]
    async fn empty_chunk_list_is_rejected() {
        let scratch = scratch_dir("store-empty");
        let root = scratch.path();
        let store = VectorStore::new(root);
        let error = store
            .build(&[], &CountingEmbedder::new(), "docs", options())
            .await
            .unwrap_err();
        assert!(matches!(error, StoreError::NoChunks(_)));
    }

    #[tokio::test]
    async fn concurrent_builds_report_reuse_only_without_embedding() {
        let scratch = scratch_dir("store-concurrent");
        let store = VectorStore::new(scratch.path());
        let first_embedder = CountingEmbedder::new();
        let second_embedder = CountingEmbedder::new();
        let input = chunks(&["one", "two", "three"]);

        let (first, second) = tokio::join!(
            store.build(&input, &first_embedder, "docs", options()),
            store.build(&input, &second_embedder, "docs", options()),
        );
        for outcome in [first.expect("first build"), second.expect("second build")] {
            assert_eq!(outcome.reused, outcome.embedding_requests == 0);
            assert_eq!(outcome.collection.len(), 3);
        }
        assert_eq!(leftover_entries(scratch.path()), vec!["docs".to_string()]);
    }

    #[tokio::test]
    async fn stale_staging_directories_are_swept() {
        let scratch = scratch_dir("store-sweep");
        let root = scratch.path();
        std::fs::create_dir_all(root.join(".docs.building-dead").join("partial")).expect("stale dir");
        std::fs::create_dir_all(root.join(".other.building-dead")).expect("other dir");

        sweep_stale_staging(root, "docs", Duration::ZERO).await;
        let mut left = leftover_entries(root);
        left.sort();
        assert_eq!(left, vec![".other.building-dead".to_string()]);

        std::fs::create_dir_all(root.join(".other.building-fresh")).expect("fresh dir");
        sweep_stale_staging(root, "other", STALE_STAGING_AGE).await;
        let mut left = leftover_entries(root);
        left.sort();
        assert_eq!(
            left,
            vec![".other.building-dead".to_string(), ".other.building-fresh".to_string()]
        );
    }
}
