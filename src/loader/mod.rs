//! Document loading.
//!
//! Turning a file into ordered text segments is delegated: PDFs go through the `pdftotext`
//! binary from poppler, everything else is read as UTF-8 text. Both paths split pages on form
//! feeds, which is how `pdftotext` separates pages in its output.

use crate::processing::types::{Document, Segment};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;

const PAGE_BREAK: char = '\u{c}';

/// Errors raised while reading a document.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The path does not exist.
    #[error("document not found at {}", .0.display())]
    NotFound(PathBuf),
    /// The file exists but could not be read.
    #[error("failed to read document {}: {source}", .path.display())]
    Unreadable {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The external extraction tool failed.
    #[error("text extraction failed for {}: {message}", .path.display())]
    Extraction {
        /// File that failed.
        path: PathBuf,
        /// Diagnostic output from the tool.
        message: String,
    },
}

/// Interface for services that turn a file into ordered text segments.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Load `path`, returning its segments in reading order.
    async fn load(&self, path: &Path) -> Result<Document, LoaderError>;
}

/// Loader for PDFs (via `pdftotext`) and plain-text files.
#[derive(Debug, Clone)]
pub struct FileDocumentLoader {
    pdftotext: PathBuf,
}

impl FileDocumentLoader {
    /// Use the `pdftotext` found on `PATH`.
    pub fn new() -> Self {
        Self {
            pdftotext: PathBuf::from("pdftotext"),
        }
    }

    /// Use a specific `pdftotext` executable.
    pub fn with_pdftotext(path: impl Into<PathBuf>) -> Self {
        Self {
            pdftotext: path.into(),
        }
    }

    async fn extract_pdf(&self, path: &Path) -> Result<String, LoaderError> {
        tracing::info!(path = %path.display(), "Extracting PDF text using pdftotext");
        let output = Command::new(&self.pdftotext)
            .arg("-layout")
            .arg("-enc")
            .arg("UTF-8")
            .arg(path)
            .arg("-")
            .output()
            .await
            .map_err(|error| LoaderError::Extraction {
                path: path.to_path_buf(),
                message: format!("failed to run {}: {error}", self.pdftotext.display()),
            })?;

        if !output.status.success() {
            return Err(LoaderError::Extraction {
                path: path.to_path_buf(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for FileDocumentLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentLoader for FileDocumentLoader {
    async fn load(&self, path: &Path) -> Result<Document, LoaderError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(LoaderError::NotFound(path.to_path_buf()));
        }

        let is_pdf = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        let raw = if is_pdf {
            self.extract_pdf(path).await?
        } else {
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| LoaderError::Unreadable {
                    path: path.to_path_buf(),
                    source,
                })?
        };

        let document = Document::new(path, split_pages(&raw));
        tracing::info!(
            path = %path.display(),
            pages = document.segments.len(),
            "Document loaded"
        );
        Ok(document)
    }
}

/// Split extracted text into page segments on form feeds, numbering pages from 1.
///
/// A trailing form feed (which `pdftotext` emits after the last page) does not produce an
/// extra page. Line endings are normalized to `\n`.
pub(crate) fn split_pages(raw: &str) -> Vec<Segment> {
    let normalized = raw.replace("\r\n", "\n");
    let body = normalized.strip_suffix(PAGE_BREAK).unwrap_or(&normalized);

    body.split(PAGE_BREAK)
        .enumerate()
        .map(|(index, page)| Segment {
            text: page.trim_end().to_string(),
            page: index + 1,
        })
        .collect()
}
