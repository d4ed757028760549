#![deny(missing_docs)]

//! Core library for answering questions about a single long document with multi-query
//! retrieval-augmented generation.

/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Stage-tagged pipeline errors.
pub mod error;
/// Text-generation client abstraction and adapters.
pub mod generation;
/// Document loading.
pub mod loader;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline metrics helpers.
pub mod metrics;
/// Chunking, document types, and pipeline orchestration.
pub mod processing;
/// Shared plumbing for the inference services.
pub mod providers;
/// Query expansion, multi-query retrieval, and answer synthesis.
pub mod retrieval;
/// Persistent vector store.
pub mod store;

#[cfg(test)]
mod testing;
