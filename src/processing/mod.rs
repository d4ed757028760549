//! Document processing: data types, chunking, and the pipeline service tying the stages together.

pub mod chunking;
mod service;
pub mod types;

pub use chunking::Chunker;
pub use service::{AnswerOutcome, IngestOutcome, RagService};
pub use types::{Chunk, ChunkingError, Document, Segment};
