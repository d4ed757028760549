//! Question answering over an indexed collection: query expansion, multi-query retrieval, and
//! grounded answer synthesis.

mod answer;
mod expander;
pub mod prompt;
mod retriever;
pub mod types;

pub use answer::AnswerChain;
pub use expander::{Expansion, QueryExpander};
pub use retriever::MultiQueryRetriever;
pub use types::{ContextSet, GenerationError, RetrievalError, RetrievedChunk};
