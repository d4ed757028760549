//! Grounded answer synthesis.
//!
//! The chain runs four explicit steps: assemble the retrieved passages into one context block,
//! render the grounded prompt, invoke the generation model, and trim its reply.

use crate::generation::{CompletionRequest, GenerationClient};
use crate::providers::with_timeout;
use std::sync::Arc;
use std::time::Duration;

use super::prompt::GroundedAnswerPrompt;
use super::types::{ContextSet, GenerationError};

const PASSAGE_SEPARATOR: &str = "\n\n";

/// Answers a question from retrieved context only.
#[derive(Clone)]
pub struct AnswerChain {
    generator: Arc<dyn GenerationClient>,
    timeout: Duration,
}

impl AnswerChain {
    /// Chain invoking `generator`, bounded by `timeout`.
    pub fn new(generator: Arc<dyn GenerationClient>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    /// Produce an answer to `query` grounded in `context`.
    ///
    /// An empty context is still sent; the prompt then carries no passages and the model is
    /// expected to say it cannot answer.
    pub async fn answer(&self, query: &str, context: &ContextSet) -> Result<String, GenerationError> {
        let assembled = assemble_context(context);
        let request = render_request(query, &assembled);
        tracing::debug!(
            model = self.generator.model_name(),
            passages = context.len(),
            prompt_chars = request.prompt.chars().count(),
            "Generating answer"
        );

        let raw = with_timeout(self.timeout, "answer generation", self.generator.generate(request)).await?;
        trim_answer(&raw)
    }
}

fn assemble_context(context: &ContextSet) -> String {
    context.texts().collect::<Vec<_>>().join(PASSAGE_SEPARATOR)
}

fn render_request(query: &str, assembled: &str) -> CompletionRequest {
    CompletionRequest::new(
        GroundedAnswerPrompt {
            context: assembled,
            question: query,
        }
        .render(),
    )
}

fn trim_answer(raw: &str) -> Result<String, GenerationError> {
    let answer = raw.trim();
    if answer.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(answer.to_string())
}
