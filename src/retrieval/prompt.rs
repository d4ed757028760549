//! Prompt templates, rendered from named fields.

/// Asks the model for alternative phrasings of a question.
#[derive(Debug, Clone, Copy)]
pub struct ExpansionPrompt<'a> {
    /// The user's question.
    pub question: &'a str,
    /// How many rephrasings to request.
    pub variants: usize,
}

impl ExpansionPrompt<'_> {
    /// Render the prompt text.
    pub fn render(&self) -> String {
        format!(
            "You are an AI language model assistant. Your task is to generate {count} \
             different versions of the given user question to retrieve relevant documents from \
             a vector database. By generating multiple perspectives on the user question, your \
             goal is to help the user overcome some of the limitations of the distance-based \
             similarity search. Provide these alternative questions separated by newlines.\n\
             Original question: {question}",
            count = self.variants,
            question = self.question.trim(),
        )
    }
}

/// Asks the model to answer strictly from the supplied context.
#[derive(Debug, Clone, Copy)]
pub struct GroundedAnswerPrompt<'a> {
    /// Retrieved passages, already joined.
    pub context: &'a str,
    /// The user's question.
    pub question: &'a str,
}

impl GroundedAnswerPrompt<'_> {
    /// Render the prompt text.
    pub fn render(&self) -> String {
        format!(
            "Answer the question based ONLY on the following context:\n{context}\n\nQuestion: {question}\n",
            context = self.context,
            question = self.question.trim(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expansion_prompt_names_count_and_question() {
        let prompt = ExpansionPrompt {
            question: "  What is the purpose of the document? ",
            variants: 3,
        }
        .render();
        assert!(prompt.contains("generate 3 different versions"));
        assert!(prompt.ends_with("Original question: What is the purpose of the document?"));
        assert!(prompt.contains("separated by newlines"));
    }

    #[test]
    fn grounded_prompt_places_context_before_question() {
        let prompt = GroundedAnswerPrompt {
            context: "Passage one.\n\nPassage two.",
            question: "Who wrote it?",
        }
        .render();
        assert!(prompt.starts_with("Answer the question based ONLY on the following context:\n"));
        let context_at = prompt.find("Passage two.").expect("context present");
        let question_at = prompt.find("Question: Who wrote it?").expect("question present");
        assert!(context_at < question_at);
    }
}
