//! Query expansion: one question in, several rephrasings out.

use crate::generation::{CompletionRequest, GenerationClient};
use crate::providers::{ProviderError, with_timeout};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use super::prompt::ExpansionPrompt;

/// Variants produced for one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    /// Rephrasings, or the original question alone when none were usable.
    pub variants: Vec<String>,
    /// Set when the model answered but nothing in its reply could be used.
    pub degraded: bool,
}

impl Expansion {
    fn original(query: &str, degraded: bool) -> Self {
        Self {
            variants: vec![query.trim().to_string()],
            degraded,
        }
    }
}

/// Generates alternative phrasings of a question through a generation model.
///
/// Variants are not checked for meaning; retrieval and deduplication absorb poor ones.
#[derive(Clone)]
pub struct QueryExpander {
    generator: Arc<dyn GenerationClient>,
    timeout: Duration,
}

impl QueryExpander {
    /// Expander calling `generator`, with each call bounded by `timeout`.
    pub fn new(generator: Arc<dyn GenerationClient>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    /// Ask for `n` rephrasings of `query`.
    ///
    /// Returns at most `n` distinct non-empty lines. When `n` is zero the original query is
    /// returned alone without calling the model; when the model yields nothing usable the
    /// original query is returned alone and the expansion is marked degraded.
    pub async fn expand(&self, query: &str, n: usize) -> Result<Expansion, ProviderError> {
        if n == 0 {
            return Ok(Expansion::original(query, false));
        }

        let prompt = ExpansionPrompt {
            question: query,
            variants: n,
        }
        .render();
        let raw = with_timeout(
            self.timeout,
            "query expansion",
            self.generator.generate(CompletionRequest::new(prompt)),
        )
        .await?;

        let variants = parse_variants(&raw, n);
        if variants.is_empty() {
            tracing::warn!(
                model = self.generator.model_name(),
                "Query expansion produced no usable variants; using the original question"
            );
            return Ok(Expansion::original(query, true));
        }

        tracing::debug!(requested = n, produced = variants.len(), "Expanded query");
        Ok(Expansion {
            variants,
            degraded: false,
        })
    }
}

/// Split model output into at most `limit` distinct, non-empty questions.
///
/// List markers (`1.`, `2)`, `-`, `*`) and wrapping quotes are stripped; preamble lines ending
/// in a colon are skipped; duplicates are detected case-insensitively.
pub(crate) fn parse_variants(raw: &str, limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut variants = Vec::new();

    for line in raw.lines() {
        let candidate = strip_list_marker(line.trim());
        let candidate = candidate
            .trim_matches(|c: char| c == '"' || c == '\u{201c}' || c == '\u{201d}')
            .trim();
        if candidate.is_empty() || candidate.ends_with(':') {
            continue;
        }
        if seen.insert(candidate.to_lowercase()) {
            variants.push(candidate.to_string());
        }
        if variants.len() == limit {
            break;
        }
    }

    variants
}

fn strip_list_marker(line: &str) -> &str {
    if let Some(rest) = line
        .strip_prefix('-')
        .or_else(|| line.strip_prefix('*'))
        .or_else(|| line.strip_prefix('\u{2022}'))
    {
        return rest.trim_start();
    }

    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return rest.trim_start();
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGenerator;

    #[test]
    fn parse_variants_strips_markers_and_blank_lines() {
        let raw = "Here are five alternative questions:\n\n1. What is the goal of this report?\n2) Why was the document written?\n- What problem does it address?\n\"What is its intent?\"\n";
        let variants = parse_variants(raw, 5);
        assert_eq!(
            variants,
            vec![
                "What is the goal of this report?",
                "Why was the document written?",
                "What problem does it address?",
                "What is its intent?",
            ]
        );
    }

    #[test]
    fn parse_variants_dedupes_and_limits() {
        let raw = "Same question?\nsame QUESTION?\nOther one?\nThird?\nFourth?";
        assert_eq!(parse_variants(raw, 2), vec!["Same question?", "Other one?"]);
    }

    #[test]
    fn strip_list_marker_keeps_numbers_inside_text() {
        assert_eq!(strip_list_marker("2024 budget totals?"), "2024 budget totals?");
        assert_eq!(strip_list_marker("10. Tenth?"), "Tenth?");
    }

    #[tokio::test]
    async fn expand_returns_parsed_variants() {
        let generator = Arc::new(ScriptedGenerator::replying("A?\nB?\nC?"));
        let expander = QueryExpander::new(generator.clone(), Duration::from_secs(5));

        let expansion = expander.expand("Original?", 3).await.expect("variants");
        assert_eq!(expansion.variants, vec!["A?", "B?", "C?"]);
        assert!(!expansion.degraded);

        let requests = generator.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].prompt.contains("Original question: Original?"));
    }

    #[tokio::test]
    async fn expand_falls_back_to_original_when_output_is_unusable() {
        let generator = Arc::new(ScriptedGenerator::replying("\n  \n"));
        let expander = QueryExpander::new(generator, Duration::from_secs(5));

        let expansion = expander.expand(" Original? ", 5).await.expect("variants");
        assert_eq!(expansion.variants, vec!["Original?"]);
        assert!(expansion.degraded);
    }

    #[tokio::test]
    async fn expand_with_zero_variants_skips_the_model() {
        let generator = Arc::new(ScriptedGenerator::replying("unused"));
        let expander = QueryExpander::new(generator.clone(), Duration::from_secs(5));

        let expansion = expander.expand("Original?", 0).await.expect("variants");
        assert_eq!(expansion, Expansion::original("Original?", false));
        assert!(generator.requests().is_empty());
    }

    #[tokio::test]
    async fn expand_surfaces_model_failures() {
        let generator = Arc::new(ScriptedGenerator::new(|_| {
            Err(ProviderError::Unavailable("connection refused".into()))
        }));
        let expander = QueryExpander::new(generator, Duration::from_secs(5));

        let error = expander.expand("Original?", 5).await.unwrap_err();
        assert!(matches!(error, ProviderError::Unavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_model_times_out() {
        let generator = Arc::new(ScriptedGenerator::hanging("A?"));
        let expander = QueryExpander::new(generator, Duration::from_secs(30));

        let error = expander.expand("Original?", 3).await.unwrap_err();
        assert!(matches!(error, ProviderError::Timeout { .. }));
        assert!(error.is_transient());
    }
}
