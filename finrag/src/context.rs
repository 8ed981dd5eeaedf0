//! Assembly of retrieved passages into a prompt context block.

use serde::{Deserialize, Serialize};

use crate::document::RerankedResult;

/// Returned when a query retrieved nothing at all.
pub const NO_RELEVANT_CONTEXT: &str = "No relevant information found in knowledge base.\n\
    Answer from general knowledge and state clearly that the answer is not backed by the knowledge base.";

/// Limits applied while assembling context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Maximum number of passages included.
    pub max_passages: usize,
    /// Passages shorter than this many chars are skipped (titles, fragments).
    pub min_passage_chars: usize,
    /// Passages included unfiltered when none passes the length filter.
    pub fallback_passages: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self { max_passages: 5, min_passage_chars: 50, fallback_passages: 2 }
    }
}

/// Formats ranked results into an attributed context string.
#[derive(Debug, Clone, Default)]
pub struct ContextAssembler {
    config: ContextConfig,
}

impl ContextAssembler {
    /// Create an assembler with the given limits.
    pub fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    /// The limits in use.
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Build the context block for `query` from `results`, best first.
    ///
    /// Each included passage is prefixed with `[Source n: <source> - Relevance: <score>]`
    /// so the consumer can cite it. If every passage is too short, the top
    /// `fallback_passages` are included as-is. With no results at all,
    /// [`NO_RELEVANT_CONTEXT`] is returned.
    pub fn build_context(&self, query: &str, results: &[RerankedResult]) -> String {
        if results.is_empty() {
            return NO_RELEVANT_CONTEXT.to_string();
        }

        let mut context = format!("Based on the following information relevant to: '{query}'\n");
        let mut included = 0;

        for result in results {
            if included >= self.config.max_passages {
                break;
            }
            if result.content().chars().count() < self.config.min_passage_chars {
                continue;
            }
            included += 1;
            context.push_str(&format!(
                "\n[Source {included}: {} - Relevance: {:.3}]\n{}\n",
                result.source(),
                result.score(),
                result.content()
            ));
        }

        if included == 0 {
            context.push_str("\n[Available Information]\n");
            for result in results.iter().take(self.config.fallback_passages.max(1)) {
                context.push_str(result.content());
                context.push('\n');
            }
        }

        context.push_str(
            "\nPlease provide a comprehensive answer based on this information, citing the relevant sources.",
        );
        context
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::document::{ChunkMetadata, RetrievalResult};

    fn ranked(source: &str, content: &str, score: f32) -> RerankedResult {
        RerankedResult {
            result: RetrievalResult {
                content: content.to_string(),
                score,
                metadata: ChunkMetadata {
                    source: source.to_string(),
                    category: "general".to_string(),
                    chunk_id: format!("{source}_0"),
                    document_id: source.to_string(),
                    chunk_index: 0,
                    extra: HashMap::new(),
                },
                source: source.to_string(),
            },
            rerank_score: score,
        }
    }

    fn passage(word: &str) -> String {
        format!("{word} ").repeat(20)
    }

    #[test]
    fn no_results_returns_sentinel() {
        let context = ContextAssembler::default().build_context("anything", &[]);
        assert_eq!(context, NO_RELEVANT_CONTEXT);
        assert!(context.contains("general knowledge"));
    }

    #[test]
    fn attributes_passages_and_skips_fragments() {
        let results = vec![
            ranked("Investopedia", "401(k) Plans", 0.91),
            ranked("Investopedia", &passage("contribution"), 0.88),
            ranked("NerdWallet", &passage("match"), 0.7512),
        ];
        let context = ContextAssembler::default().build_context("401k limits", &results);

        let header = "Based on the following information relevant to: '401k limits'";
        assert!(context.starts_with(header));
        assert!(context.contains("[Source 1: Investopedia - Relevance: 0.880]"));
        assert!(context.contains("[Source 2: NerdWallet - Relevance: 0.751]"));
        assert!(!context.contains("401(k) Plans"));
        assert!(context.ends_with("citing the relevant sources."));
    }

    #[test]
    fn stops_at_max_passages() {
        let results: Vec<RerankedResult> =
            (0..8).map(|i| ranked(&format!("s{i}"), &passage("bond"), 0.5)).collect();
        let context = ContextAssembler::default().build_context("bonds", &results);
        assert!(context.contains("[Source 5: s4"));
        assert!(!context.contains("[Source 6:"));
    }

    #[test]
    fn falls_back_to_top_results_when_all_are_short() {
        let results = vec![
            ranked("a", "Title one", 0.9),
            ranked("b", "Title two", 0.8),
            ranked("c", "Title three", 0.7),
        ];
        let context = ContextAssembler::default().build_context("titles", &results);
        assert!(context.contains("[Available Information]"));
        assert!(context.contains("Title one"));
        assert!(context.contains("Title two"));
        assert!(!context.contains("Title three"));
        assert!(!context.contains("[Source"));
    }
}
