//! Domain keyword expansion for search queries.

use serde::{Deserialize, Serialize};

/// Number of related terms a triggered group contributes.
const TERMS_PER_GROUP: usize = 2;

/// A named set of related domain terms.
///
/// The group fires when its name or any of its keywords occurs in a query as
/// whole words; it then contributes its leading keywords to the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordGroup {
    /// Group name, itself a trigger term.
    pub name: String,
    /// Related terms, most representative first.
    pub keywords: Vec<String>,
}

impl KeywordGroup {
    /// Create a group from string slices.
    pub fn new(name: &str, keywords: &[&str]) -> Self {
        Self { name: name.to_string(), keywords: keywords.iter().map(|k| k.to_string()).collect() }
    }
}

/// Appends related financial terms to a query to widen recall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryEnhancer {
    groups: Vec<KeywordGroup>,
}

impl Default for QueryEnhancer {
    fn default() -> Self {
        Self::new(vec![
            KeywordGroup::new(
                "investment",
                &["stocks", "bonds", "ETFs", "mutual funds", "portfolio"],
            ),
            KeywordGroup::new("retirement", &["401k", "IRA", "pension", "social security"]),
            KeywordGroup::new("risk", &["volatility", "diversification", "asset allocation"]),
            KeywordGroup::new("analysis", &["valuation", "ratios", "performance", "metrics"]),
        ])
    }
}

impl QueryEnhancer {
    /// Create an enhancer over custom keyword groups.
    pub fn new(groups: Vec<KeywordGroup>) -> Self {
        Self { groups }
    }

    /// The configured groups.
    pub fn groups(&self) -> &[KeywordGroup] {
        &self.groups
    }

    /// Return `query` with the related terms of every triggered group appended.
    ///
    /// Terms already present in the query are not repeated. When nothing
    /// triggers, the query is returned unchanged.
    pub fn enhance(&self, query: &str) -> String {
        let normalized = normalize(query);
        let mut additions: Vec<&str> = Vec::new();

        for group in &self.groups {
            let triggered = std::iter::once(&group.name)
                .chain(&group.keywords)
                .any(|term| contains_phrase(&normalized, term));
            if !triggered {
                continue;
            }
            for keyword in group.keywords.iter().take(TERMS_PER_GROUP) {
                let keyword = keyword.as_str();
                if !contains_phrase(&normalized, keyword) && !additions.contains(&keyword) {
                    additions.push(keyword);
                }
            }
        }

        if additions.is_empty() {
            query.to_string()
        } else {
            format!("{query} {}", additions.join(" "))
        }
    }
}

/// Lowercase, collapse non-alphanumerics to single spaces, and pad with spaces
/// so whole-word phrases can be found with `contains`.
fn normalize(text: &str) -> String {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    format!(" {} ", words.join(" "))
}

fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    let phrase = normalize(phrase);
    !phrase.trim().is_empty() && normalized.contains(&phrase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retirement_terms_expand_the_query() {
        let enhancer = QueryEnhancer::default();
        assert_eq!(
            enhancer.enhance("How much goes into my IRA?"),
            "How much goes into my IRA? 401k"
        );
        assert_eq!(enhancer.enhance("retirement planning"), "retirement planning 401k IRA");
    }

    #[test]
    fn multiple_groups_contribute_in_order() {
        let enhancer = QueryEnhancer::default();
        assert_eq!(
            enhancer.enhance("portfolio volatility"),
            "portfolio volatility stocks bonds diversification"
        );
    }

    #[test]
    fn unrelated_queries_are_unchanged() {
        let enhancer = QueryEnhancer::default();
        assert_eq!(enhancer.enhance("What is a credit score?"), "What is a credit score?");
    }

    #[test]
    fn matches_whole_words_only() {
        let enhancer = QueryEnhancer::default();
        // "aspiration" contains "ira", "brisk" contains "risk".
        assert_eq!(enhancer.enhance("aspiration brisk"), "aspiration brisk");
        assert_eq!(
            enhancer.enhance("Social-Security benefits"),
            "Social-Security benefits 401k IRA"
        );
    }
}
