//! Rerankers that re-score search candidates.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{RerankedResult, RetrievalResult};
use crate::error::{RagError, Result};

/// A reranker that re-scores and reorders search candidates.
///
/// Candidates arrive in descending similarity order, as returned by
/// [`VectorIndex::search`](crate::index::VectorIndex::search). Implementations
/// return at most `k` results, best first.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Rerank `candidates` for `query` and keep the best `k`.
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RetrievalResult>,
        k: usize,
    ) -> Result<Vec<RerankedResult>>;
}

/// A reranker that keeps the similarity order.
///
/// The composite score is the raw similarity.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReranker;

#[async_trait]
impl Reranker for NoOpReranker {
    async fn rerank(
        &self,
        _query: &str,
        candidates: Vec<RetrievalResult>,
        k: usize,
    ) -> Result<Vec<RerankedResult>> {
        Ok(candidates
            .into_iter()
            .take(k)
            .map(|result| RerankedResult { rerank_score: result.score, result })
            .collect())
    }
}

/// Weights of the composite score computed by [`DiversityReranker`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankWeights {
    /// Weight of the raw similarity score.
    pub similarity: f32,
    /// Weight of the source-diversity bonus.
    pub diversity: f32,
    /// Weight of the content-length score.
    pub length: f32,
    /// Content length (chars) at which the length score saturates at 1.0.
    pub length_norm_chars: usize,
}

impl Default for RerankWeights {
    fn default() -> Self {
        Self { similarity: 0.7, diversity: 0.2, length: 0.1, length_norm_chars: 500 }
    }
}

impl RerankWeights {
    /// Check that every weight is finite and non-negative.
    pub fn validate(&self) -> Result<()> {
        for (name, weight) in
            [
                ("similarity", self.similarity),
                ("diversity", self.diversity),
                ("length", self.length),
            ]
        {
            if !weight.is_finite() || weight < 0.0 {
                return Err(RagError::ConfigError(format!(
                    "rerank weight '{name}' must be a non-negative number, got {weight}"
                )));
            }
        }
        if self.length_norm_chars == 0 {
            return Err(RagError::ConfigError(
                "rerank length_norm_chars must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Balances similarity against source diversity and passage substance.
///
/// For each candidate, in the order given:
///
/// ```text
/// score = w_sim · similarity
///       + w_div · 1 / (candidates seen so far from this source, including this one)
///       + w_len · min(chars(content) / length_norm_chars, 1.0)
/// ```
///
/// The first candidate from a source gets the full diversity bonus, the
/// second half of it, and so on, so a source that dominates the pool sinks.
/// Results are stable-sorted by descending score and truncated to `k`.
#[derive(Debug, Clone, Default)]
pub struct DiversityReranker {
    weights: RerankWeights,
}

impl DiversityReranker {
    /// Create a reranker with the given weights.
    pub fn new(weights: RerankWeights) -> Self {
        Self { weights }
    }

    /// The weights in use.
    pub fn weights(&self) -> &RerankWeights {
        &self.weights
    }

    /// Score and order `candidates` without the async wrapper.
    pub fn rerank_sync(&self, candidates: Vec<RetrievalResult>, k: usize) -> Vec<RerankedResult> {
        let w = &self.weights;
        let mut seen: HashMap<String, usize> = HashMap::new();

        let mut scored: Vec<RerankedResult> = candidates
            .into_iter()
            .map(|result| {
                let count = seen.entry(result.source.clone()).or_default();
                *count += 1;
                let diversity_bonus = 1.0 / *count as f32;
                let length_score =
                    (result.content.chars().count() as f32 / w.length_norm_chars as f32).min(1.0);
                let rerank_score = w.similarity * result.score
                    + w.diversity * diversity_bonus
                    + w.length * length_score;
                RerankedResult { result, rerank_score }
            })
            .collect();

        scored.sort_by(|a, b| b.rerank_score.total_cmp(&a.rerank_score));
        scored.truncate(k);
        scored
    }
}

#[async_trait]
impl Reranker for DiversityReranker {
    async fn rerank(
        &self,
        _query: &str,
        candidates: Vec<RetrievalResult>,
        k: usize,
    ) -> Result<Vec<RerankedResult>> {
        Ok(self.rerank_sync(candidates, k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ChunkMetadata;

    fn candidate(source: &str, score: f32, content_len: usize) -> RetrievalResult {
        RetrievalResult {
            content: "x".repeat(content_len),
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
        }
    }

    fn pool() -> Vec<RetrievalResult> {
        vec![
            candidate("A", 0.95, 500),
            candidate("A", 0.93, 500),
            candidate("A", 0.91, 500),
            candidate("A", 0.89, 500),
            candidate("B", 0.85, 500),
            candidate("B", 0.80, 500),
        ]
    }

    #[tokio::test]
    async fn diversity_bonus_lifts_second_source_into_top_k() {
        let reranked = DiversityReranker::default().rerank("q", pool(), 3).await.unwrap();
        assert_eq!(reranked.len(), 3);
        assert!(reranked.iter().any(|r| r.source() == "B"));
        assert_eq!(reranked[0].source(), "A");
        assert_eq!(reranked[1].source(), "B");
    }

    #[tokio::test]
    async fn similarity_order_alone_excludes_second_source() {
        let ranked = NoOpReranker.rerank("q", pool(), 3).await.unwrap();
        assert!(ranked.iter().all(|r| r.source() == "A"));
    }

    #[test]
    fn composite_score_matches_formula() {
        let reranker = DiversityReranker::default();
        let candidates = vec![candidate("A", 0.9, 250), candidate("A", 0.5, 1000)];
        let reranked = reranker.rerank_sync(candidates, 2);
        assert!((reranked[0].rerank_score - (0.63 + 0.2 + 0.05)).abs() < 1e-6);
        assert!((reranked[1].rerank_score - (0.35 + 0.1 + 0.1)).abs() < 1e-6);
        // The raw similarity is preserved alongside the composite.
        assert!((reranked[0].score() - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn empty_pool_yields_nothing() {
        assert!(DiversityReranker::default().rerank_sync(Vec::new(), 5).is_empty());
    }

    #[test]
    fn rejects_negative_weights() {
        let weights = RerankWeights { diversity: -0.1, ..RerankWeights::default() };
        assert!(weights.validate().is_err());
        assert!(RerankWeights::default().validate().is_ok());
    }
}
