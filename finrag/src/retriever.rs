//! Query-side orchestration: enhance, embed, search, filter, rerank.
//!
//! A [`Retriever`] fetches `oversample_factor · k` candidates from the
//! [`VectorIndex`] so the [`Reranker`] has room to trade similarity for source
//! diversity, then returns at most `k` results.

use std::sync::Arc;

use tracing::{debug, info};

use crate::document::RerankedResult;
use crate::embedding::EmbeddingProvider;
use crate::enhancer::QueryEnhancer;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::reranker::{DiversityReranker, Reranker};

/// Candidates fetched per requested result.
pub const DEFAULT_OVERSAMPLE_FACTOR: usize = 2;

/// Answers queries against a shared [`VectorIndex`].
///
/// # Example
///
/// ```rust,ignore
/// use finrag::Retriever;
///
/// let retriever = Retriever::new(provider, index);
/// let hits = retriever.retrieve("how do bond ladders work", 5, true).await?;
/// let tax_hits = retriever.retrieve_by_category("capital gains", "taxes", 3).await?;
/// ```
pub struct Retriever {
    provider: Arc<dyn EmbeddingProvider>,
    index: Arc<VectorIndex>,
    enhancer: QueryEnhancer,
    reranker: Arc<dyn Reranker>,
    oversample_factor: usize,
}

impl Retriever {
    /// Create a retriever with the default enhancer and a [`DiversityReranker`].
    pub fn new(provider: Arc<dyn EmbeddingProvider>, index: Arc<VectorIndex>) -> Self {
        Self {
            provider,
            index,
            enhancer: QueryEnhancer::default(),
            reranker: Arc::new(DiversityReranker::default()),
            oversample_factor: DEFAULT_OVERSAMPLE_FACTOR,
        }
    }

    /// Replace the query enhancer.
    pub fn with_enhancer(mut self, enhancer: QueryEnhancer) -> Self {
        self.enhancer = enhancer;
        self
    }

    /// Replace the reranker.
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = reranker;
        self
    }

    /// Set how many candidates per requested result are searched.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `factor` is zero.
    pub fn with_oversample_factor(mut self, factor: usize) -> Result<Self> {
        if factor == 0 {
            return Err(RagError::ConfigError(
                "oversample_factor must be greater than zero".to_string(),
            ));
        }
        self.oversample_factor = factor;
        Ok(self)
    }

    /// The index searched by this retriever.
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Return up to `k` reranked results for `query`.
    ///
    /// With `enhance` set, related domain terms are appended to the query
    /// before it is embedded; the reranker always sees the raw query. An empty
    /// index or `k == 0` yields an empty list without calling the provider.
    ///
    /// # Errors
    ///
    /// Propagates embedding failures and [`RagError::DimensionMismatch`] when
    /// the provider's vectors do not fit the index.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        enhance: bool,
    ) -> Result<Vec<RerankedResult>> {
        self.run(query, k, enhance, None).await
    }

    /// Like [`retrieve`](Self::retrieve), keeping only candidates whose
    /// category equals `category`.
    ///
    /// The query is embedded as given, without enhancement: the category
    /// already narrows the topic.
    ///
    /// The filter applies to the oversampled candidate pool, so fewer than `k`
    /// results (possibly none) may come back.
    pub async fn retrieve_by_category(
        &self,
        query: &str,
        category: &str,
        k: usize,
    ) -> Result<Vec<RerankedResult>> {
        self.run(query, k, false, Some(category)).await
    }

    async fn run(
        &self,
        query: &str,
        k: usize,
        enhance: bool,
        category: Option<&str>,
    ) -> Result<Vec<RerankedResult>> {
        if k == 0 || self.index.is_empty().await {
            return Ok(Vec::new());
        }

        let search_query = if enhance { self.enhancer.enhance(query) } else { query.to_string() };
        if search_query != query {
            debug!(query, enhanced = %search_query, "enhanced query");
        }

        let embedding = self.provider.embed_query(&search_query).await?;
        let pool = k.saturating_mul(self.oversample_factor);
        let mut candidates = self.index.search(&embedding, pool).await?;
        let searched = candidates.len();

        if let Some(category) = category {
            candidates.retain(|c| c.metadata.category == category);
        }
        if candidates.is_empty() {
            info!(query, category, searched, result_count = 0, "retrieval completed");
            return Ok(Vec::new());
        }

        let results = self.reranker.rerank(query, candidates, k).await?;
        info!(query, category, searched, result_count = results.len(), "retrieval completed");
        Ok(results)
    }
}
