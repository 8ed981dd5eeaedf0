//! Configuration for the retrieval pipeline.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::context::ContextConfig;
use crate::error::{RagError, Result};
use crate::reranker::RerankWeights;
use crate::retry::RetryPolicy;

/// Which embedding backend to construct.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmbeddingConfig {
    /// In-process model (requires the `local` feature).
    Local {
        /// Model identifier understood by the local runtime.
        model: String,
        /// Use the larger batch size for hardware-accelerated inference.
        #[serde(default)]
        accelerated: bool,
        /// Where downloaded model files are cached.
        #[serde(default)]
        cache_dir: Option<PathBuf>,
    },
    /// OpenAI-compatible API (requires the `openai` feature).
    Remote {
        /// Model name sent with each request.
        model: String,
        /// API base URL; the public OpenAI API when unset.
        #[serde(default)]
        base_url: Option<String>,
        /// Environment variable holding the API key.
        #[serde(default = "default_api_key_env")]
        api_key_env: String,
        /// Optional truncated output dimensionality.
        #[serde(default)]
        dimensions: Option<usize>,
        /// Backoff policy for transient failures.
        #[serde(default)]
        retry: RetryPolicy,
    },
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig::Local {
            model: "AllMiniLML6V2".to_string(),
            accelerated: false,
            cache_dir: None,
        }
    }
}

/// Configuration parameters for the retrieval pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of results returned by a query.
    pub top_k: usize,
    /// Candidates fetched per requested result before reranking.
    pub oversample_factor: usize,
    /// Expand queries with related domain terms when assembling answer
    /// context. Category retrieval never expands.
    pub enhance_query: bool,
    /// Directory holding persisted index artifacts.
    pub index_dir: PathBuf,
    /// Shared name of the persisted artifacts.
    pub index_name: String,
    /// Reranking weights.
    pub rerank: RerankWeights,
    /// Context assembly limits.
    pub context: ContextConfig,
    /// Embedding backend selection.
    pub embedding: EmbeddingConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            top_k: 5,
            oversample_factor: 2,
            enhance_query: true,
            index_dir: PathBuf::from("data/index"),
            index_name: "finance_kb".to_string(),
            rerank: RerankWeights::default(),
            context: ContextConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Read and validate a JSON configuration file. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the file cannot be read or parsed,
    /// or fails validation.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RagError::ConfigError(format!("failed to read '{}': {e}", path.display()))
        })?;
        let config: RagConfig = serde_json::from_str(&raw).map_err(|e| {
            RagError::ConfigError(format!("failed to parse '{}': {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `top_k == 0` or `oversample_factor == 0`
    /// - `index_name` is empty
    /// - a rerank weight is negative or not finite
    /// - `context.max_passages == 0`
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if self.oversample_factor == 0 {
            return Err(RagError::ConfigError(
                "oversample_factor must be greater than zero".to_string(),
            ));
        }
        if self.index_name.trim().is_empty() {
            return Err(RagError::ConfigError("index_name must not be empty".to_string()));
        }
        self.rerank.validate()?;
        if self.context.max_passages == 0 {
            return Err(RagError::ConfigError(
                "context.max_passages must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of results returned by a query.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set how many candidates per requested result are fetched before reranking.
    pub fn oversample_factor(mut self, factor: usize) -> Self {
        self.config.oversample_factor = factor;
        self
    }

    /// Enable or disable query enhancement.
    pub fn enhance_query(mut self, enabled: bool) -> Self {
        self.config.enhance_query = enabled;
        self
    }

    /// Set the directory for persisted artifacts.
    pub fn index_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.index_dir = dir.into();
        self
    }

    /// Set the shared name of the persisted artifacts.
    pub fn index_name(mut self, name: impl Into<String>) -> Self {
        self.config.index_name = name.into();
        self
    }

    /// Set the reranking weights.
    pub fn rerank(mut self, weights: RerankWeights) -> Self {
        self.config.rerank = weights;
        self
    }

    /// Set the context assembly limits.
    pub fn context(mut self, context: ContextConfig) -> Self {
        self.config.context = context;
        self
    }

    /// Select the embedding backend.
    pub fn embedding(mut self, embedding: EmbeddingConfig) -> Self {
        self.config.embedding = embedding;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_corpus_settings() {
        let config = RagConfig::default();
        assert_eq!((config.chunk_size, config.chunk_overlap), (500, 50));
        assert_eq!(config.top_k, 5);
        assert_eq!(config.oversample_factor, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_rejects_inconsistent_values() {
        assert!(RagConfig::builder().chunk_size(100).chunk_overlap(100).build().is_err());
        assert!(RagConfig::builder().top_k(0).build().is_err());
        assert!(RagConfig::builder().oversample_factor(0).build().is_err());
        assert!(RagConfig::builder().index_name("  ").build().is_err());
        assert!(
            RagConfig::builder()
                .rerank(RerankWeights { similarity: -1.0, ..RerankWeights::default() })
                .build()
                .is_err()
        );
    }

    #[test]
    fn json_file_fills_missing_fields_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rag.json");
        std::fs::write(
            &path,
            r#"{
                "chunk_size": 800,
                "index_name": "kb",
                "embedding": { "kind": "remote", "model": "text-embedding-3-small" }
            }"#,
        )
        .unwrap();

        let config = RagConfig::from_json_file(&path).unwrap();
        assert_eq!(config.chunk_size, 800);
        assert_eq!(config.chunk_overlap, 50);
        assert_eq!(config.index_name, "kb");
        match config.embedding {
            EmbeddingConfig::Remote { api_key_env, retry, .. } => {
                assert_eq!(api_key_env, "OPENAI_API_KEY");
                assert_eq!(retry, RetryPolicy::default());
            }
            other => panic!("unexpected embedding config: {other:?}"),
        }
    }

    #[test]
    fn json_file_errors_are_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(RagConfig::from_json_file(&path), Err(RagError::ConfigError(_))));
        assert!(matches!(
            RagConfig::from_json_file(dir.path().join("missing.json")),
            Err(RagError::ConfigError(_))
        ));
    }
}
