//! Embedding provider trait for generating vector embeddings from text.
//!
//! Also home to the ingestion-side batch policy: a failed batch is retried
//! once as single-item calls, and items that still fail are dropped and
//! reported in a [`BatchOutcome`] instead of aborting the run.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::error::{RagError, Result};

/// Batch size used when a provider does not state a preference.
pub const DEFAULT_BATCH_SIZE: usize = 8;

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap a specific embedding backend (an in-process model or a
/// remote API) behind a unified async interface. All vectors returned by one
/// provider instance must share a dimensionality; the
/// [`VectorIndex`](crate::index::VectorIndex) rejects any that do not.
///
/// # Example
///
/// ```rust,ignore
/// use finrag::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let vectors = provider.embed_documents(&["401k basics", "bond ladders"]).await?;
/// let query = provider.embed_query("what is a 401k?").await?;
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate one embedding per input text, in input order.
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Generate an embedding for a search query.
    ///
    /// The default implementation embeds the query as a one-item batch.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_documents(&[text]).await?;
        match vectors.len() {
            1 => Ok(vectors.remove(0)),
            n => Err(RagError::EmbeddingError {
                provider: self.name().to_string(),
                message: format!("expected 1 query embedding, got {n}"),
            }),
        }
    }

    /// Short backend name used in logs and errors.
    fn name(&self) -> &str;

    /// Preferred number of texts per [`embed_documents`](Self::embed_documents)
    /// call during ingestion.
    fn batch_size(&self) -> usize {
        DEFAULT_BATCH_SIZE
    }
}

/// The result of embedding one ingestion batch.
///
/// Indices refer to positions in the slice passed to [`embed_batch_with_fallback`].
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Successfully embedded items, in input order.
    pub embedded: Vec<(usize, Vec<f32>)>,
    /// Items that failed both the batch call and their single-item retry.
    pub failed: Vec<(usize, RagError)>,
}

impl BatchOutcome {
    /// Whether every item of the batch was embedded.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Embed `texts` as one batch, retrying each item alone if the batch fails.
///
/// A batch that returns a different number of vectors than it was given is
/// treated as failed. There is exactly one retry pass; items that fail it are
/// logged and dropped.
pub async fn embed_batch_with_fallback<P>(provider: &P, texts: &[&str]) -> BatchOutcome
where
    P: EmbeddingProvider + ?Sized,
{
    if texts.is_empty() {
        return BatchOutcome::default();
    }

    let batch_error = match provider.embed_documents(texts).await {
        Ok(vectors) if vectors.len() == texts.len() => {
            return BatchOutcome {
                embedded: vectors.into_iter().enumerate().collect(),
                failed: Vec::new(),
            };
        }
        Ok(vectors) => RagError::EmbeddingError {
            provider: provider.name().to_string(),
            message: format!("batch of {} returned {} vectors", texts.len(), vectors.len()),
        },
        Err(e) => e,
    };

    warn!(
        provider = provider.name(),
        batch_size = texts.len(),
        error = %batch_error,
        "batch embedding failed, retrying items individually"
    );

    let mut outcome = BatchOutcome::default();
    for (i, text) in texts.iter().enumerate() {
        match provider.embed_documents(&[*text]).await {
            Ok(mut vectors) if vectors.len() == 1 => outcome.embedded.push((i, vectors.remove(0))),
            Ok(vectors) => {
                let error = RagError::EmbeddingError {
                    provider: provider.name().to_string(),
                    message: format!("single-item call returned {} vectors", vectors.len()),
                };
                warn!(provider = provider.name(), item = i, error = %error, "dropping chunk");
                outcome.failed.push((i, error));
            }
            Err(error) => {
                warn!(provider = provider.name(), item = i, error = %error, "dropping chunk");
                outcome.failed.push((i, error));
            }
        }
    }

    debug!(
        provider = provider.name(),
        embedded = outcome.embedded.len(),
        failed = outcome.failed.len(),
        "single-item retry finished"
    );

    outcome
}

/// Construct the provider selected by `config`.
///
/// # Errors
///
/// Returns [`RagError::ConfigError`] if the selected backend was not compiled
/// in, or if the remote API key variable is unset. Model loading and client
/// construction errors are passed through.
pub fn provider_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config {
        #[cfg(feature = "local")]
        EmbeddingConfig::Local { model, accelerated, cache_dir } => {
            let provider =
                crate::local::LocalEmbeddingProvider::new(model, *accelerated, cache_dir.clone())?;
            Ok(Arc::new(provider))
        }
        #[cfg(not(feature = "local"))]
        EmbeddingConfig::Local { .. } => Err(RagError::ConfigError(
            "local embeddings require the 'local' feature".to_string(),
        )),
        #[cfg(feature = "openai")]
        EmbeddingConfig::Remote { model, base_url, api_key_env, dimensions, retry } => {
            let api_key = std::env::var(api_key_env).map_err(|_| {
                RagError::ConfigError(format!("environment variable {api_key_env} not set"))
            })?;
            let mut provider = crate::openai::OpenAIEmbeddingProvider::new(api_key)?
                .with_model(model.as_str())
                .with_retry_policy(retry.clone());
            if let Some(base_url) = base_url {
                provider = provider.with_base_url(base_url.as_str());
            }
            if let Some(dimensions) = dimensions {
                provider = provider.with_dimensions(*dimensions);
            }
            Ok(Arc::new(provider))
        }
        #[cfg(not(feature = "openai"))]
        EmbeddingConfig::Remote { .. } => Err(RagError::ConfigError(
            "remote embeddings require the 'openai' feature".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Fails any call containing "poison"; fails every multi-item call when `flaky_batches` is set.
    struct ScriptedProvider {
        flaky_batches: bool,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(flaky_batches: bool) -> Self {
            Self { flaky_batches, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for ScriptedProvider {
        async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let poisoned = texts.iter().any(|t| t.contains("poison"));
            if (self.flaky_batches && texts.len() > 1) || poisoned {
                return Err(RagError::EmbeddingError {
                    provider: "scripted".into(),
                    message: "rejected".into(),
                });
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn healthy_batch_is_one_call() {
        let provider = ScriptedProvider::new(false);
        let outcome = embed_batch_with_fallback(&provider, &["a", "bb", "ccc"]).await;
        assert!(outcome.is_complete());
        assert_eq!(outcome.embedded.len(), 3);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_batch_recovers_through_single_items() {
        let provider = ScriptedProvider::new(true);
        let outcome = embed_batch_with_fallback(&provider, &["a", "bb", "ccc"]).await;
        assert!(outcome.is_complete());
        let indices: Vec<usize> = outcome.embedded.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn permanently_failing_item_is_dropped() {
        let provider = ScriptedProvider::new(false);
        let outcome = embed_batch_with_fallback(&provider, &["a", "poison", "ccc"]).await;
        let indices: Vec<usize> = outcome.embedded.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, 1);
    }

    #[cfg(not(feature = "local"))]
    #[test]
    fn local_backend_without_feature_is_a_config_error() {
        let result = provider_from_config(&EmbeddingConfig::default());
        assert!(matches!(result, Err(RagError::ConfigError(_))));
    }

    #[cfg(feature = "openai")]
    #[test]
    fn remote_backend_needs_its_key_variable() {
        let config = EmbeddingConfig::Remote {
            model: "text-embedding-3-small".into(),
            base_url: None,
            api_key_env: "FINRAG_TEST_KEY_THAT_IS_NEVER_SET".into(),
            dimensions: None,
            retry: crate::retry::RetryPolicy::none(),
        };
        assert!(matches!(provider_from_config(&config), Err(RagError::ConfigError(_))));
    }

    #[tokio::test]
    async fn default_query_embedding_uses_single_item_batch() {
        let provider = ScriptedProvider::new(false);
        assert_eq!(provider.embed_query("abcd").await.unwrap(), vec![4.0, 1.0]);
    }
}
