//! Local in-process embedding provider backed by `fastembed`.
//!
//! This module is only available when the `local` feature is enabled.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, TextEmbedding, TextInitOptions};
use tracing::{debug, error, info};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// The default local model, `all-MiniLM-L6-v2` (384 dimensions).
pub const DEFAULT_LOCAL_MODEL: &str = "AllMiniLML6V2";

/// Batch size when inference runs on an accelerator.
pub const ACCELERATED_BATCH_SIZE: usize = 32;

/// Batch size for CPU inference.
pub const CPU_BATCH_SIZE: usize = 8;

const PROVIDER: &str = "local";

/// An [`EmbeddingProvider`] running an ONNX sentence-embedding model in-process.
///
/// The model is loaded (and downloaded on first use into `cache_dir`) when the
/// provider is constructed. Inference runs on tokio's blocking pool, one call
/// at a time, because the underlying session needs exclusive access.
///
/// # Example
///
/// ```rust,ignore
/// use finrag::local::LocalEmbeddingProvider;
///
/// let provider = LocalEmbeddingProvider::new(DEFAULT_LOCAL_MODEL, false, None)?;
/// let vectors = provider.embed_documents(&["dividend yield"]).await?;
/// ```
pub struct LocalEmbeddingProvider {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
    batch_size: usize,
}

impl LocalEmbeddingProvider {
    /// Load `model_name`.
    ///
    /// `accelerated` selects the larger ingestion batch size used when the ONNX
    /// runtime has a hardware execution provider available.
    pub fn new(model_name: &str, accelerated: bool, cache_dir: Option<PathBuf>) -> Result<Self> {
        let model = resolve_model(model_name)?;

        let mut options = TextInitOptions::new(model).with_show_download_progress(false);
        if let Some(dir) = cache_dir {
            options = options.with_cache_dir(dir);
        }

        let embedding = TextEmbedding::try_new(options).map_err(|e| {
            error!(provider = PROVIDER, model = model_name, error = %e, "failed to load model");
            RagError::EmbeddingError { provider: PROVIDER.into(), message: e.to_string() }
        })?;

        let batch_size = if accelerated { ACCELERATED_BATCH_SIZE } else { CPU_BATCH_SIZE };
        info!(provider = PROVIDER, model = model_name, batch_size, "loaded embedding model");

        Ok(Self {
            model: Arc::new(Mutex::new(embedding)),
            model_name: model_name.to_string(),
            batch_size,
        })
    }

    /// The loaded model's name.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Look up a fastembed model by variant name (`AllMiniLML6V2`) or by model
/// code (`Qdrant/all-MiniLM-L6-v2-onnx`), both case-insensitive.
///
/// # Errors
///
/// Returns [`RagError::ConfigError`] when no supported model matches.
pub fn resolve_model(name: &str) -> Result<EmbeddingModel> {
    if let Ok(model) = name.parse::<EmbeddingModel>() {
        return Ok(model);
    }
    TextEmbedding::list_supported_models()
        .into_iter()
        .find(|info| info.model_code.eq_ignore_ascii_case(name))
        .map(|info| info.model)
        .ok_or_else(|| RagError::ConfigError(format!("unknown local embedding model '{name}'")))
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = PROVIDER, batch_size = texts.len(), "embedding batch");
        let owned: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        let model = Arc::clone(&self.model);
        let batch_size = self.batch_size;

        tokio::task::spawn_blocking(move || {
            let mut model = model.lock().map_err(|_| RagError::EmbeddingError {
                provider: PROVIDER.into(),
                message: "model lock poisoned".to_string(),
            })?;
            model.embed(owned, Some(batch_size)).map_err(|e| RagError::EmbeddingError {
                provider: PROVIDER.into(),
                message: e.to_string(),
            })
        })
        .await
        .map_err(|e| RagError::EmbeddingError {
            provider: PROVIDER.into(),
            message: format!("inference task failed: {e}"),
        })?
    }

    fn name(&self) -> &str {
        PROVIDER
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;

    #[test]
    fn default_model_resolves() {
        assert_eq!(resolve_model(DEFAULT_LOCAL_MODEL).unwrap(), EmbeddingModel::AllMiniLML6V2);
        match EmbeddingConfig::default() {
            EmbeddingConfig::Local { model, .. } => assert!(resolve_model(&model).is_ok()),
            other => panic!("expected a local default, got {other:?}"),
        }
    }

    #[test]
    fn model_codes_resolve_and_unknown_names_fail() {
        let code = TextEmbedding::list_supported_models()
            .into_iter()
            .find(|info| info.model == EmbeddingModel::AllMiniLML6V2)
            .map(|info| info.model_code)
            .unwrap();
        assert!(resolve_model(&code.to_uppercase()).is_ok());
        assert!(matches!(resolve_model("no/such-model"), Err(RagError::ConfigError(_))));
    }
}
