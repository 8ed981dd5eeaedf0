//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] wires a [`Chunker`], an [`EmbeddingProvider`], a
//! shared [`VectorIndex`], an optional [`PersistenceStore`], a [`Retriever`]
//! and a [`ContextAssembler`] into one ingest-and-query surface.
//!
//! # Example
//!
//! ```rust,ignore
//! use finrag::{RagConfig, RagPipeline};
//!
//! let config = RagConfig::default();
//! let pipeline = RagPipeline::builder()
//!     .embedding_provider(finrag::provider_from_config(&config.embedding)?)
//!     .persistence(PersistenceStore::new(&config.index_dir))
//!     .config(config)
//!     .build()?;
//!
//! if !pipeline.load().await.is_restored() {
//!     pipeline.ingest(&documents).await?;
//! }
//! let context = pipeline.answer_context("what is a Roth IRA?", 5).await?;
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::RagConfig;
use crate::context::ContextAssembler;
use crate::document::{Chunk, Document, RerankedResult};
use crate::embedding::{EmbeddingProvider, embed_batch_with_fallback};
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::persistence::{LoadOutcome, PersistenceStore};
use crate::reranker::{DiversityReranker, Reranker};
use crate::retriever::Retriever;

/// Counts from one [`RagPipeline::ingest`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Documents received.
    pub documents: usize,
    /// Chunks produced by the chunker.
    pub chunks: usize,
    /// Chunks embedded and added to the index.
    pub embedded: usize,
    /// Chunks dropped after their single-item retry failed.
    pub dropped: usize,
}

/// The RAG pipeline orchestrator.
///
/// Construct one via [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    index: Arc<VectorIndex>,
    chunker: Arc<dyn Chunker>,
    store: Option<PersistenceStore>,
    retriever: Retriever,
    assembler: ContextAssembler,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return the shared index.
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Return the persistence store, if one is configured.
    pub fn store(&self) -> Option<&PersistenceStore> {
        self.store.as_ref()
    }

    /// Chunk, embed and index `documents`.
    ///
    /// Chunks are embedded in batches of the provider's
    /// [`batch_size`](EmbeddingProvider::batch_size). A failed batch is
    /// retried item by item; chunks that still fail are dropped and counted.
    /// Each batch's surviving chunks are added to the index in one atomic
    /// append. When a store is configured and anything was added, the index
    /// is saved afterwards.
    ///
    /// # Errors
    ///
    /// Returns index errors (such as [`RagError::DimensionMismatch`]) and
    /// persistence errors. Embedding failures are absorbed into the report.
    pub async fn ingest(&self, documents: &[Document]) -> Result<IngestReport> {
        let mut report = IngestReport { documents: documents.len(), ..IngestReport::default() };

        let mut chunks: Vec<Chunk> = Vec::new();
        for document in documents {
            let document_chunks = self.chunker.chunk(document);
            info!(
                document.id = %document.id,
                chunk_count = document_chunks.len(),
                "chunked document"
            );
            chunks.extend(document_chunks);
        }
        report.chunks = chunks.len();

        let batch_size = self.embedding_provider.batch_size().max(1);
        for (batch_number, batch) in chunks.chunks(batch_size).enumerate() {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let outcome = embed_batch_with_fallback(self.embedding_provider.as_ref(), &texts).await;
            report.dropped += outcome.failed.len();

            if outcome.embedded.is_empty() {
                warn!(
                    batch = batch_number,
                    batch_size = batch.len(),
                    "every chunk in batch was dropped"
                );
                continue;
            }

            let mut vectors = Vec::with_capacity(outcome.embedded.len());
            let mut batch_texts = Vec::with_capacity(outcome.embedded.len());
            let mut metadata = Vec::with_capacity(outcome.embedded.len());
            for (i, vector) in outcome.embedded {
                vectors.push(vector);
                batch_texts.push(batch[i].text.clone());
                metadata.push(batch[i].metadata.clone());
            }

            let added = vectors.len();
            self.index.add(vectors, batch_texts, metadata).await.map_err(|e| {
                error!(batch = batch_number, error = %e, "index append failed during ingestion");
                e
            })?;
            report.embedded += added;
        }

        info!(
            documents = report.documents,
            chunks = report.chunks,
            embedded = report.embedded,
            dropped = report.dropped,
            "ingestion completed"
        );

        if report.embedded > 0 && self.store.is_some() {
            self.save().await?;
        }
        Ok(report)
    }

    /// Save the index under the configured name.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] when no store is configured, or the
    /// store's [`RagError::PersistenceError`].
    pub async fn save(&self) -> Result<()> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| RagError::ConfigError("no persistence store configured".to_string()))?;
        store.save(&self.index, &self.config.index_name).await.map_err(|e| {
            error!(index = %self.config.index_name, error = %e, "failed to save index");
            e
        })
    }

    /// Replace the index contents with the artifacts saved under the
    /// configured name.
    ///
    /// Without a store this reports [`LoadOutcome::Missing`] and leaves the
    /// index untouched.
    pub async fn load(&self) -> LoadOutcome {
        match &self.store {
            Some(store) => store.load(&self.index, &self.config.index_name).await,
            None => LoadOutcome::Missing,
        }
    }

    /// Retrieve up to `k` results for `query`. See [`Retriever::retrieve`].
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        enhance: bool,
    ) -> Result<Vec<RerankedResult>> {
        self.retriever.retrieve(query, k, enhance).await
    }

    /// Retrieve up to `k` results from one category. See
    /// [`Retriever::retrieve_by_category`].
    pub async fn retrieve_by_category(
        &self,
        query: &str,
        category: &str,
        k: usize,
    ) -> Result<Vec<RerankedResult>> {
        self.retriever.retrieve_by_category(query, category, k).await
    }

    /// Format `results` as an attributed context block for `query`.
    pub fn build_context(&self, query: &str, results: &[RerankedResult]) -> String {
        self.assembler.build_context(query, results)
    }

    /// Retrieve with the configured enhancement setting and format the results.
    pub async fn answer_context(&self, query: &str, k: usize) -> Result<String> {
        let results = self.retrieve(query, k, self.config.enhance_query).await?;
        Ok(self.build_context(query, &results))
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// Only the embedding provider is required. The config defaults to
/// [`RagConfig::default`], the chunker to a [`RecursiveChunker`] sized from the
/// config, the index to a fresh [`VectorIndex`], and the reranker to a
/// [`DiversityReranker`] with the configured weights.
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    index: Option<Arc<VectorIndex>>,
    chunker: Option<Arc<dyn Chunker>>,
    reranker: Option<Arc<dyn Reranker>>,
    store: Option<PersistenceStore>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Share an existing index.
    pub fn index(mut self, index: Arc<VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Set the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the reranker.
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Enable persistence through `store`.
    pub fn persistence(mut self, store: PersistenceStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the [`RagPipeline`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the embedding provider is missing
    /// or the config fails validation.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let index = self.index.unwrap_or_default();
        let chunker: Arc<dyn Chunker> = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(RecursiveChunker::new(config.chunk_size, config.chunk_overlap)?),
        };
        let reranker: Arc<dyn Reranker> = self
            .reranker
            .unwrap_or_else(|| Arc::new(DiversityReranker::new(config.rerank)));

        let retriever = Retriever::new(embedding_provider.clone(), index.clone())
            .with_reranker(reranker)
            .with_oversample_factor(config.oversample_factor)?;
        let assembler = ContextAssembler::new(config.context.clone());

        Ok(RagPipeline {
            config,
            embedding_provider,
            index,
            chunker,
            store: self.store,
            retriever,
            assembler,
        })
    }
}
