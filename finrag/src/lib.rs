//! # finrag
//!
//! Semantic retrieval over a financial knowledge corpus.
//!
//! ## Overview
//!
//! Documents are split into overlapping chunks, embedded, and stored in an
//! exact cosine-similarity [`VectorIndex`] that can be saved to and restored
//! from disk. Queries are optionally expanded with related financial terms,
//! matched against an oversampled candidate pool, reranked for source
//! diversity, and formatted into an attributed context block for a downstream
//! answer generator.
//!
//! - [`RecursiveChunker`] - separator-aware chunking with overlap
//! - [`EmbeddingProvider`] - pluggable embedding backends
//! - [`VectorIndex`] - brute-force inner-product search over unit vectors
//! - [`PersistenceStore`] - three aligned on-disk artifacts per index
//! - [`Retriever`] - enhance, search, filter, rerank
//! - [`ContextAssembler`] - prompt context with source attribution
//! - [`RagPipeline`] - all of the above behind one builder
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use finrag::{PersistenceStore, RagConfig, RagPipeline, provider_from_config};
//!
//! let config = RagConfig::from_json_file("finrag.json")?;
//! let pipeline = RagPipeline::builder()
//!     .embedding_provider(provider_from_config(&config.embedding)?)
//!     .persistence(PersistenceStore::new(&config.index_dir))
//!     .config(config)
//!     .build()?;
//!
//! let articles = finrag::knowledge_base::load_articles("data/articles")?;
//! pipeline.ingest(&finrag::knowledge_base::articles_to_documents(&articles)).await?;
//! println!("{}", pipeline.answer_context("How does a Roth IRA work?", 5).await?);
//! ```
//!
//! ## Features
//!
//! | Feature | Provider |
//! |---------|----------|
//! | `local` | [`local::LocalEmbeddingProvider`], in-process ONNX models via `fastembed` |
//! | `openai` | [`openai::OpenAIEmbeddingProvider`], any OpenAI-compatible embeddings API |
//! | `full` | both |

pub mod chunking;
pub mod config;
pub mod context;
pub mod document;
pub mod embedding;
pub mod enhancer;
pub mod error;
pub mod index;
pub mod knowledge_base;
#[cfg(feature = "local")]
pub mod local;
#[cfg(feature = "openai")]
pub mod openai;
pub mod persistence;
pub mod pipeline;
pub mod reranker;
pub mod retriever;
pub mod retry;

pub use chunking::{Chunker, RecursiveChunker};
pub use config::{EmbeddingConfig, RagConfig, RagConfigBuilder};
pub use context::{ContextAssembler, ContextConfig, NO_RELEVANT_CONTEXT};
pub use document::{Chunk, ChunkMetadata, Document, RerankedResult, RetrievalResult};
pub use embedding::{
    BatchOutcome, EmbeddingProvider, embed_batch_with_fallback, provider_from_config,
};
pub use enhancer::{KeywordGroup, QueryEnhancer};
pub use error::{RagError, Result};
pub use index::{IndexSnapshot, IndexState, IndexStats, VectorIndex};
pub use knowledge_base::{Article, KnowledgeBaseStats};
#[cfg(feature = "local")]
pub use local::LocalEmbeddingProvider;
#[cfg(feature = "openai")]
pub use openai::OpenAIEmbeddingProvider;
pub use persistence::{LoadOutcome, PersistenceStore};
pub use pipeline::{IngestReport, RagPipeline, RagPipelineBuilder};
pub use reranker::{DiversityReranker, NoOpReranker, RerankWeights, Reranker};
pub use retriever::Retriever;
pub use retry::RetryPolicy;
