//! Error types for the `finrag` crate.

use thiserror::Error;

/// Errors that can occur in retrieval operations.
///
/// Only structural problems are represented here. Data-availability conditions
/// (an empty index, no category matches, missing or corrupted persisted
/// artifacts) are absorbed into empty results or a
/// [`LoadOutcome`](crate::persistence::LoadOutcome).
#[derive(Debug, Error)]
pub enum RagError {
    /// An embedding request failed permanently.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An embedding backend was temporarily unavailable (network error, rate
    /// limit, server error). Retried by [`RetryPolicy`](crate::retry::RetryPolicy).
    #[error("Embedding backend unavailable ({provider}): {message}")]
    EmbeddingUnavailable {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A vector did not match the dimensionality fixed by the index.
    #[error("Dimension mismatch: index holds {expected}-dimensional vectors, got {actual}")]
    DimensionMismatch {
        /// The dimensionality fixed by the first vector ever added.
        expected: usize,
        /// The offending vector's length.
        actual: usize,
    },

    /// The parallel inputs to an index mutation had different lengths.
    #[error("Length mismatch: {vectors} vectors, {texts} texts, {metadata} metadata entries")]
    LengthMismatch {
        /// Number of vectors supplied.
        vectors: usize,
        /// Number of chunk texts supplied.
        texts: usize,
        /// Number of metadata entries supplied.
        metadata: usize,
    },

    /// A vector could not be normalized (zero norm, empty, or non-finite values).
    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    /// Writing persisted index artifacts failed.
    #[error("Persistence error ({artifact}): {message}")]
    PersistenceError {
        /// The artifact path being written.
        artifact: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The knowledge base directory could not be read.
    #[error("Knowledge base error: {0}")]
    KnowledgeBaseError(String),
}

impl RagError {
    /// Whether retrying the failed operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RagError::EmbeddingUnavailable { .. })
    }
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;
