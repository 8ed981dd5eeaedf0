//! Data types for documents, chunks, and retrieval results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Metadata key holding a document's source name.
pub const SOURCE_KEY: &str = "source";
/// Metadata key holding a document's category.
pub const CATEGORY_KEY: &str = "category";

/// Metadata keys owned by the typed fields of [`ChunkMetadata`].
pub const RESERVED_CHUNK_KEYS: [&str; 5] =
    [SOURCE_KEY, CATEGORY_KEY, "chunk_id", "document_id", "chunk_index"];

/// Source name used when a document carries none.
pub const UNKNOWN_SOURCE: &str = "unknown";
/// Category used when a document carries none.
pub const DEFAULT_CATEGORY: &str = "general";

/// A source document containing text content and metadata.
///
/// Metadata typically carries `source`, `category`, `url`, `scraped_at` and
/// `author`, but any key is accepted and inherited by the document's chunks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The text content of the document.
    pub text: String,
    /// Key-value metadata associated with the document.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Document {
    /// Create a document with empty metadata.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), metadata: HashMap::new() }
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The document's source name, or `"unknown"`.
    pub fn source(&self) -> &str {
        self.metadata.get(SOURCE_KEY).map(String::as_str).unwrap_or(UNKNOWN_SOURCE)
    }

    /// The document's category, or `"general"`.
    pub fn category(&self) -> &str {
        self.metadata.get(CATEGORY_KEY).map(String::as_str).unwrap_or(DEFAULT_CATEGORY)
    }
}

/// Metadata stored alongside every indexed chunk.
///
/// The well-known fields are typed; every other key inherited from the parent
/// [`Document`] (url, author, scraped_at, tags, ...) lands in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    /// Source name of the parent document.
    pub source: String,
    /// Category of the parent document.
    pub category: String,
    /// Synthesized `"{source}_{index}"` identifier.
    pub chunk_id: String,
    /// ID of the parent document.
    pub document_id: String,
    /// Position of the chunk within its document.
    pub chunk_index: usize,
    /// Remaining inherited document metadata. Never holds a key from
    /// [`RESERVED_CHUNK_KEYS`].
    #[serde(flatten)]
    pub extra: HashMap<String, String>,
}

/// A segment of a [`Document`], the unit of indexing and retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// The text content of the chunk.
    pub text: String,
    /// Inherited metadata plus chunk-specific fields.
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Build the chunk at `index` of `document`.
    pub fn from_document(document: &Document, index: usize, text: String) -> Self {
        let source = document.source().to_string();
        let mut extra = HashMap::with_capacity(document.metadata.len());
        for (key, value) in &document.metadata {
            if !RESERVED_CHUNK_KEYS.contains(&key.as_str()) {
                extra.insert(key.clone(), value.clone());
            } else if key != SOURCE_KEY && key != CATEGORY_KEY && index == 0 {
                warn!(
                    document.id = %document.id,
                    key = %key,
                    "dropping metadata key owned by the chunk"
                );
            }
        }

        Self {
            text,
            metadata: ChunkMetadata {
                chunk_id: format!("{source}_{index}"),
                source,
                category: document.category().to_string(),
                document_id: document.id.clone(),
                chunk_index: index,
                extra,
            },
        }
    }

    /// The synthesized chunk identifier.
    pub fn id(&self) -> &str {
        &self.metadata.chunk_id
    }
}

/// A chunk returned by a similarity search, paired with its raw score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    /// The chunk text.
    pub content: String,
    /// Cosine similarity between the query and the chunk (higher is more relevant).
    pub score: f32,
    /// The chunk's stored metadata.
    pub metadata: ChunkMetadata,
    /// Source name, duplicated from `metadata.source` for attribution.
    pub source: String,
}

/// A [`RetrievalResult`] with the composite score computed by a reranker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RerankedResult {
    /// The underlying search result; its `score` stays the raw similarity.
    #[serde(flatten)]
    pub result: RetrievalResult,
    /// The composite score used for final ordering.
    pub rerank_score: f32,
}

impl RerankedResult {
    /// The chunk text.
    pub fn content(&self) -> &str {
        &self.result.content
    }

    /// The source name.
    pub fn source(&self) -> &str {
        &self.result.source
    }

    /// The raw similarity score.
    pub fn score(&self) -> f32 {
        self.result.score
    }

    /// The chunk metadata.
    pub fn metadata(&self) -> &ChunkMetadata {
        &self.result.metadata
    }
}
