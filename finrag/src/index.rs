//! Exact nearest-neighbour vector index.
//!
//! [`VectorIndex`] keeps three parallel containers (vectors, chunk texts,
//! chunk metadata) behind a `tokio::sync::RwLock`. Vectors are L2-normalized on
//! insertion, so the inner product used by [`search`](VectorIndex::search) is
//! cosine similarity. Search is a brute-force scan, O(n·d) per query, intended
//! for corpora up to roughly 10^5 chunks.
//!
//! Mutations validate their whole input before touching the containers and run
//! under the write lock, so a reader never sees a partially applied `add`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::{ChunkMetadata, RetrievalResult};
use crate::error::{RagError, Result};

/// Lifecycle of a [`VectorIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexState {
    /// No vectors and no fixed dimensionality.
    Uninitialized,
    /// Holds vectors that have not been saved since the last change.
    Populated,
    /// Contents match the last successful save.
    Persisted,
}

/// A point-in-time copy of an index's contents.
///
/// `vectors` is row-major: entry `i` occupies `vectors[i * d..(i + 1) * d]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexSnapshot {
    /// Dimensionality, `None` while the index is empty.
    pub dimension: Option<usize>,
    /// Flattened unit vectors.
    pub vectors: Vec<f32>,
    /// Chunk texts, parallel to the vectors.
    pub texts: Vec<String>,
    /// Chunk metadata, parallel to the vectors.
    pub metadata: Vec<ChunkMetadata>,
}

impl IndexSnapshot {
    /// Number of entries.
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    /// Whether the snapshot holds no entries.
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Iterate the vectors one row at a time.
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.vectors.chunks_exact(self.dimension.unwrap_or(1).max(1))
    }
}

/// Counts describing the indexed corpus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of indexed chunks.
    pub chunks: usize,
    /// Vector dimensionality, if fixed.
    pub dimension: Option<usize>,
    /// Chunks per category.
    pub categories: BTreeMap<String, usize>,
    /// Chunks per source.
    pub sources: BTreeMap<String, usize>,
}

#[derive(Debug)]
struct IndexInner {
    snapshot: IndexSnapshot,
    persisted: bool,
    // Bumped by every mutation.
    generation: u64,
}

/// An exact cosine-similarity index over unit vectors.
///
/// # Example
///
/// ```rust,ignore
/// use finrag::VectorIndex;
///
/// let index = VectorIndex::new();
/// index.add(vectors, texts, metadata).await?;
/// let hits = index.search(&query_vector, 5).await?;
/// ```
#[derive(Debug)]
pub struct VectorIndex {
    inner: RwLock<IndexInner>,
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorIndex {
    /// Create an empty, uninitialized index.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(IndexInner {
                snapshot: IndexSnapshot::default(),
                persisted: false,
                generation: 0,
            }),
        }
    }

    /// Append entries to the index.
    ///
    /// Every vector is normalized to unit length. Either all entries are
    /// appended or, on error, none are. The first vector ever added fixes the
    /// index's dimensionality. Returns the number of entries after the append.
    ///
    /// # Errors
    ///
    /// - [`RagError::LengthMismatch`] if the three inputs differ in length.
    /// - [`RagError::DimensionMismatch`] if any vector's length differs from the
    ///   index dimensionality (or from the first vector of the batch).
    /// - [`RagError::InvalidVector`] for empty, zero-norm or non-finite vectors.
    pub async fn add(
        &self,
        vectors: Vec<Vec<f32>>,
        texts: Vec<String>,
        metadata: Vec<ChunkMetadata>,
    ) -> Result<usize> {
        if vectors.len() != texts.len() || texts.len() != metadata.len() {
            return Err(RagError::LengthMismatch {
                vectors: vectors.len(),
                texts: texts.len(),
                metadata: metadata.len(),
            });
        }

        let mut inner = self.inner.write().await;
        if vectors.is_empty() {
            return Ok(inner.snapshot.len());
        }

        let dimension = inner.snapshot.dimension.unwrap_or(vectors[0].len());
        let mut staged = Vec::with_capacity(vectors.len() * dimension);
        for mut vector in vectors {
            if vector.len() != dimension {
                return Err(RagError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            l2_normalize(&mut vector)?;
            staged.extend_from_slice(&vector);
        }

        let added = texts.len();
        let snapshot = &mut inner.snapshot;
        snapshot.dimension = Some(dimension);
        snapshot.vectors.extend(staged);
        snapshot.texts.extend(texts);
        snapshot.metadata.extend(metadata);
        inner.persisted = false;
        inner.generation += 1;

        let total = inner.snapshot.len();
        debug!(added, total, dimension, "added vectors to index");
        Ok(total)
    }

    /// Return the `k` entries most similar to `query`, best first.
    ///
    /// Scores are cosine similarities. Equal scores keep insertion order. An
    /// empty index yields an empty result regardless of the query.
    ///
    /// # Errors
    ///
    /// - [`RagError::DimensionMismatch`] if the query length differs from the
    ///   index dimensionality.
    /// - [`RagError::InvalidVector`] if the query has zero norm or non-finite values.
    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievalResult>> {
        let inner = self.inner.read().await;
        let snapshot = &inner.snapshot;
        let Some(dimension) = snapshot.dimension else {
            return Ok(Vec::new());
        };
        if snapshot.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != dimension {
            return Err(RagError::DimensionMismatch { expected: dimension, actual: query.len() });
        }

        let mut query = query.to_vec();
        l2_normalize(&mut query)?;

        let mut scored: Vec<(usize, f32)> =
            snapshot.rows().map(|row| dot(row, &query)).enumerate().collect();

        let by_rank = |a: &(usize, f32), b: &(usize, f32)| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0));
        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, by_rank);
            scored.truncate(k);
        }
        scored.sort_by(by_rank);

        Ok(scored
            .into_iter()
            .map(|(i, score)| {
                let metadata = snapshot.metadata[i].clone();
                RetrievalResult {
                    content: snapshot.texts[i].clone(),
                    score,
                    source: metadata.source.clone(),
                    metadata,
                }
            })
            .collect())
    }

    /// Number of indexed entries.
    pub async fn len(&self) -> usize {
        self.inner.read().await.snapshot.len()
    }

    /// Whether the index holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.snapshot.is_empty()
    }

    /// The fixed dimensionality, `None` while uninitialized.
    pub async fn dimension(&self) -> Option<usize> {
        self.inner.read().await.snapshot.dimension
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> IndexState {
        let inner = self.inner.read().await;
        if inner.snapshot.dimension.is_none() {
            IndexState::Uninitialized
        } else if inner.persisted {
            IndexState::Persisted
        } else {
            IndexState::Populated
        }
    }

    /// Chunk counts per category and per source.
    pub async fn stats(&self) -> IndexStats {
        let inner = self.inner.read().await;
        let mut stats = IndexStats {
            chunks: inner.snapshot.len(),
            dimension: inner.snapshot.dimension,
            ..IndexStats::default()
        };
        for metadata in &inner.snapshot.metadata {
            *stats.categories.entry(metadata.category.clone()).or_default() += 1;
            *stats.sources.entry(metadata.source.clone()).or_default() += 1;
        }
        stats
    }

    /// Copy out the current contents.
    pub async fn snapshot(&self) -> IndexSnapshot {
        self.inner.read().await.snapshot.clone()
    }

    pub(crate) async fn versioned_snapshot(&self) -> (IndexSnapshot, u64) {
        let inner = self.inner.read().await;
        (inner.snapshot.clone(), inner.generation)
    }

    /// Drop every entry and forget the dimensionality.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.snapshot = IndexSnapshot::default();
        inner.persisted = false;
        inner.generation += 1;
    }

    /// Swap in `snapshot` as the whole index contents.
    ///
    /// The snapshot is validated (alignment, dimensionality, finite non-zero
    /// vectors) and re-normalized before the swap. On error the index is left
    /// untouched. Returns the new mutation generation.
    pub async fn replace(&self, mut snapshot: IndexSnapshot) -> Result<u64> {
        validate_snapshot(&mut snapshot)?;
        let mut inner = self.inner.write().await;
        inner.snapshot = snapshot;
        inner.persisted = false;
        inner.generation += 1;
        Ok(inner.generation)
    }

    /// Mark the contents as saved, unless they changed since `generation`.
    pub(crate) async fn mark_persisted(&self, generation: u64) {
        let mut inner = self.inner.write().await;
        if inner.generation == generation && inner.snapshot.dimension.is_some() {
            inner.persisted = true;
        }
    }
}

fn validate_snapshot(snapshot: &mut IndexSnapshot) -> Result<()> {
    let count = snapshot.texts.len();
    if snapshot.metadata.len() != count {
        return Err(RagError::LengthMismatch {
            vectors: snapshot.vectors.len(),
            texts: count,
            metadata: snapshot.metadata.len(),
        });
    }

    let Some(dimension) = snapshot.dimension else {
        if count == 0 && snapshot.vectors.is_empty() {
            return Ok(());
        }
        return Err(RagError::InvalidVector("entries present without a dimension".to_string()));
    };
    if count == 0 {
        // An empty index has no fixed dimensionality.
        snapshot.dimension = None;
        return if snapshot.vectors.is_empty() {
            Ok(())
        } else {
            Err(RagError::InvalidVector("vector data without entries".to_string()))
        };
    }
    if dimension == 0 || snapshot.vectors.len() != dimension * count {
        return Err(RagError::LengthMismatch {
            vectors: snapshot.vectors.len() / dimension.max(1),
            texts: count,
            metadata: snapshot.metadata.len(),
        });
    }

    for row in snapshot.vectors.chunks_exact_mut(dimension) {
        l2_normalize(row)?;
    }
    Ok(())
}

/// Scale `vector` to unit Euclidean length in place.
///
/// # Errors
///
/// Returns [`RagError::InvalidVector`] if the vector is empty, contains
/// non-finite values, or has zero norm.
pub fn l2_normalize(vector: &mut [f32]) -> Result<()> {
    if vector.is_empty() {
        return Err(RagError::InvalidVector("empty vector".to_string()));
    }
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(RagError::InvalidVector("vector contains non-finite values".to_string()));
    }
    let norm = vector.iter().map(|&x| f64::from(x) * f64::from(x)).sum::<f64>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return Err(RagError::InvalidVector("vector has zero norm".to_string()));
    }
    for x in vector.iter_mut() {
        *x = (f64::from(*x) / norm) as f32;
    }
    Ok(())
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
