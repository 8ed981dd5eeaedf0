//! On-disk persistence for a [`VectorIndex`].
//!
//! An index named `kb` is stored as three artifacts in one directory:
//!
//! | file | contents |
//! |------|----------|
//! | `kb.vectors.bin` | bincode `{ dimension, count, data }`, row-major unit vectors |
//! | `kb.texts.json` | JSON array of chunk texts |
//! | `kb.metadata.json` | JSON array of [`ChunkMetadata`] |
//!
//! Each artifact is written to a temporary sibling and renamed into place, so
//! no single file is ever half-written. The three renames are not one
//! transaction: a crash between them leaves artifacts from different saves,
//! which [`PersistenceStore::load`] detects through the alignment check and
//! treats as corruption.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::document::ChunkMetadata;
use crate::error::{RagError, Result};
use crate::index::{IndexSnapshot, VectorIndex};

/// What [`PersistenceStore::load`] found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// All artifacts were read and the index now holds `chunks` entries.
    Restored {
        /// Number of restored entries.
        chunks: usize,
    },
    /// At least one artifact does not exist; the index was reset to empty.
    Missing,
    /// An artifact could not be decoded or the artifacts disagree; the index
    /// was reset to empty.
    Corrupted {
        /// What was wrong.
        reason: String,
    },
}

impl LoadOutcome {
    /// Whether the index was restored from disk.
    pub fn is_restored(&self) -> bool {
        matches!(self, LoadOutcome::Restored { .. })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct VectorArtifact {
    dimension: usize,
    count: usize,
    data: Vec<f32>,
}

/// Saves and loads index artifacts under a directory.
#[derive(Debug, Clone)]
pub struct PersistenceStore {
    dir: PathBuf,
}

impl PersistenceStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the vector artifact for `name`.
    pub fn vectors_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.vectors.bin"))
    }

    /// Path of the chunk-text artifact for `name`.
    pub fn texts_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.texts.json"))
    }

    /// Path of the metadata artifact for `name`.
    pub fn metadata_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.metadata.json"))
    }

    /// Whether all three artifacts for `name` exist.
    pub async fn exists(&self, name: &str) -> bool {
        for path in [self.vectors_path(name), self.texts_path(name), self.metadata_path(name)] {
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return false;
            }
        }
        true
    }

    /// Write the current contents of `index` under `name`.
    ///
    /// On success the index is marked persisted.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PersistenceError`] if the directory cannot be
    /// created or an artifact cannot be encoded or written.
    pub async fn save(&self, index: &VectorIndex, name: &str) -> Result<()> {
        let (snapshot, generation) = index.versioned_snapshot().await;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| RagError::PersistenceError {
            artifact: self.dir.display().to_string(),
            message: format!("failed to create directory: {e}"),
        })?;

        let vectors_path = self.vectors_path(name);
        let artifact = VectorArtifact {
            dimension: snapshot.dimension.unwrap_or(0),
            count: snapshot.len(),
            data: snapshot.vectors,
        };
        let vectors = bincode::serialize(&artifact).map_err(|e| encode_error(&vectors_path, e))?;
        write_atomic(&vectors_path, &vectors).await?;

        let texts_path = self.texts_path(name);
        let texts = serde_json::to_vec(&snapshot.texts).map_err(|e| encode_error(&texts_path, e))?;
        write_atomic(&texts_path, &texts).await?;

        let metadata_path = self.metadata_path(name);
        let metadata =
            serde_json::to_vec(&snapshot.metadata).map_err(|e| encode_error(&metadata_path, e))?;
        write_atomic(&metadata_path, &metadata).await?;

        index.mark_persisted(generation).await;
        info!(index = name, chunks = artifact.count, dir = %self.dir.display(), "saved index");
        Ok(())
    }

    /// Replace the contents of `index` with the artifacts saved under `name`.
    ///
    /// Never fails: a missing, undecodable or misaligned artifact set resets
    /// the index to empty, logs a warning, and is reported in the outcome.
    pub async fn load(&self, index: &VectorIndex, name: &str) -> LoadOutcome {
        if !self.exists(name).await {
            index.clear().await;
            warn!(
                index = name,
                dir = %self.dir.display(),
                "index artifacts missing, starting empty"
            );
            return LoadOutcome::Missing;
        }

        let restored = match self.read_snapshot(name).await {
            Ok(snapshot) => {
                let chunks = snapshot.len();
                index.replace(snapshot).await.map(|generation| (chunks, generation))
            }
            Err(e) => Err(e),
        };

        match restored {
            Ok((chunks, generation)) => {
                index.mark_persisted(generation).await;
                info!(index = name, chunks, "loaded index");
                LoadOutcome::Restored { chunks }
            }
            Err(e) => {
                index.clear().await;
                warn!(index = name, error = %e, "index artifacts corrupted, starting empty");
                LoadOutcome::Corrupted { reason: e.to_string() }
            }
        }
    }

    /// Delete the artifacts saved under `name`. Missing files are ignored.
    pub async fn remove(&self, name: &str) -> Result<()> {
        for path in [self.vectors_path(name), self.texts_path(name), self.metadata_path(name)] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(RagError::PersistenceError {
                        artifact: path.display().to_string(),
                        message: format!("failed to remove: {e}"),
                    });
                }
            }
        }
        Ok(())
    }

    async fn read_snapshot(&self, name: &str) -> Result<IndexSnapshot> {
        let vectors_path = self.vectors_path(name);
        let bytes = read(&vectors_path).await?;
        let artifact: VectorArtifact =
            bincode::deserialize(&bytes).map_err(|e| decode_error(&vectors_path, e))?;

        let texts_path = self.texts_path(name);
        let texts: Vec<String> = serde_json::from_slice(&read(&texts_path).await?)
            .map_err(|e| decode_error(&texts_path, e))?;

        let metadata_path = self.metadata_path(name);
        let metadata: Vec<ChunkMetadata> = serde_json::from_slice(&read(&metadata_path).await?)
            .map_err(|e| decode_error(&metadata_path, e))?;

        if artifact.count != texts.len()
            || texts.len() != metadata.len()
            || artifact.dimension.checked_mul(artifact.count) != Some(artifact.data.len())
        {
            return Err(RagError::LengthMismatch {
                vectors: artifact.count,
                texts: texts.len(),
                metadata: metadata.len(),
            });
        }

        Ok(IndexSnapshot {
            dimension: (artifact.count > 0).then_some(artifact.dimension),
            vectors: artifact.data,
            texts,
            metadata,
        })
    }
}

async fn read(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| RagError::PersistenceError {
        artifact: path.display().to_string(),
        message: format!("failed to read: {e}"),
    })
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let to_error = |e: std::io::Error| RagError::PersistenceError {
        artifact: path.display().to_string(),
        message: format!("failed to write: {e}"),
    };
    tokio::fs::write(&tmp, bytes).await.map_err(to_error)?;
    tokio::fs::rename(&tmp, path).await.map_err(to_error)
}

fn encode_error(path: &Path, e: impl std::fmt::Display) -> RagError {
    RagError::PersistenceError {
        artifact: path.display().to_string(),
        message: format!("failed to encode: {e}"),
    }
}

fn decode_error(path: &Path, e: impl std::fmt::Display) -> RagError {
    RagError::PersistenceError {
        artifact: path.display().to_string(),
        message: format!("failed to decode: {e}"),
    }
}
