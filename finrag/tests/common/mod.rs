//! Shared test fixtures: deterministic embedders and document builders.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use finrag::document::Document;
use finrag::embedding::EmbeddingProvider;
use finrag::error::{RagError, Result};

pub const HASH_DIM: usize = 256;

/// Embeds text as a bag of hashed character trigrams.
///
/// Identical texts get identical vectors and texts sharing few trigrams are
/// nearly orthogonal, which is enough to exercise ranking without a model.
#[derive(Debug, Default)]
pub struct HashingEmbedder {
    pub calls: AtomicUsize,
    pub batch_size: Option<usize>,
}

impl HashingEmbedder {
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self { calls: AtomicUsize::new(0), batch_size: Some(batch_size) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn hash_embed(text: &str) -> Vec<f32> {
    let padded: Vec<char> = format!(" {} ", text.to_lowercase()).chars().collect();
    let mut vector = vec![0.0f32; HASH_DIM];
    for window in padded.windows(3) {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for c in window {
            hash ^= *c as u64;
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        vector[(hash % HASH_DIM as u64) as usize] += 1.0;
    }
    if vector.iter().all(|v| *v == 0.0) {
        vector[0] = 1.0;
    }
    vector
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| hash_embed(t)).collect())
    }

    fn name(&self) -> &str {
        "hashing"
    }

    fn batch_size(&self) -> usize {
        self.batch_size.unwrap_or(finrag::embedding::DEFAULT_BATCH_SIZE)
    }
}

/// Rejects every multi-item call and any text containing `poison`.
#[derive(Debug)]
pub struct FlakyEmbedder {
    pub poison: String,
    pub batch_size: usize,
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.len() > 1 {
            return Err(RagError::EmbeddingUnavailable {
                provider: "flaky".into(),
                message: "batch endpoint overloaded".into(),
            });
        }
        if texts.iter().any(|t| t.contains(self.poison.as_str())) {
            return Err(RagError::EmbeddingError {
                provider: "flaky".into(),
                message: "input rejected".into(),
            });
        }
        Ok(texts.iter().map(|t| hash_embed(t)).collect())
    }

    fn name(&self) -> &str {
        "flaky"
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }
}

/// Returns vectors of a fixed dimensionality regardless of input.
#[derive(Debug)]
pub struct FixedDimEmbedder(pub usize);

#[async_trait]
impl EmbeddingProvider for FixedDimEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0; self.0]).collect())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

pub fn doc(id: &str, text: &str, source: &str, category: &str) -> Document {
    Document::new(id, text).with_metadata("source", source).with_metadata("category", category)
}

/// Exactly `len` chars of `vocab` words joined by single spaces, cycling.
pub fn prose(vocab: &[&str], len: usize) -> String {
    let mut text = String::new();
    for word in vocab.iter().cycle() {
        if text.len() >= len {
            break;
        }
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(word);
    }
    text.truncate(len);
    text
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
