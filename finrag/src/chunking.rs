//! Document chunking.
//!
//! This module provides the [`Chunker`] trait and [`RecursiveChunker`], which
//! splits text at the highest-priority separator that keeps a chunk within the
//! size limit (paragraphs, then lines, then sentences, then words, then raw
//! characters) and carries a fixed number of characters of overlap from the
//! tail of each chunk into the head of the next.
//!
//! Every chunk is a contiguous substring of the input. Sizes and offsets are
//! counted in `char`s, so multi-byte text is never split inside a code point.

use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// Separators tried in priority order. The empty string means "cut anywhere".
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "? ", "! ", " ", ""];

/// A strategy for splitting documents into chunks.
///
/// Implementations produce [`Chunk`]s with text and metadata. Embeddings are
/// computed later by the pipeline.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has empty text.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// One chunk of a text, located by `char` offsets into the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    /// Offset of the first char of the chunk.
    pub start: usize,
    /// Offset one past the last char of the chunk.
    pub end: usize,
    /// The chunk text, equal to the input's `start..end` char range.
    pub text: String,
}

/// Splits text recursively by separator priority with character overlap.
///
/// Chunk IDs are generated as `{source}_{chunk_index}`. Each chunk inherits
/// the parent document's metadata.
///
/// # Example
///
/// ```rust,ignore
/// use finrag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(500, 50)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker` with [`DEFAULT_SEPARATORS`].
    ///
    /// # Arguments
    ///
    /// * `chunk_size` - maximum number of characters per chunk
    /// * `chunk_overlap` - number of characters repeated between consecutive chunks
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `chunk_size == 0` or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate_sizes(chunk_size, chunk_overlap)?;
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Replace the separator list. Order is priority order.
    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    /// Maximum number of characters per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of characters shared by consecutive chunks.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split raw text into located chunks.
    pub fn split_spans(&self, text: &str) -> Vec<ChunkSpan> {
        let separators: Vec<&str> = self.separators.iter().map(String::as_str).collect();
        spans(text, self.chunk_size, self.chunk_overlap, &separators)
    }

    /// Split raw text into chunk strings.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_spans(text).into_iter().map(|span| span.text).collect()
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        self.split_text(&document.text)
            .into_iter()
            .enumerate()
            .map(|(i, text)| Chunk::from_document(document, i, text))
            .collect()
    }
}

/// Split `text` into chunks of at most `chunk_size` chars with `overlap` chars
/// carried between neighbours, preferring earlier entries of `separators` as
/// cut points.
///
/// # Errors
///
/// Returns [`RagError::ConfigError`] if `chunk_size == 0` or `overlap >= chunk_size`.
pub fn split_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    separators: &[&str],
) -> Result<Vec<String>> {
    validate_sizes(chunk_size, overlap)?;
    Ok(spans(text, chunk_size, overlap, separators).into_iter().map(|span| span.text).collect())
}

fn validate_sizes(chunk_size: usize, overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
    }
    if overlap >= chunk_size {
        return Err(RagError::ConfigError(format!(
            "chunk_overlap ({overlap}) must be less than chunk_size ({chunk_size})"
        )));
    }
    Ok(())
}

fn spans(text: &str, chunk_size: usize, overlap: usize, separators: &[&str]) -> Vec<ChunkSpan> {
    if text.is_empty() {
        return Vec::new();
    }

    // Byte offset of every char boundary, including the end of the text.
    let offsets: Vec<usize> =
        text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
    let total = offsets.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0;
    let mut covered = 0;

    loop {
        let limit = start + chunk_size;
        let end = if limit >= total {
            total
        } else {
            split_point(text, &offsets, covered, limit, separators)
        };

        chunks.push(ChunkSpan { start, end, text: text[offsets[start]..offsets[end]].to_string() });

        if end == total {
            break;
        }
        // S > O guarantees the next window reaches past `end`.
        start = end.saturating_sub(overlap).max(start);
        covered = end;
    }

    chunks
}

/// Pick the cut point in the char range `(lower, upper]`: just after the last
/// occurrence of the first separator that occurs in that range, or `upper`.
fn split_point(
    text: &str,
    offsets: &[usize],
    lower: usize,
    upper: usize,
    separators: &[&str],
) -> usize {
    let base = offsets[lower];
    let window = &text[base..offsets[upper]];

    for separator in separators {
        if separator.is_empty() {
            return upper;
        }
        if let Some(pos) = window.rfind(separator) {
            let cut = base + pos + separator.len();
            return offsets.partition_point(|&offset| offset < cut);
        }
    }

    upper
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstruct(spans: &[ChunkSpan]) -> String {
        let mut out = String::new();
        let mut covered = 0;
        for span in spans {
            let skip = covered - span.start;
            out.extend(span.text.chars().skip(skip));
            covered = span.end;
        }
        out
    }

    fn expected_count(len: usize, size: usize, overlap: usize) -> usize {
        if len <= size { 1 } else { (len - overlap).div_ceil(size - overlap) }
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunker = RecursiveChunker::new(500, 50).unwrap();
        let chunks = chunker.split_text("A short note about bonds.");
        assert_eq!(chunks, vec!["A short note about bonds.".to_string()]);
    }

    #[test]
    fn empty_text_has_no_chunks() {
        let chunker = RecursiveChunker::new(500, 50).unwrap();
        assert!(chunker.split_text("").is_empty());
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        assert!(RecursiveChunker::new(100, 100).is_err());
        assert!(RecursiveChunker::new(0, 0).is_err());
        assert!(split_text("abc", 10, 20, DEFAULT_SEPARATORS).is_err());
    }

    #[test]
    fn raw_character_count_matches_formula_at_boundaries() {
        let (size, overlap) = (500, 50);
        for len in [1, 499, 500, 501, 949, 950, 951, 1200, 1400, 1401] {
            let text = "x".repeat(len);
            let spans = spans(&text, size, overlap, DEFAULT_SEPARATORS);
            assert_eq!(spans.len(), expected_count(len, size, overlap), "len {len}");
            assert_eq!(reconstruct(&spans), text, "len {len}");
        }
    }

    #[test]
    fn overlap_is_carried_from_previous_tail() {
        let text = "x".repeat(1200);
        let spans = spans(&text, 500, 50, DEFAULT_SEPARATORS);
        assert_eq!((spans[0].start, spans[0].end), (0, 500));
        assert_eq!((spans[1].start, spans[1].end), (450, 950));
        assert_eq!((spans[2].start, spans[2].end), (900, 1200));
    }

    #[test]
    fn prefers_paragraph_breaks_over_sentences() {
        let text = format!("{}\n\n{}. {}", "a".repeat(30), "b".repeat(20), "c".repeat(30));
        let chunks = split_text(&text, 60, 0, DEFAULT_SEPARATORS).unwrap();
        assert_eq!(chunks[0], format!("{}\n\n", "a".repeat(30)));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn falls_back_to_words_then_characters() {
        let text = "alpha beta gamma delta";
        let chunks = split_text(text, 12, 0, DEFAULT_SEPARATORS).unwrap();
        assert_eq!(chunks, vec!["alpha beta ", "gamma delta"]);

        let chunks = split_text("abcdefgh", 3, 0, DEFAULT_SEPARATORS).unwrap();
        assert_eq!(chunks, vec!["abc", "def", "gh"]);
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let text = "€".repeat(25);
        let chunks = split_text(&text, 10, 2, DEFAULT_SEPARATORS).unwrap();
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.len(), expected_count(25, 10, 2));
    }

    #[test]
    fn chunk_ids_use_source_and_index() {
        let document = Document::new("article_1", "x".repeat(1200))
            .with_metadata("source", "Investopedia")
            .with_metadata("category", "investing");
        let chunker = RecursiveChunker::new(500, 50).unwrap();
        let chunks = chunker.chunk(&document);
        let ids: Vec<&str> = chunks.iter().map(Chunk::id).collect();
        assert_eq!(ids, vec!["Investopedia_0", "Investopedia_1", "Investopedia_2"]);
        assert!(chunks.iter().all(|c| c.metadata.document_id == "article_1"));
    }

    #[test]
    fn is_deterministic() {
        let text = "Stocks rise. Bonds fall.\nPortfolios rebalance.\n\nRisk matters. ".repeat(40);
        let chunker = RecursiveChunker::new(120, 20).unwrap();
        assert_eq!(chunker.split_spans(&text), chunker.split_spans(&text));
        assert_eq!(reconstruct(&chunker.split_spans(&text)), text);
    }
}
