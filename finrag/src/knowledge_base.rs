//! Loading scraped articles from a knowledge-base directory.
//!
//! Each article is one JSON file. Files are read in file-name order so the
//! generated document ids (`article_1`, `article_2`, ...) are stable across
//! runs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::document::{CATEGORY_KEY, DEFAULT_CATEGORY, Document, SOURCE_KEY};
use crate::error::{RagError, Result};

/// One scraped article.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Article {
    /// Headline.
    pub title: String,
    /// Body text.
    pub content: String,
    /// Publishing site.
    pub source: String,
    /// Topic category such as `retirement` or `taxes`.
    pub category: String,
    /// Canonical URL.
    pub url: String,
    /// Byline.
    pub author: String,
    /// When the article was scraped.
    pub scraped_at: String,
    /// Word count recorded by the scraper.
    pub word_count: Option<usize>,
}

impl Article {
    /// The recorded word count, or the whitespace word count of the content.
    pub fn words(&self) -> usize {
        self.word_count.unwrap_or_else(|| self.content.split_whitespace().count())
    }
}

/// Read every `*.json` file directly inside `dir` as an [`Article`].
///
/// Files that cannot be read or parsed are logged and skipped.
///
/// # Errors
///
/// Returns [`RagError::KnowledgeBaseError`] if `dir` does not exist or is not
/// a directory.
pub fn load_articles(dir: impl AsRef<Path>) -> Result<Vec<Article>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(RagError::KnowledgeBaseError(format!(
            "'{}' is not a directory",
            dir.display()
        )));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "json"))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();

    let mut articles = Vec::with_capacity(files.len());
    for path in &files {
        match read_article(path) {
            Ok(article) => {
                debug!(path = %path.display(), title = %article.title, "loaded article");
                articles.push(article);
            }
            Err(reason) => warn!(path = %path.display(), error = %reason, "skipping article file"),
        }
    }

    info!(
        dir = %dir.display(),
        files = files.len(),
        articles = articles.len(),
        "loaded knowledge base"
    );
    Ok(articles)
}

fn read_article(path: &Path) -> std::result::Result<Article, String> {
    let raw = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&raw).map_err(|e| e.to_string())
}

/// Turn articles into ingestible [`Document`]s.
///
/// Document `n` (1-based, counting every article) gets id `article_{n}` and
/// text `"Title: {title}\n\nContent: {content}"`. Articles with empty content
/// are skipped.
pub fn articles_to_documents(articles: &[Article]) -> Vec<Document> {
    let mut documents = Vec::with_capacity(articles.len());
    for (i, article) in articles.iter().enumerate() {
        let n = i + 1;
        let title =
            if article.title.is_empty() { format!("Article {n}") } else { article.title.clone() };
        if article.content.trim().is_empty() {
            warn!(title = %title, "skipping article with empty content");
            continue;
        }

        let category =
            if article.category.is_empty() { DEFAULT_CATEGORY } else { article.category.as_str() };
        let source = if article.source.is_empty() { "Unknown" } else { article.source.as_str() };
        let author = if article.author.is_empty() { "Unknown" } else { article.author.as_str() };

        let text = format!("Title: {title}\n\nContent: {}", article.content);
        let document = Document::new(format!("article_{n}"), text)
            .with_metadata("title", title)
            .with_metadata(SOURCE_KEY, source)
            .with_metadata(CATEGORY_KEY, category)
            .with_metadata("url", article.url.as_str())
            .with_metadata("author", author)
            .with_metadata("scraped_at", article.scraped_at.as_str())
            .with_metadata("word_count", article.words().to_string());
        documents.push(document);
    }
    documents
}

/// Summary counts over a set of articles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeBaseStats {
    /// Number of articles counted.
    pub total_articles: usize,
    /// Sum of [`Article::words`] over every article.
    pub total_words: usize,
    /// Integer mean, zero for an empty set.
    pub avg_words_per_article: usize,
    /// Articles per category; an empty category counts as `unknown`.
    pub categories: BTreeMap<String, usize>,
    /// Articles per source; an empty source counts as `unknown`.
    pub sources: BTreeMap<String, usize>,
}

impl KnowledgeBaseStats {
    /// Compute statistics for `articles`.
    pub fn from_articles(articles: &[Article]) -> Self {
        let mut stats = Self { total_articles: articles.len(), ..Self::default() };
        for article in articles {
            stats.total_words += article.words();
            *stats.categories.entry(label(&article.category)).or_default() += 1;
            *stats.sources.entry(label(&article.source)).or_default() += 1;
        }
        if stats.total_articles > 0 {
            stats.avg_words_per_article = stats.total_words / stats.total_articles;
        }
        stats
    }
}

fn label(value: &str) -> String {
    if value.is_empty() { "unknown".to_string() } else { value.to_string() }
}
