//! Okapi BM25 sparse retriever
//!
//! In-memory keyword index over a document corpus. Scores are raw BM25
//! values (not normalized); downstream fusion is rank-based, so only the
//! ordering matters.
//!
//! Concurrency: a single `RwLock` guards the index. Writers (`update`)
//! hold it exclusively; queries issued during a rebuild wait on the lock
//! rather than reading a stale snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// Term-frequency saturation parameter
const K1: f32 = 1.5;
/// Length-normalization parameter
const B: f32 = 0.75;

/// Tokenizer function type
pub type Tokenizer = Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>;

/// Default tokenizer: lowercase + whitespace split
#[must_use]
pub fn default_tokenizer(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(String::from)
        .collect()
}

/// Index statistics
#[derive(Debug, Clone, PartialEq)]
pub struct Bm25Stats {
    /// Indexed document count
    pub document_count: usize,
    /// Mean tokens per document
    pub avg_doc_length: f32,
    /// Total tokens across the corpus
    pub total_tokens: usize,
}

struct Inner {
    documents: Vec<String>,
    doc_tokens: Vec<Vec<String>>,
    doc_frequency: HashMap<String, usize>,
    avg_doc_len: f32,
}

impl Inner {
    fn rebuild(documents: Vec<String>, tokenizer: &Tokenizer) -> Self {
        let doc_tokens: Vec<Vec<String>> = documents.iter().map(|d| tokenizer(d)).collect();

        let mut doc_frequency: HashMap<String, usize> = HashMap::new();
        for tokens in &doc_tokens {
            let mut seen: Vec<&String> = Vec::new();
            for token in tokens {
                if !seen.contains(&token) {
                    seen.push(token);
                    *doc_frequency.entry(token.clone()).or_default() += 1;
                }
            }
        }

        let total: usize = doc_tokens.iter().map(Vec::len).sum();
        #[allow(clippy::cast_precision_loss)]
        let avg_doc_len = if doc_tokens.is_empty() {
            0.0
        } else {
            total as f32 / doc_tokens.len() as f32
        };

        Self {
            documents,
            doc_tokens,
            doc_frequency,
            avg_doc_len,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn score(&self, query_tokens: &[String], doc_index: usize) -> f32 {
        let tokens = &self.doc_tokens[doc_index];
        if tokens.is_empty() {
            return 0.0;
        }

        let doc_len = tokens.len() as f32;
        let corpus_size = self.documents.len() as f32;
        let mut score = 0.0;

        for term in query_tokens {
            let term_frequency = tokens.iter().filter(|t| *t == term).count() as f32;
            if term_frequency == 0.0 {
                continue;
            }
            let doc_frequency = *self.doc_frequency.get(term).unwrap_or(&0) as f32;
            // Lucene-style smoothed IDF, always positive.
            let idf = ((corpus_size - doc_frequency + 0.5) / (doc_frequency + 0.5) + 1.0).ln();
            let norm = K1 * (1.0 - B + B * doc_len / self.avg_doc_len);
            score += idf * (term_frequency * (K1 + 1.0)) / (term_frequency + norm);
        }

        score
    }
}

/// In-memory BM25 index
pub struct Bm25Index {
    inner: RwLock<Inner>,
    tokenizer: Tokenizer,
}

impl Bm25Index {
    /// Build an index with the default tokenizer
    #[must_use]
    pub fn build(documents: Vec<String>) -> Self {
        Self::build_with_tokenizer(documents, Arc::new(default_tokenizer))
    }

    /// Build an index with a custom tokenizer
    #[must_use]
    pub fn build_with_tokenizer(documents: Vec<String>, tokenizer: Tokenizer) -> Self {
        let inner = Inner::rebuild(documents, &tokenizer);
        Self {
            inner: RwLock::new(inner),
            tokenizer,
        }
    }

    /// Top `top_k` documents by BM25 score, descending
    ///
    /// Documents with zero score are omitted; a query sharing no terms with
    /// the corpus returns an empty list.
    #[must_use]
    pub fn search(&self, query: &str, top_k: usize) -> Vec<(String, f32)> {
        let query_tokens = (self.tokenizer)(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let inner = self.inner.read();
        let mut scored: Vec<(usize, f32)> = (0..inner.documents.len())
            .map(|i| (i, inner.score(&query_tokens, i)))
            .filter(|(_, s)| *s > 0.0)
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored
            .into_iter()
            .take(top_k)
            .map(|(i, s)| (inner.documents[i].clone(), s))
            .collect()
    }

    /// Append documents and rebuild
    ///
    /// Rebuild is O(corpus); acceptable because updates happen offline
    /// relative to query traffic.
    pub fn update(&self, new_docs: Vec<String>) {
        let mut inner = self.inner.write();
        let mut documents = std::mem::take(&mut inner.documents);
        documents.extend(new_docs);
        *inner = Inner::rebuild(documents, &self.tokenizer);
    }

    /// Corpus statistics
    #[must_use]
    pub fn stats(&self) -> Bm25Stats {
        let inner = self.inner.read();
        Bm25Stats {
            document_count: inner.documents.len(),
            avg_doc_length: inner.avg_doc_len,
            total_tokens: inner.doc_tokens.iter().map(Vec::len).sum(),
        }
    }
}
