//! Document chunking strategies
//!
//! Four strategies over parsed text: fixed-size windows, semantic
//! paragraph accumulation, recursive separator splitting, and a contextual
//! wrapper that widens chunk content with neighboring sentences. Chunking
//! is synchronous CPU work bounded by the input size.

use std::collections::BTreeMap;

use regex::Regex;
use serde_json::Value;

/// Default target chunk size, characters
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between adjacent chunks, characters
pub const DEFAULT_OVERLAP: usize = 200;
/// Default minimum chunk size guard against tiny fragments
pub const DEFAULT_MIN_CHUNK_SIZE: usize = 100;
/// Default count of context sentences on each side
pub const DEFAULT_CONTEXT_SENTENCES: usize = 3;

/// Chunking strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStrategy {
    /// Fixed character windows with overlap
    FixedSize,
    /// Greedy paragraph accumulation at double-newline boundaries
    Semantic,
    /// Ordered separator hierarchy with greedy recombination
    Recursive,
    /// Any base strategy, widened with surrounding sentences
    Contextual,
}

/// Tuning knobs shared across strategies
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between chunks (fixed-size and recursive)
    pub overlap: usize,
    /// Minimum chunk size (semantic)
    pub min_chunk_size: usize,
    /// Separator hierarchy (recursive), highest priority first
    pub separators: Vec<String>,
    /// Sentences of context on each side (contextual)
    pub context_sentences: usize,
    /// Base strategy wrapped by the contextual chunker
    pub base_strategy: Option<ChunkStrategy>,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
            min_chunk_size: DEFAULT_MIN_CHUNK_SIZE,
            separators: vec![
                "\n\n".to_string(),
                "\n".to_string(),
                ". ".to_string(),
                " ".to_string(),
            ],
            context_sentences: DEFAULT_CONTEXT_SENTENCES,
            base_strategy: None,
        }
    }
}

/// A contiguous sub-range of a parsed document
///
/// `start_pos`/`end_pos` are byte offsets into the source text. Chunks are
/// transient: the ingestion pipeline converts them into memory records.
#[derive(Debug, Clone)]
pub struct DocumentChunk {
    /// Chunk text
    pub content: String,
    /// `{doc_id}_chunk_{index}`
    pub chunk_id: String,
    /// Start offset in the source document
    pub start_pos: usize,
    /// End offset in the source document
    pub end_pos: usize,
    /// Inherited metadata plus `chunk_index`
    pub metadata: BTreeMap<String, Value>,
}

/// Splits text into chunks
pub trait Chunker: Send + Sync {
    /// Chunk `text`, deriving ids from `doc_id` and copying `base_metadata`
    /// into every chunk
    fn chunk_text(
        &self,
        text: &str,
        doc_id: &str,
        base_metadata: &BTreeMap<String, Value>,
    ) -> Vec<DocumentChunk>;

    /// Strategy name for logging
    fn name(&self) -> &'static str;
}

/// Build a chunker for `strategy`
///
/// The contextual strategy wraps `config.base_strategy` (semantic when
/// unset).
#[must_use]
pub fn create_chunker(strategy: ChunkStrategy, config: &ChunkerConfig) -> Box<dyn Chunker> {
    match strategy {
        ChunkStrategy::FixedSize => Box::new(FixedSizeChunker {
            chunk_size: config.chunk_size,
            overlap: config.overlap,
        }),
        ChunkStrategy::Semantic => Box::new(SemanticChunker {
            chunk_size: config.chunk_size,
            min_chunk_size: config.min_chunk_size,
        }),
        ChunkStrategy::Recursive => Box::new(RecursiveChunker {
            chunk_size: config.chunk_size,
            overlap: config.overlap,
            separators: config.separators.clone(),
        }),
        ChunkStrategy::Contextual => {
            let base = config.base_strategy.unwrap_or(ChunkStrategy::Semantic);
            Box::new(ContextualChunker {
                base: create_chunker(base, config),
                context_sentences: config.context_sentences,
            })
        }
    }
}

fn make_chunk(
    content: &str,
    doc_id: &str,
    index: usize,
    start_pos: usize,
    end_pos: usize,
    base_metadata: &BTreeMap<String, Value>,
) -> DocumentChunk {
    let mut metadata = base_metadata.clone();
    metadata.insert("chunk_index".to_string(), Value::from(index));
    DocumentChunk {
        content: content.to_string(),
        chunk_id: format!("{doc_id}_chunk_{index}"),
        start_pos,
        end_pos,
        metadata,
    }
}

/// Largest char boundary at or below `pos`
fn floor_char_boundary(text: &str, mut pos: usize) -> usize {
    if pos >= text.len() {
        return text.len();
    }
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Smallest char boundary at or above `pos`
fn ceil_char_boundary(text: &str, mut pos: usize) -> usize {
    while pos < text.len() && !text.is_char_boundary(pos) {
        pos += 1;
    }
    pos.min(text.len())
}

// ---------------------------------------------------------------------------
// Fixed-size
// ---------------------------------------------------------------------------

/// Fixed character windows with overlap
///
/// Simple and predictable; may split sentences and paragraphs.
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    overlap: usize,
}

impl FixedSizeChunker {
    /// Create a chunker with explicit sizing
    #[must_use]
    pub const fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
        }
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk_text(
        &self,
        text: &str,
        doc_id: &str,
        base_metadata: &BTreeMap<String, Value>,
    ) -> Vec<DocumentChunk> {
        let mut chunks = Vec::new();
        if text.is_empty() || self.chunk_size == 0 {
            return chunks;
        }

        let mut start = 0;
        let mut index = 0;
        while start < text.len() {
            let mut end = floor_char_boundary(text, start + self.chunk_size);
            if end <= start {
                // A single char wider than the window still makes progress.
                end = ceil_char_boundary(text, start + 1);
            }
            chunks.push(make_chunk(
                &text[start..end],
                doc_id,
                index,
                start,
                end,
                base_metadata,
            ));
            index += 1;

            if end >= text.len() {
                break;
            }
            let next = floor_char_boundary(text, end.saturating_sub(self.overlap));
            // Overlap must never stall the walk.
            start = if next > start { next } else { end };
        }

        chunks
    }

    fn name(&self) -> &'static str {
        "fixed_size"
    }
}

// ---------------------------------------------------------------------------
// Semantic
// ---------------------------------------------------------------------------

/// Greedy paragraph accumulation at double-newline boundaries
///
/// A chunk closes once adding the next paragraph would exceed `chunk_size`
/// and the accumulated text has reached `min_chunk_size`.
#[derive(Debug, Clone)]
pub struct SemanticChunker {
    chunk_size: usize,
    min_chunk_size: usize,
}

impl SemanticChunker {
    /// Create a chunker with explicit sizing
    #[must_use]
    pub const fn new(chunk_size: usize, min_chunk_size: usize) -> Self {
        Self {
            chunk_size,
            min_chunk_size,
        }
    }

    fn split_paragraphs(text: &str) -> Vec<(usize, String)> {
        let separator = Regex::new(r"\n\s*\n").expect("static regex");
        let mut paragraphs = Vec::new();
        let mut last = 0;

        for found in separator.find_iter(text) {
            let segment = &text[last..found.start()];
            if !segment.trim().is_empty() {
                paragraphs.push((last, format!("{segment}\n\n")));
            }
            last = found.end();
        }
        let tail = &text[last..];
        if !tail.trim().is_empty() {
            paragraphs.push((last, tail.to_string()));
        }
        paragraphs
    }
}

impl Chunker for SemanticChunker {
    fn chunk_text(
        &self,
        text: &str,
        doc_id: &str,
        base_metadata: &BTreeMap<String, Value>,
    ) -> Vec<DocumentChunk> {
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_start = 0;
        let mut index = 0;

        for (para_start, para_text) in Self::split_paragraphs(text) {
            let would_overflow = !current.is_empty()
                && current.len() + para_text.len() > self.chunk_size
                && current.len() >= self.min_chunk_size;

            if would_overflow {
                chunks.push(make_chunk(
                    current.trim(),
                    doc_id,
                    index,
                    current_start,
                    current_start + current.len(),
                    base_metadata,
                ));
                index += 1;
                current = para_text;
                current_start = para_start;
            } else {
                if current.is_empty() {
                    current_start = para_start;
                }
                current.push_str(&para_text);
            }
        }

        if !current.trim().is_empty() {
            chunks.push(make_chunk(
                current.trim(),
                doc_id,
                index,
                current_start,
                current_start + current.len(),
                base_metadata,
            ));
        }

        chunks
    }

    fn name(&self) -> &'static str {
        "semantic"
    }
}

// ---------------------------------------------------------------------------
// Recursive
// ---------------------------------------------------------------------------

/// Ordered separator splitting with greedy recombination
///
/// For each separator level, splits the text; oversized fragments recurse
/// into the next level. Fragments then recombine greedily up to
/// `chunk_size` with the configured overlap carried between chunks.
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    overlap: usize,
    separators: Vec<String>,
}

impl RecursiveChunker {
    /// Create a chunker with explicit sizing and separators
    #[must_use]
    pub fn new(chunk_size: usize, overlap: usize, separators: Vec<String>) -> Self {
        Self {
            chunk_size,
            overlap,
            separators,
        }
    }

    fn recursive_split(&self, text: &str, separators: &[String]) -> Vec<String> {
        let Some((separator, remaining)) = separators.split_first() else {
            return if text.is_empty() {
                Vec::new()
            } else {
                vec![text.to_string()]
            };
        };

        let mut result = Vec::new();
        for split in text.split(separator.as_str()) {
            if split.len() > self.chunk_size && !remaining.is_empty() {
                result.extend(self.recursive_split(split, remaining));
            } else if !split.is_empty() {
                result.push(format!("{split}{separator}"));
            }
        }
        result
    }
}

impl Chunker for RecursiveChunker {
    fn chunk_text(
        &self,
        text: &str,
        doc_id: &str,
        base_metadata: &BTreeMap<String, Value>,
    ) -> Vec<DocumentChunk> {
        let splits = self.recursive_split(text, &self.separators);

        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_start = 0;
        let mut index = 0;
        let mut text_pos: usize = 0;

        for split in splits {
            if !current.is_empty() && current.len() + split.len() > self.chunk_size {
                chunks.push(make_chunk(
                    current.trim(),
                    doc_id,
                    index,
                    current_start,
                    current_start + current.len(),
                    base_metadata,
                ));
                index += 1;

                let overlap_start = floor_char_boundary(
                    &current,
                    current.len().saturating_sub(self.overlap),
                );
                let overlap_text = current[overlap_start..].to_string();
                current_start = text_pos.saturating_sub(overlap_text.len());
                current = overlap_text;
                current.push_str(&split);
            } else {
                if current.is_empty() {
                    current_start = text_pos;
                }
                current.push_str(&split);
            }
            text_pos += split.len();
        }

        if !current.trim().is_empty() {
            chunks.push(make_chunk(
                current.trim(),
                doc_id,
                index,
                current_start,
                current_start + current.len(),
                base_metadata,
            ));
        }

        chunks
    }

    fn name(&self) -> &'static str {
        "recursive"
    }
}

// ---------------------------------------------------------------------------
// Contextual
// ---------------------------------------------------------------------------

/// Widens base chunks with neighboring sentences
///
/// Content expands to `context_sentences` sentences before and after the
/// base chunk within the source text; `chunk_id`, `start_pos`, and
/// `end_pos` stay those of the base chunk.
pub struct ContextualChunker {
    base: Box<dyn Chunker>,
    context_sentences: usize,
}

impl ContextualChunker {
    /// Wrap `base` with `context_sentences` of context per side
    #[must_use]
    pub fn new(base: Box<dyn Chunker>, context_sentences: usize) -> Self {
        Self {
            base,
            context_sentences,
        }
    }

    /// Sentence boundaries: `[.!?]+\s+` plus the trailing sentence
    fn extract_sentences(text: &str) -> Vec<(usize, String)> {
        let boundary = Regex::new(r"[.!?]+\s+").expect("static regex");
        let mut sentences = Vec::new();
        let mut current = 0;

        for found in boundary.find_iter(text) {
            let sentence = text[current..found.end()].trim();
            if !sentence.is_empty() {
                sentences.push((current, sentence.to_string()));
            }
            current = found.end();
        }
        if current < text.len() {
            let tail = text[current..].trim();
            if !tail.is_empty() {
                sentences.push((current, tail.to_string()));
            }
        }
        sentences
    }

    fn sentence_index(sentences: &[(usize, String)], position: usize) -> usize {
        for (idx, (start, sentence)) in sentences.iter().enumerate() {
            if (*start..start + sentence.len() + 1).contains(&position) {
                return idx;
            }
        }
        sentences.len().saturating_sub(1)
    }
}

impl Chunker for ContextualChunker {
    fn chunk_text(
        &self,
        text: &str,
        doc_id: &str,
        base_metadata: &BTreeMap<String, Value>,
    ) -> Vec<DocumentChunk> {
        let base_chunks = self.base.chunk_text(text, doc_id, base_metadata);
        let sentences = Self::extract_sentences(text);
        if sentences.is_empty() {
            return base_chunks;
        }

        base_chunks
            .into_iter()
            .map(|chunk| {
                let first = Self::sentence_index(&sentences, chunk.start_pos);
                let last = Self::sentence_index(&sentences, chunk.end_pos.saturating_sub(1));

                let context_start = first.saturating_sub(self.context_sentences);
                let context_end = (last + self.context_sentences + 1).min(sentences.len());

                let content = sentences[context_start..context_end]
                    .iter()
                    .map(|(_, s)| s.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");

                let mut metadata = chunk.metadata.clone();
                metadata.insert("has_context".to_string(), Value::Bool(true));
                metadata.insert(
                    "context_sentences_before".to_string(),
                    Value::from(first - context_start),
                );
                metadata.insert(
                    "context_sentences_after".to_string(),
                    Value::from(context_end - last - 1),
                );

                DocumentChunk {
                    content,
                    chunk_id: chunk.chunk_id,
                    start_pos: chunk.start_pos,
                    end_pos: chunk.end_pos,
                    metadata,
                }
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "contextual"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_metadata() -> BTreeMap<String, Value> {
        BTreeMap::new()
    }

    #[test]
    fn fixed_size_covers_whole_text_with_overlap() {
        let chunker = FixedSizeChunker::new(100, 20);
        let text = "a".repeat(250);
        let chunks = chunker.chunk_text(&text, "doc1", &no_metadata());

        assert!(chunks.len() >= 3);
        assert_eq!(chunks[0].start_pos, 0);
        assert_eq!(chunks[0].end_pos, 100);
        // Second chunk starts inside the first (overlap).
        assert_eq!(chunks[1].start_pos, 80);
        assert_eq!(chunks.last().unwrap().end_pos, 250);
        assert_eq!(chunks[0].chunk_id, "doc1_chunk_0");
        assert_eq!(chunks[1].metadata["chunk_index"], Value::from(1));
    }

    #[test]
    fn fixed_size_handles_empty_text() {
        let chunker = FixedSizeChunker::new(100, 20);
        assert!(chunker.chunk_text("", "doc1", &no_metadata()).is_empty());
    }

    #[test]
    fn fixed_size_respects_utf8_boundaries() {
        let chunker = FixedSizeChunker::new(5, 0);
        let text = "日本語のテキストです";
        let chunks = chunker.chunk_text(text, "doc1", &no_metadata());
        let rejoined: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(rejoined, text);
    }

    #[test]
    fn semantic_respects_paragraph_boundaries() {
        let chunker = SemanticChunker::new(60, 10);
        let text = "First paragraph with some words here.\n\n\
                    Second paragraph with more words here.\n\n\
                    Third paragraph closing the document.";
        let chunks = chunker.chunk_text(text, "doc1", &no_metadata());

        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(
                !chunk.content.trim_end().contains("\n\n"),
                "no internal paragraph breaks: {:?}",
                chunk.content
            );
        }
    }

    #[test]
    fn semantic_short_text_yields_single_chunk() {
        let chunker = SemanticChunker::new(1000, 100);
        let text = "Tiny document.";
        let chunks = chunker.chunk_text(text, "doc1", &no_metadata());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Tiny document.");
    }

    #[test]
    fn semantic_start_positions_track_source() {
        let chunker = SemanticChunker::new(30, 5);
        let text = "Alpha paragraph here today.\n\nBeta paragraph here tomorrow.";
        let chunks = chunker.chunk_text(text, "doc1", &no_metadata());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].start_pos, 0);
        assert_eq!(chunks[1].start_pos, text.find("Beta").unwrap());
    }

    #[test]
    fn recursive_splits_at_best_separator() {
        let config = ChunkerConfig {
            chunk_size: 40,
            overlap: 0,
            ..ChunkerConfig::default()
        };
        let chunker = create_chunker(ChunkStrategy::Recursive, &config);
        let text = "First paragraph alpha.\n\nSecond paragraph beta.\n\nThird paragraph gamma.";
        let chunks = chunker.chunk_text(text, "doc1", &no_metadata());

        assert!(chunks.len() >= 2);
        assert!(chunks.iter().all(|c| c.content.len() <= 60));
    }

    #[test]
    fn recursive_falls_through_to_word_level() {
        let chunker = RecursiveChunker::new(
            10,
            0,
            vec!["\n\n".into(), "\n".into(), ". ".into(), " ".into()],
        );
        let text = "thisisaverylongunbrokenword and more words follow here";
        let chunks = chunker.chunk_text(text, "doc1", &no_metadata());
        assert!(!chunks.is_empty());
    }

    #[test]
    fn contextual_keeps_base_identity_and_widens_content() {
        let config = ChunkerConfig {
            chunk_size: 40,
            min_chunk_size: 10,
            context_sentences: 1,
            base_strategy: Some(ChunkStrategy::Semantic),
            ..ChunkerConfig::default()
        };
        let contextual = create_chunker(ChunkStrategy::Contextual, &config);
        let base = create_chunker(ChunkStrategy::Semantic, &config);

        let text = "One sentence here. Two sentences here. Three sentences here. \
                    Four sentences here. Five sentences here.";
        let base_chunks = base.chunk_text(text, "doc1", &no_metadata());
        let contextual_chunks = contextual.chunk_text(text, "doc1", &no_metadata());

        assert_eq!(base_chunks.len(), contextual_chunks.len());
        for (base_chunk, ctx_chunk) in base_chunks.iter().zip(&contextual_chunks) {
            assert_eq!(base_chunk.chunk_id, ctx_chunk.chunk_id);
            assert_eq!(base_chunk.start_pos, ctx_chunk.start_pos);
            assert_eq!(base_chunk.end_pos, ctx_chunk.end_pos);
            assert_eq!(ctx_chunk.metadata["has_context"], Value::Bool(true));
        }
        // Middle chunks gain surrounding sentences.
        if contextual_chunks.len() > 2 {
            let middle = &contextual_chunks[1];
            let base_middle = &base_chunks[1];
            assert!(middle.content.len() >= base_middle.content.len());
        }
    }

    #[test]
    fn sentence_extraction_keeps_trailing_sentence() {
        let sentences =
            ContextualChunker::extract_sentences("First one. Second one! Trailing fragment");
        assert_eq!(sentences.len(), 3);
        assert_eq!(sentences[2].1, "Trailing fragment");
    }
}
