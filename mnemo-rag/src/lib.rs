//! # Hybrid RAG pipeline for the mnemo memory system
//!
//! Everything between raw documents and ranked context:
//!
//! - **Ingestion**: parse → chunk → domain-tag → embed → store
//! - **Sparse retrieval**: in-memory Okapi BM25 index
//! - **Dense retrieval**: any [`mnemo_core::SemanticMemoryStore`]
//! - **Fusion**: reciprocal rank fusion over parallel retriever fan-out
//! - **Reranking**: cross-encoder scoring of `(query, document)` pairs
//!
//! CPU-bound pieces (tokenization, BM25 scoring, chunking, fusion) are
//! synchronous and bounded by input size; anything touching the network or
//! the store is async.

pub mod bm25;
pub mod chunking;
pub mod embeddings;
pub mod fusion;
pub mod parser;
pub mod pipeline;
pub mod reranker;
pub mod tagging;

pub use bm25::{default_tokenizer, Bm25Index, Bm25Stats};
pub use chunking::{create_chunker, ChunkStrategy, Chunker, ChunkerConfig, DocumentChunk};
pub use embeddings::{DeterministicEmbedder, EmbeddingClientConfig, HttpEmbeddingClient};
pub use fusion::{
    DenseRetriever, HybridRetriever, RankedResult, ReciprocalRankFusion, SemanticStoreAdapter,
    SparseRetriever,
};
pub use parser::{detect_format, CompositeParser, DocumentFormat};
pub use pipeline::{IngestOptions, IngestionConfig, IngestionResult, IngestionService};
pub use reranker::{
    CrossEncoderReranker, HttpRerankModel, HybridRetrieverWithReranking, RerankCandidate,
};
pub use tagging::DomainTagger;
