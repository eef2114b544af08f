//! Capability traits for stores and pluggable collaborators
//!
//! The core consumes `EmbeddingProvider`, `DocumentParser`, `RerankModel`,
//! and `Clock` as pluggable interfaces; it exposes the three store traits
//! for backends to implement. All traits are object-safe and `Send + Sync`
//! so components compose through `Arc<dyn Trait>`.

pub mod clock;
pub mod embedding;
pub mod episodic;
pub mod parser;
pub mod reranker;
pub mod semantic;
pub mod working;

pub use clock::{Clock, FixedClock, SystemClock};
pub use embedding::EmbeddingProvider;
pub use episodic::{event_matches, validate_event, EpisodicStore};
pub use parser::{DocumentParser, ParsedDocument};
pub use reranker::RerankModel;
pub use semantic::{ScoredRecord, SearchFilters, SemanticMemoryStore, StoreStats, KNOWLEDGE_BASE_TAG};
pub use working::WorkingMemoryStore;
