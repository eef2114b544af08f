//! # Memory & Retrieval Core Types
//!
//! Foundation crate for the mnemo memory system. Defines the domain types
//! shared by every store and pipeline:
//!
//! - **`MemoryRecord`**: content-addressed semantic fact with embedding
//! - **`AuditEvent`**: append-only episodic event keyed by thread
//! - **`RmtBuffer`**: per-thread working-memory slots
//!
//! plus the capability traits the rest of the workspace implements or
//! consumes (`SemanticMemoryStore`, `EpisodicStore`, `WorkingMemoryStore`,
//! `EmbeddingProvider`, `DocumentParser`, `RerankModel`, `Clock`) and the
//! shared error taxonomy.
//!
//! Stores are eventually consistent relative to each other; nothing in this
//! crate assumes cross-store transactions.

pub mod error;
pub mod similarity;
pub mod traits;
pub mod types;

pub use error::{MemoryError, Result};
pub use similarity::cosine_similarity;
pub use traits::{
    Clock, DocumentParser, EmbeddingProvider, EpisodicStore, FixedClock, ParsedDocument,
    RerankModel, SemanticMemoryStore, SystemClock, WorkingMemoryStore,
};
pub use types::{AuditEvent, EventQuery, MemoryRecord, MemoryType, RmtBuffer};
