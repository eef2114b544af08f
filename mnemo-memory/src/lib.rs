//! # Memory hierarchy for the mnemo system
//!
//! Composes the semantic, episodic, and working-memory stores into the
//! facade agents talk to:
//!
//! - [`MemoryManager`]: write/reflect/retrieve/consolidate over the three
//!   stores, plus RMT buffer access and health checks
//! - [`MemoryHierarchy`]: the single context-loading primitive
//!   (`load_context`) used by orchestrators
//! - [`consolidation`]: dedup, decay, and merge over semantic memory, with
//!   an optional background daemon
//! - [`reflection`]: the event → memory-record policy (heuristic default,
//!   pluggable)
//! - [`RmtTtlSweeper`]: background TTL purge for working memory
//!
//! Stores are eventually consistent relative to each other; nothing here
//! offers cross-store linearizability.

pub mod consolidation;
pub mod hierarchy;
pub mod manager;
pub mod reflection;
pub mod sweeper;

pub use consolidation::{
    ConsolidationConfig, ConsolidationDaemon, ConsolidationEngine, ConsolidationOutcome,
};
pub use hierarchy::{render_context, MemoryContext, MemoryHierarchy};
pub use manager::{HealthStatus, MemoryManager};
pub use reflection::{compress_event, HeuristicReflection, ReflectionPolicy};
pub use sweeper::RmtTtlSweeper;
