//! # Store backends for the mnemo memory system
//!
//! Two families of backends implement the `mnemo-core` store traits:
//!
//! - **`postgres`**: the canonical path. One connection pool per process,
//!   pgvector cosine search for semantic memory, plain relational storage
//!   for episodic events and RMT buffers, forward-only embedded migrations.
//! - **`memory`**: in-process implementations for tests and development.
//!   The in-memory semantic store runs the real embed-and-cosine vector
//!   path so retrieval properties hold under a deterministic embedder.
//!
//! Transient database failures (connection resets, deadlocks, serialization
//! conflicts) are retried with jittered exponential backoff; everything
//! else surfaces to the caller.

pub mod memory;
pub mod postgres;
pub mod retry;

pub use memory::{InMemoryEpisodicStore, InMemorySemanticStore, InMemoryWorkingMemory};
pub use postgres::{
    PostgresBackend, PostgresConfig, PostgresEpisodicStore, PostgresSemanticStore,
    PostgresWorkingMemory,
};
pub use retry::with_retry;
