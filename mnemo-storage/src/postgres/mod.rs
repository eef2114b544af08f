//! PostgreSQL backends
//!
//! One `PostgresBackend` (and thus one pool) per process; the three store
//! types borrow it through `Arc`. All statements are parameterized:
//! vectors travel as bound `pgvector::Vector` parameters, never as SQL
//! text.

pub mod backend;
pub mod episodic;
pub mod semantic;
pub mod working;

pub use backend::{PostgresBackend, PostgresConfig};
pub use episodic::PostgresEpisodicStore;
pub use semantic::PostgresSemanticStore;
pub use working::PostgresWorkingMemory;

use mnemo_core::MemoryError;

/// Map a driver error onto the store taxonomy
///
/// Connection-class SQLSTATEs (08xxx), serialization failures (40001),
/// deadlocks (40P01), and plain network errors (no database error payload)
/// are transient; everything else is not.
pub(crate) fn map_pg_error(context: &str, err: &tokio_postgres::Error) -> MemoryError {
    let transient = match err.code() {
        Some(state) => {
            let code = state.code();
            code.starts_with("08") || code == "40001" || code == "40P01"
        }
        // No SQLSTATE: the connection died or the socket failed.
        None => true,
    };

    let message = format!("{context}: {err}");
    if transient {
        MemoryError::store_transient(message)
    } else {
        MemoryError::store(message)
    }
}
