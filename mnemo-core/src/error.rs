//! Error taxonomy for the memory system
//!
//! Each category maps to a distinct recovery policy: only transient store
//! and embedding failures are retried locally; everything else surfaces to
//! the caller.

use thiserror::Error;

/// Result type alias for memory operations
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Errors that can occur in the memory system
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Missing or invalid configuration (dimension mismatch, weight count
    /// mismatch, absent DSN). Never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database I/O or serialization failure. Transient variants (connection
    /// reset, deadlock, serialization conflict) are retried with backoff.
    #[error("store error: {message}")]
    Store {
        /// Human-readable failure description
        message: String,
        /// Whether a retry with backoff is worthwhile
        transient: bool,
    },

    /// Embedding provider failure: non-200 response, length or dimension
    /// mismatch. 5xx/429/network errors are transient.
    #[error("embedding error: {message}")]
    Embedding {
        /// Human-readable failure description
        message: String,
        /// Whether a retry with backoff is worthwhile
        transient: bool,
    },

    /// Requested entity does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid input: empty text on insert, empty source/action on an event
    #[error("validation error: {0}")]
    Validation(String),

    /// Caller-initiated deadline or cancellation; resources released
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// Invariant violation (e.g. stored vector length differs from the
    /// configured dimension). Operator intervention expected.
    #[error("fatal invariant violation: {0}")]
    Fatal(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MemoryError {
    /// Non-transient store failure
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            transient: false,
        }
    }

    /// Transient store failure, eligible for retry with backoff
    pub fn store_transient(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            transient: true,
        }
    }

    /// Non-transient embedding failure
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
            transient: false,
        }
    }

    /// Transient embedding failure (5xx, 429, network)
    pub fn embedding_transient(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
            transient: true,
        }
    }

    /// Whether local retry with backoff is permitted for this error
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Store { transient: true, .. } | Self::Embedding { transient: true, .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(MemoryError::store_transient("connection reset").is_transient());
        assert!(MemoryError::embedding_transient("503").is_transient());
        assert!(!MemoryError::store("syntax error").is_transient());
        assert!(!MemoryError::Config("no DSN".into()).is_transient());
        assert!(!MemoryError::Validation("empty text".into()).is_transient());
    }

    #[test]
    fn display_includes_category() {
        let err = MemoryError::Config("EMBEDDING_DIMENSION mismatch".into());
        assert!(err.to_string().contains("configuration error"));

        let err = MemoryError::embedding("response length 2 != input length 3");
        assert!(err.to_string().contains("embedding error"));
    }
}
