//! # Configuration for the mnemo memory system
//!
//! Environment-driven settings for the database pool, the embedding
//! provider, and background maintenance cadences. Startup refuses to
//! proceed when no DSN is provided or when `EMBEDDING_DIMENSION` is
//! inconsistent with the declared model.
//!
//! Recognized keys:
//!
//! | Key | Effect |
//! |-----|--------|
//! | `POSTGRES_DSN` / `DATABASE_URL` | Connection string; driver prefixes normalized |
//! | `PGSSLMODE` | TLS mode forwarded to the driver |
//! | `DB_POOL_SIZE`, `DB_POOL_TIMEOUT`, `DB_MAX_OVERFLOW`, `DB_POOL_RECYCLE` | Pool tuning |
//! | `EMBEDDINGS_URL`, `EMBEDDINGS_API_KEY` | Embedding provider endpoint + auth |
//! | `EMBEDDING_MODEL`, `EMBEDDING_DIMENSION` | Model id and declared vector dimension |
//! | `VECTOR_NAMESPACE` | Namespace scoping for multi-tenant deployments |
//! | `CONSOLIDATION_INTERVAL` | Background consolidation cadence, seconds |
//! | `RMT_TTL_SWEEP_INTERVAL` | RMT TTL sweep cadence, seconds |

use std::env;
use std::time::Duration;

use mnemo_core::{MemoryError, Result};

mod dsn;

pub use dsn::normalize_dsn;

/// Default connection pool size
pub const DEFAULT_POOL_SIZE: usize = 10;
/// Default pool checkout timeout, seconds
pub const DEFAULT_POOL_TIMEOUT_SECS: u64 = 30;
/// Default overflow connections above the pool size
pub const DEFAULT_MAX_OVERFLOW: usize = 20;
/// Default connection recycle age, seconds
pub const DEFAULT_POOL_RECYCLE_SECS: u64 = 3600;
/// Default RMT TTL sweep cadence (10 minutes)
pub const DEFAULT_RMT_SWEEP_SECS: u64 = 600;

/// PostgreSQL connection and pool settings
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    /// Normalized connection string
    pub dsn: String,
    /// TLS mode forwarded to the driver (`PGSSLMODE`)
    pub ssl_mode: Option<String>,
    /// Connection pool size
    pub pool_size: usize,
    /// Pool checkout timeout
    pub pool_timeout: Duration,
    /// Overflow connections above `pool_size`
    pub max_overflow: usize,
    /// Recycle connections older than this
    pub pool_recycle: Duration,
}

impl DatabaseSettings {
    /// Settings for a DSN with defaults for everything else
    ///
    /// # Errors
    ///
    /// `Config` when the DSN scheme is not a recognized PostgreSQL prefix.
    pub fn new(dsn: &str) -> Result<Self> {
        Ok(Self {
            dsn: normalize_dsn(dsn)?,
            ssl_mode: None,
            pool_size: DEFAULT_POOL_SIZE,
            pool_timeout: Duration::from_secs(DEFAULT_POOL_TIMEOUT_SECS),
            max_overflow: DEFAULT_MAX_OVERFLOW,
            pool_recycle: Duration::from_secs(DEFAULT_POOL_RECYCLE_SECS),
        })
    }

    /// Total connections the pool may hand out
    #[must_use]
    pub const fn max_connections(&self) -> usize {
        self.pool_size + self.max_overflow
    }
}

/// Embedding provider settings
#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    /// HTTP endpoint of the provider
    pub url: String,
    /// Bearer/apikey credential
    pub api_key: Option<String>,
    /// Model identifier sent to the provider
    pub model: String,
    /// Declared vector dimension; must match provider output
    pub dimension: usize,
}

/// Top-level configuration, explicitly constructed and passed to components
#[derive(Debug, Clone)]
pub struct MnemoConfig {
    /// Database pool settings
    pub database: DatabaseSettings,
    /// Embedding provider settings
    pub embeddings: EmbeddingSettings,
    /// Namespace applied to all semantic records
    pub namespace: String,
    /// Background consolidation cadence; `None` disables the daemon
    pub consolidation_interval: Option<Duration>,
    /// RMT TTL sweep cadence
    pub rmt_ttl_sweep_interval: Duration,
}

impl MnemoConfig {
    /// Load configuration from process environment variables
    ///
    /// # Errors
    ///
    /// `Config` when required keys are missing or validation fails.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup (testable path)
    ///
    /// # Errors
    ///
    /// `Config` when required keys are missing or validation fails.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let raw_dsn = lookup("POSTGRES_DSN")
            .or_else(|| lookup("DATABASE_URL"))
            .ok_or_else(|| {
                MemoryError::Config("neither POSTGRES_DSN nor DATABASE_URL is set".into())
            })?;

        let mut database = DatabaseSettings::new(&raw_dsn)?;
        database.ssl_mode = lookup("PGSSLMODE");
        if let Some(size) = parse_opt(&lookup, "DB_POOL_SIZE")? {
            database.pool_size = size;
        }
        if let Some(secs) = parse_opt(&lookup, "DB_POOL_TIMEOUT")? {
            database.pool_timeout = Duration::from_secs(secs);
        }
        if let Some(overflow) = parse_opt(&lookup, "DB_MAX_OVERFLOW")? {
            database.max_overflow = overflow;
        }
        if let Some(secs) = parse_opt(&lookup, "DB_POOL_RECYCLE")? {
            database.pool_recycle = Duration::from_secs(secs);
        }

        let embeddings = EmbeddingSettings {
            url: lookup("EMBEDDINGS_URL")
                .ok_or_else(|| MemoryError::Config("EMBEDDINGS_URL is not set".into()))?,
            api_key: lookup("EMBEDDINGS_API_KEY"),
            model: lookup("EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-3-large".to_string()),
            dimension: parse_opt(&lookup, "EMBEDDING_DIMENSION")?.unwrap_or(2000),
        };

        let config = Self {
            database,
            embeddings,
            namespace: lookup("VECTOR_NAMESPACE").unwrap_or_else(|| "default".to_string()),
            consolidation_interval: parse_opt(&lookup, "CONSOLIDATION_INTERVAL")?
                .map(Duration::from_secs),
            rmt_ttl_sweep_interval: Duration::from_secs(
                parse_opt(&lookup, "RMT_TTL_SWEEP_INTERVAL")?.unwrap_or(DEFAULT_RMT_SWEEP_SECS),
            ),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field consistency
    ///
    /// # Errors
    ///
    /// `Config` when the declared dimension contradicts the known dimension
    /// of the configured model, or the dimension is zero.
    pub fn validate(&self) -> Result<()> {
        if self.embeddings.dimension == 0 {
            return Err(MemoryError::Config(
                "EMBEDDING_DIMENSION must be positive".into(),
            ));
        }

        if let Some(expected) = expected_dimension(&self.embeddings.model) {
            if self.embeddings.dimension != expected {
                return Err(MemoryError::Config(format!(
                    "EMBEDDING_DIMENSION mismatch: {} != {} for model {}",
                    self.embeddings.dimension, expected, self.embeddings.model
                )));
            }
        }

        if self.database.pool_size == 0 {
            return Err(MemoryError::Config("DB_POOL_SIZE must be positive".into()));
        }

        Ok(())
    }
}

/// Known dimension per embedding model
///
/// `text-embedding-3-large` is pinned at 2000, the maximum pgvector HNSW
/// supports, requested from the provider via its dimensions parameter.
#[must_use]
pub fn expected_dimension(model: &str) -> Option<usize> {
    match model {
        "text-embedding-3-large" => Some(2000),
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        _ => None,
    }
}

fn parse_opt<T: std::str::FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| MemoryError::Config(format!("{key} has invalid value {raw:?}"))),
        None => Ok(None),
    }
}
