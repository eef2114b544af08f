//! Connection pool, schema bootstrap, and migrations
//!
//! Built for operation behind PgBouncer in transaction mode: no pre-ping,
//! no reliance on prepared-statement caches surviving across checkouts
//! (deadpool's fast recycling clears session state).

use std::str::FromStr;
use std::time::Duration;

use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod, Runtime};
use tokio_postgres::config::SslMode;
use tokio_postgres::NoTls;
use tracing::{debug, info};

use mnemo_config::DatabaseSettings;
use mnemo_core::{MemoryError, Result};

use super::map_pg_error;

mod embedded {
    refinery::embed_migrations!("./migrations");
}

/// Pool configuration for the PostgreSQL backend
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Connection string (`postgres://` or `postgresql://`)
    pub dsn: String,
    /// TLS mode forwarded to the driver
    pub ssl_mode: Option<String>,
    /// Maximum pooled connections (pool size + overflow)
    pub max_connections: usize,
    /// Checkout wait timeout
    pub wait_timeout: Duration,
}

impl PostgresConfig {
    /// Configuration for a DSN with default pool tuning
    #[must_use]
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            ssl_mode: None,
            max_connections: 16,
            wait_timeout: Duration::from_secs(30),
        }
    }

    /// Derive from validated configuration settings
    #[must_use]
    pub fn from_settings(settings: &DatabaseSettings) -> Self {
        Self {
            dsn: settings.dsn.clone(),
            ssl_mode: settings.ssl_mode.clone(),
            max_connections: settings.max_connections(),
            wait_timeout: settings.pool_timeout,
        }
    }
}

/// Shared PostgreSQL backend: one pool per process
///
/// `pool_recycle` semantics are provided by deadpool's fast recycling on
/// check-in; there is no age-based recycling at this layer.
pub struct PostgresBackend {
    pool: Pool,
}

impl PostgresBackend {
    /// Connect and verify the database is reachable
    ///
    /// # Errors
    ///
    /// `Config` for an unparseable DSN or SSL mode, `Store` when the
    /// verification round-trip fails.
    pub async fn connect(config: PostgresConfig) -> Result<Self> {
        let mut pg_config = tokio_postgres::Config::from_str(&config.dsn)
            .map_err(|e| MemoryError::Config(format!("invalid DSN: {e}")))?;

        if let Some(mode) = &config.ssl_mode {
            pg_config.ssl_mode(parse_ssl_mode(mode)?);
        }

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );

        let pool = Pool::builder(manager)
            .max_size(config.max_connections)
            .wait_timeout(Some(config.wait_timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| MemoryError::Config(format!("pool construction failed: {e}")))?;

        let backend = Self { pool };
        // Verify connectivity up front so misconfiguration fails at startup.
        let client = backend.client().await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| map_pg_error("startup connectivity check", &e))?;

        info!(
            max_connections = config.max_connections,
            "PostgreSQL backend connected"
        );
        Ok(backend)
    }

    /// Check out a pooled connection
    ///
    /// # Errors
    ///
    /// Transient `Store` when the pool times out or the connection cannot
    /// be established.
    pub async fn client(&self) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MemoryError::store_transient(format!("pool checkout failed: {e}")))
    }

    /// Apply embedded forward-only migrations
    ///
    /// Idempotent; safe to run on every startup against a fresh or
    /// already-migrated schema.
    ///
    /// # Errors
    ///
    /// `Store` when a migration statement fails.
    pub async fn run_migrations(&self) -> Result<()> {
        let mut client = self.client().await?;
        let report = embedded::migrations::runner()
            .run_async(&mut **client)
            .await
            .map_err(|e| MemoryError::store(format!("migration failed: {e}")))?;

        for migration in report.applied_migrations() {
            debug!(migration = %migration, "applied migration");
        }
        info!(
            applied = report.applied_migrations().len(),
            "migrations up to date"
        );
        Ok(())
    }

    /// Connectivity probe; never raises
    pub async fn health_check(&self) -> bool {
        match self.client().await {
            Ok(client) => client.simple_query("SELECT 1").await.is_ok(),
            Err(_) => false,
        }
    }

    /// Borrow the underlying pool
    #[must_use]
    pub const fn pool(&self) -> &Pool {
        &self.pool
    }
}

fn parse_ssl_mode(mode: &str) -> Result<SslMode> {
    match mode.to_ascii_lowercase().as_str() {
        "disable" => Ok(SslMode::Disable),
        "prefer" | "allow" => Ok(SslMode::Prefer),
        "require" => Ok(SslMode::Require),
        other => Err(MemoryError::Config(format!(
            "unsupported PGSSLMODE {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssl_mode_parsing() {
        assert!(matches!(parse_ssl_mode("disable"), Ok(SslMode::Disable)));
        assert!(matches!(parse_ssl_mode("Prefer"), Ok(SslMode::Prefer)));
        assert!(matches!(parse_ssl_mode("require"), Ok(SslMode::Require)));
        assert!(parse_ssl_mode("verify-full-ish").is_err());
    }

    #[test]
    fn config_from_settings_sums_connections() {
        let mut settings = DatabaseSettings::new("postgres://db/mnemo").unwrap();
        settings.pool_size = 5;
        settings.max_overflow = 7;
        let config = PostgresConfig::from_settings(&settings);
        assert_eq!(config.max_connections, 12);
    }
}
