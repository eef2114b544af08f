//! DSN normalization
//!
//! Accepts `postgres://`, `postgresql://`, and SQLAlchemy-style
//! `postgresql+asyncpg://` connection strings; the driver suffix is
//! stripped so the string parses as a plain PostgreSQL URL.

use mnemo_core::{MemoryError, Result};

/// Normalize a PostgreSQL connection string
///
/// # Errors
///
/// `Config` when the scheme is not a recognized PostgreSQL prefix.
pub fn normalize_dsn(dsn: &str) -> Result<String> {
    let dsn = dsn.trim();

    if let Some(rest) = dsn.strip_prefix("postgresql+asyncpg://") {
        return Ok(format!("postgresql://{rest}"));
    }
    if let Some(rest) = dsn.strip_prefix("postgres+asyncpg://") {
        return Ok(format!("postgresql://{rest}"));
    }
    if dsn.starts_with("postgresql://") || dsn.starts_with("postgres://") {
        return Ok(dsn.to_string());
    }

    Err(MemoryError::Config(format!(
        "unrecognized DSN scheme in {dsn:?}; expected postgres://, postgresql://, or postgresql+asyncpg://"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_schemes_pass_through() {
        assert_eq!(
            normalize_dsn("postgres://u:p@h/db").unwrap(),
            "postgres://u:p@h/db"
        );
        assert_eq!(
            normalize_dsn("postgresql://u:p@h/db").unwrap(),
            "postgresql://u:p@h/db"
        );
    }

    #[test]
    fn asyncpg_suffix_is_stripped() {
        assert_eq!(
            normalize_dsn("postgresql+asyncpg://u:p@h:6543/db").unwrap(),
            "postgresql://u:p@h:6543/db"
        );
    }

    #[test]
    fn other_schemes_are_rejected() {
        assert!(normalize_dsn("mysql://u:p@h/db").is_err());
        assert!(normalize_dsn("h/db").is_err());
    }
}
