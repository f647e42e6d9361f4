//! Error types for the PostgreSQL storage backend.

use binsight_storage::PersistenceError;
use sqlx_core::error::Error as SqlxError;

/// PostgreSQL error code for unique constraint violations (23505).
pub const PG_UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL error code for not-null constraint violations (23502).
pub const PG_NOT_NULL_VIOLATION: &str = "23502";

/// PostgreSQL error code for foreign key violations (23503).
pub const PG_FOREIGN_KEY_VIOLATION: &str = "23503";

/// PostgreSQL error code for check constraint violations (23514).
pub const PG_CHECK_VIOLATION: &str = "23514";

/// Checks if a sqlx error has a specific PostgreSQL error code.
pub fn has_pg_error_code(err: &SqlxError, code: &str) -> bool {
    if let SqlxError::Database(db_err) = err {
        db_err.code().as_deref() == Some(code)
    } else {
        false
    }
}

/// Maps a sqlx error raised while working on `entity` to a [`PersistenceError`].
///
/// Constraint failures are classified by SQLSTATE; data exceptions (class 22)
/// mean the payload could not be converted to the column types; pool and
/// connection failures are reported as unavailable.
pub fn classify(err: SqlxError, entity: &str) -> PersistenceError {
    match &err {
        SqlxError::Database(db_err) => {
            let code = db_err.code().map(|c| c.into_owned()).unwrap_or_default();
            let detail = match db_err.constraint() {
                Some(constraint) => format!("{} ({constraint})", db_err.message()),
                None => db_err.message().to_string(),
            };
            match code.as_str() {
                PG_UNIQUE_VIOLATION => PersistenceError::conflict(entity, detail),
                PG_NOT_NULL_VIOLATION | PG_FOREIGN_KEY_VIOLATION | PG_CHECK_VIOLATION => {
                    PersistenceError::constraint_violation(entity, detail)
                }
                c if c.starts_with("22") => {
                    PersistenceError::invalid_record(format!("{entity}: {detail}"))
                }
                c if c.starts_with("08") || c.starts_with("53") || c.starts_with("57P") => {
                    PersistenceError::unavailable(detail)
                }
                _ => PersistenceError::internal(format!("{entity}: {detail} [{code}]")),
            }
        }
        SqlxError::PoolTimedOut | SqlxError::PoolClosed | SqlxError::Io(_) | SqlxError::Tls(_) => {
            PersistenceError::unavailable(err.to_string())
        }
        _ => PersistenceError::internal(format!("{entity}: {err}")),
    }
}

/// Errors specific to the PostgreSQL storage backend.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database connection error.
    #[error("Database connection error: {0}")]
    Connection(#[from] SqlxError),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Schema management error.
    #[error("Schema error: {message}")]
    Schema { message: String },
}

impl PostgresError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a new schema error.
    #[must_use]
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }
}

impl From<PostgresError> for PersistenceError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Connection(e) => classify(e, "postgres"),
            PostgresError::Migration(e) => {
                PersistenceError::internal(format!("Migration error: {e}"))
            }
            PostgresError::Config { message } => {
                PersistenceError::internal(format!("Configuration error: {message}"))
            }
            PostgresError::Schema { message } => {
                PersistenceError::internal(format!("Schema error: {message}"))
            }
        }
    }
}

/// Result type alias for PostgreSQL operations.
pub type Result<T> = std::result::Result<T, PostgresError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PostgresError::config("invalid URL");
        assert!(err.to_string().contains("Configuration error"));

        let err = PostgresError::schema("bad collection name");
        assert!(err.to_string().contains("Schema error"));
    }

    #[test]
    fn test_conversion_to_persistence_error() {
        let err: PersistenceError = PostgresError::config("test error").into();
        assert!(matches!(err, PersistenceError::Internal { .. }));

        let err: PersistenceError = PostgresError::Connection(SqlxError::PoolTimedOut).into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_non_database_errors() {
        assert!(classify(SqlxError::PoolClosed, "users").is_retryable());
        let err = classify(SqlxError::RowNotFound, "users");
        assert!(matches!(err, PersistenceError::Internal { .. }));
        assert!(!has_pg_error_code(&SqlxError::RowNotFound, PG_UNIQUE_VIOLATION));
    }
}
