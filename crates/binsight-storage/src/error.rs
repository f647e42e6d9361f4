//! Error types shared by every repository backend.

use std::fmt;

use binsight_core::CoreError;

/// Errors returned by repository operations.
///
/// Not-found is not an error: lookups return `None` and deletes return `false`.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// A uniqueness constraint was violated (duplicate key, duplicate `_id`).
    #[error("Conflict in {entity}: {message}")]
    Conflict {
        /// Table or collection the write targeted.
        entity: String,
        /// Description of the conflicting value.
        message: String,
    },

    /// A required value was missing or a foreign key/check constraint failed.
    #[error("Constraint violation in {entity}: {message}")]
    ConstraintViolation {
        /// Table or collection the write targeted.
        entity: String,
        /// Description of the violated constraint.
        message: String,
    },

    /// The payload names unknown columns, sets an immutable key or is malformed.
    #[error("Invalid record: {message}")]
    InvalidRecord {
        /// Why the payload was rejected.
        message: String,
    },

    /// A filter, sort specification or pipeline could not be parsed.
    #[error("Invalid query: {message}")]
    InvalidQuery {
        /// Why the query was rejected.
        message: String,
    },

    /// The backing store could not be reached or timed out.
    #[error("Backend unavailable: {message}")]
    Unavailable {
        /// Description of the connection failure.
        message: String,
    },

    /// Any other backend failure.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl PersistenceError {
    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConstraintViolation` error.
    #[must_use]
    pub fn constraint_violation(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRecord` error.
    #[must_use]
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidQuery` error.
    #[must_use]
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Creates a new `Unavailable` error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` for uniqueness conflicts.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns `true` for constraint violations other than uniqueness.
    #[must_use]
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation { .. })
    }

    /// Returns `true` if the caller supplied an unusable payload or query.
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidRecord { .. } | Self::InvalidQuery { .. })
    }

    /// Returns `true` if retrying the same call may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::ConstraintViolation { .. } => ErrorCategory::Constraint,
            Self::InvalidRecord { .. } | Self::InvalidQuery { .. } => ErrorCategory::Validation,
            Self::Unavailable { .. } => ErrorCategory::Infrastructure,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Stored data that no longer decodes into its model is a backend problem,
/// not a caller problem.
impl From<CoreError> for PersistenceError {
    fn from(err: CoreError) -> Self {
        Self::internal(err.to_string())
    }
}

/// Categories of persistence errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Uniqueness conflict.
    Conflict,
    /// Other constraint violation.
    Constraint,
    /// Rejected payload or query.
    Validation,
    /// Connection or timeout failure.
    Infrastructure,
    /// Internal error.
    Internal,
}

impl ErrorCategory {
    /// Returns the label used in logs and metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conflict => "conflict",
            Self::Constraint => "constraint",
            Self::Validation => "validation",
            Self::Infrastructure => "infrastructure",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reports a failed repository call through `tracing` and `metrics`.
pub fn record_failure(backend: &'static str, operation: &'static str, err: &PersistenceError) {
    let category = err.category();
    match category {
        ErrorCategory::Infrastructure | ErrorCategory::Internal => tracing::error!(
            backend,
            operation,
            category = %category,
            error = %err,
            "Repository operation failed"
        ),
        _ => tracing::warn!(
            backend,
            operation,
            category = %category,
            error = %err,
            "Repository operation rejected"
        ),
    }
    metrics::counter!(
        "persistence_errors_total",
        "backend" => backend,
        "category" => category.as_str()
    )
    .increment(1);
}

/// Attaches [`record_failure`] to a repository result.
pub trait ObserveExt<T> {
    /// Records the error (if any) and returns the result unchanged.
    fn observe(self, backend: &'static str, operation: &'static str) -> Self;
}

impl<T> ObserveExt<T> for Result<T, PersistenceError> {
    fn observe(self, backend: &'static str, operation: &'static str) -> Self {
        if let Err(err) = &self {
            record_failure(backend, operation, err);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PersistenceError::conflict("users", "username 'ana' already exists");
        assert_eq!(
            err.to_string(),
            "Conflict in users: username 'ana' already exists"
        );

        let err = PersistenceError::invalid_query("$foo is not an operator");
        assert_eq!(err.to_string(), "Invalid query: $foo is not an operator");
    }

    #[test]
    fn test_error_predicates() {
        assert!(PersistenceError::conflict("bins", "dup").is_conflict());
        assert!(PersistenceError::constraint_violation("users", "x").is_constraint_violation());
        assert!(PersistenceError::invalid_record("id").is_invalid_input());
        assert!(PersistenceError::unavailable("pool timed out").is_retryable());
        assert!(!PersistenceError::internal("boom").is_retryable());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            PersistenceError::invalid_query("x").category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            PersistenceError::unavailable("x").category().to_string(),
            "infrastructure"
        );
    }

    #[test]
    fn test_observe_passes_result_through() {
        let ok: Result<u8, PersistenceError> = Ok(1);
        assert_eq!(ok.observe("memory", "get_by_id").unwrap(), 1);

        let err: Result<u8, PersistenceError> = Err(PersistenceError::internal("x"));
        assert!(err.observe("memory", "get_by_id").is_err());
    }
}
