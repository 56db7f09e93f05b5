//! Error types for the schedule and alert store.

use thiserror::Error;
use wardwatch_core::WardError;

/// Store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database locked error (retryable)
    #[error("database is locked (retry {retry_count}/{max_retries}): {message}")]
    DatabaseLocked {
        /// Retry attempt number
        retry_count: u32,
        /// Maximum retries allowed
        max_retries: u32,
        /// Human-readable message
        message: String,
    },

    /// Connection mutex was poisoned by a panicking writer
    #[error("connection lock poisoned: {0}")]
    LockPoisoned(String),

    /// Migration error
    #[error("migration error: {0}")]
    Migration(String),
}

impl StoreError {
    /// Check if this error indicates a database lock.
    pub fn is_database_locked(&self) -> bool {
        match self {
            StoreError::DatabaseLocked { .. } => true,
            StoreError::Database(rusqlite::Error::SqliteFailure(e, _)) => {
                e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked
            }
            _ => false,
        }
    }

    /// Check if this error is a uniqueness or foreign-key violation.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            StoreError::Database(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

impl From<StoreError> for WardError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Migration(message) => WardError::DatabaseMigration { message },
            other => WardError::Database {
                retryable: other.is_database_locked(),
                message: other.to_string(),
            },
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locked_error_maps_to_recoverable() {
        let err = StoreError::DatabaseLocked {
            retry_count: 5,
            max_retries: 5,
            message: "busy".into(),
        };
        assert!(err.is_database_locked());

        let ward: WardError = err.into();
        assert!(ward.is_recoverable());
    }

    #[test]
    fn test_migration_error_is_fatal() {
        let ward: WardError = StoreError::Migration("v2 failed".into()).into();
        assert!(ward.is_fatal());
    }
}
