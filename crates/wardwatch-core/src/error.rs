//! Error types for wardwatch operations.
//!
//! [`WardError`] covers every failure a staff action, the escalation clock,
//! or the notification dispatcher can run into. Errors fall into four
//! families that callers treat differently:
//!
//! - **Rejections** (`Validation`, `*NotFound`) surface to the staff member
//!   with a readable reason.
//! - **Conflicts** mean "already handled" and are absorbed as no-ops.
//! - **Delivery degradation** is client-side audio failure; logged, never fatal.
//! - **Infrastructure** (database, config, I/O) bubbles up to the caller.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::{AdmissionId, AlertId, ScheduleId, WardId};

/// Result type alias using [`WardError`].
pub type Result<T> = std::result::Result<T, WardError>;

/// Comprehensive error type for all wardwatch operations.
#[derive(Debug, Error)]
pub enum WardError {
    // =========================================================================
    // Request Errors
    // =========================================================================
    /// Input failed validation (interval bounds, malformed references)
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// Admission does not exist
    #[error("Admission not found: {admission_id}")]
    AdmissionNotFound { admission_id: AdmissionId },

    /// Schedule does not exist
    #[error("Vitals schedule not found: {schedule_id}")]
    ScheduleNotFound { schedule_id: ScheduleId },

    /// Alert does not exist
    #[error("Vitals alert not found: {alert_id}")]
    AlertNotFound { alert_id: AlertId },

    /// Ward does not exist
    #[error("Ward not found: {ward_id}")]
    WardNotFound { ward_id: WardId },

    // =========================================================================
    // Benign Errors
    // =========================================================================
    /// The requested transition was already applied by another writer
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Sound playback failed; notification falls back to visual-only
    #[error("Sound delivery degraded: {message}")]
    DeliveryDegraded { message: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file not found
    #[error("Configuration not found at {path}")]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration file is invalid YAML
    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    /// Configuration validation failed
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error with context
    #[error("I/O error {operation}: {path}")]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory creation failed
    #[error("Failed to create directory: {path}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON parsing error
    #[error("JSON parse error in {context}: {message}")]
    JsonParse {
        context: String,
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // =========================================================================
    // Database Errors
    // =========================================================================
    /// Database query failed
    #[error("Database error: {message}")]
    Database { message: String, retryable: bool },

    /// Database migration failed
    #[error("Database migration failed: {message}")]
    DatabaseMigration { message: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error (bug in wardwatch)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl WardError {
    // =========================================================================
    // Constructor helpers for common error patterns
    // =========================================================================

    /// Create a validation error for a named field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a delivery degradation error
    pub fn delivery_degraded(message: impl Into<String>) -> Self {
        Self::DeliveryDegraded {
            message: message.into(),
        }
    }

    /// Create a ConfigNotFound error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ConfigNotFound {
            path: path.into(),
            source: None,
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Create a JSON parse error
    pub fn json_parse(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::JsonParse {
            context: context.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            retryable: false,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    // =========================================================================
    // Error classification helpers
    // =========================================================================

    /// Returns true if the request referenced something that does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::AdmissionNotFound { .. }
                | Self::ScheduleNotFound { .. }
                | Self::AlertNotFound { .. }
                | Self::WardNotFound { .. }
        )
    }

    /// Returns true if the request was malformed
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Returns true if the error means "already handled" and should be a no-op
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns true if the error should be shown to the staff member as a
    /// rejected request
    pub fn is_rejection(&self) -> bool {
        self.is_validation() || self.is_not_found()
    }

    /// Returns true if this error is absorbed internally and never interrupts
    /// the escalation clock or the dispatcher loop
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::DeliveryDegraded { .. })
    }

    /// Returns true if retrying the same operation may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Database { retryable: true, .. })
    }

    /// Returns true if this error is fatal (should exit application)
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Internal { .. } | Self::DatabaseMigration { .. })
    }

    /// Returns true if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound { .. } | Self::ConfigInvalid { .. } | Self::ConfigValidation { .. }
        )
    }

    /// Returns actionable guidance for the user
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Self::Validation { .. } => Some("Check the values entered and try again"),
            Self::AdmissionNotFound { .. } => {
                Some("The admission may have been removed - refresh the ward view")
            }
            Self::ScheduleNotFound { .. } => Some("Create a vitals schedule for this patient first"),
            Self::AlertNotFound { .. } => Some("The alert list is stale - refresh the feed"),
            Self::WardNotFound { .. } => Some("Pick a ward from the ward list"),
            Self::ConfigInvalid { .. } => Some("Check YAML syntax in ~/.wardwatch/config.yaml"),
            Self::Database { retryable: true, .. } => Some("The database is busy - try again"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = WardError::validation("interval_minutes", "must be at least 15");
        assert_eq!(err.to_string(), "Invalid interval_minutes: must be at least 15");
        assert!(err.is_validation());
        assert!(err.is_rejection());
        assert!(!err.is_benign());
        assert!(err.guidance().is_some());
    }

    #[test]
    fn test_not_found_classification() {
        let err = WardError::AlertNotFound { alert_id: 42 };
        assert!(err.to_string().contains("42"));
        assert!(err.is_not_found());
        assert!(err.is_rejection());
    }

    #[test]
    fn test_benign_errors() {
        assert!(WardError::conflict("alert already open").is_benign());
        assert!(WardError::delivery_degraded("autoplay blocked").is_benign());
        assert!(!WardError::database("disk full").is_benign());
    }

    #[test]
    fn test_error_classification() {
        assert!(WardError::Database {
            message: "locked".into(),
            retryable: true
        }
        .is_recoverable());
        assert!(!WardError::database("syntax").is_recoverable());
        assert!(WardError::internal("bug").is_fatal());
        assert!(WardError::config_not_found("/tmp/config.yaml").is_config_error());
    }
}
