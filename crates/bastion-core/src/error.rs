//! Unified error taxonomy shared by the cache, repository and job layers.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;

/// Unified error type for Bastion.
///
/// The type is `Clone` because a single loader outcome is handed to every
/// caller that coalesced on the same cache key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BastionError {
    // ============ Domain Errors ============
    /// Confirmed absence, either from the authoritative store or from a
    /// negative-cache marker that is still alive.
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// A cached index value could not be parsed back into an identifier.
    #[error("Conversion error: {0}")]
    Conversion(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflict error (e.g., duplicate entry)
    #[error("Conflict: {0}")]
    Conflict(String),

    // ============ Infrastructure Errors ============
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Key-value store error
    #[error("Cache error: {0}")]
    Cache(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    // ============ Internal Errors ============
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BastionError {
    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conversion(_) => "CONVERSION_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Cache(_) => "CACHE_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Creates a not found error for a resource.
    #[must_use]
    pub fn not_found<T: ToString>(resource_type: &'static str, id: T) -> Self {
        Self::NotFound {
            resource_type,
            id: id.to_string(),
        }
    }

    /// Creates a conversion error.
    #[must_use]
    pub fn conversion<T: Into<String>>(message: T) -> Self {
        Self::Conversion(message.into())
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict<T: Into<String>>(message: T) -> Self {
        Self::Conflict(message.into())
    }

    /// Creates a cache (key-value store) error.
    #[must_use]
    pub fn cache<T: Into<String>>(message: T) -> Self {
        Self::Cache(message.into())
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true for confirmed absence.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Checks if this error is retriable.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Cache(_) | Self::Timeout(_))
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for BastionError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound {
                resource_type: "database_row",
                id: "unknown".to_string(),
            },
            sqlx::Error::Database(db_err) => {
                if let Some(code) = db_err.code() {
                    // MySQL duplicate key / PostgreSQL unique violation
                    if code == "23000" || code == "1062" || code == "23505" {
                        return Self::Conflict(db_err.message().to_string());
                    }
                }
                Self::Database(err.to_string())
            }
            _ => Self::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for BastionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON serialization error: {err}"))
    }
}

/// Serializable error summary, used in logs and task reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl From<&BastionError> for ErrorResponse {
    fn from(error: &BastionError) -> Self {
        Self {
            code: error.error_code().to_string(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(BastionError::not_found("user", 1).error_code(), "NOT_FOUND");
        assert_eq!(BastionError::conversion("bad id").error_code(), "CONVERSION_ERROR");
        assert_eq!(BastionError::validation("bad input").error_code(), "VALIDATION_ERROR");
        assert_eq!(BastionError::conflict("duplicate").error_code(), "CONFLICT");
        assert_eq!(BastionError::cache("down").error_code(), "CACHE_ERROR");
        assert_eq!(BastionError::Database("db".to_string()).error_code(), "DATABASE_ERROR");
        assert_eq!(BastionError::internal("err").error_code(), "INTERNAL_ERROR");
        assert_eq!(BastionError::Timeout("t".to_string()).error_code(), "TIMEOUT");
    }

    #[test]
    fn test_not_found_is_distinct_from_conversion() {
        assert!(BastionError::not_found("user", 7).is_not_found());
        assert!(!BastionError::conversion("abc").is_not_found());
    }

    #[test]
    fn test_retriable_errors() {
        assert!(BastionError::Database("connection lost".to_string()).is_retriable());
        assert!(BastionError::cache("connection refused").is_retriable());
        assert!(BastionError::Timeout("request timed out".to_string()).is_retriable());
        assert!(!BastionError::not_found("user", 1).is_retriable());
        assert!(!BastionError::conversion("abc").is_retriable());
        assert!(!BastionError::validation("bad").is_retriable());
    }

    #[test]
    fn test_error_display() {
        let err = BastionError::not_found("user", 999);
        assert_eq!(err.to_string(), "Resource not found: user with id 999");

        let err = BastionError::conversion("invalid digit found in string");
        assert!(err.to_string().contains("invalid digit"));
    }

    #[test]
    fn test_clone_preserves_equality() {
        let err = BastionError::not_found("user", "42");
        assert_eq!(err.clone(), err);
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: BastionError = json_err.into();
        assert!(matches!(err, BastionError::Internal(_)));
    }

    #[cfg(feature = "sqlx")]
    #[test]
    fn test_from_sqlx_row_not_found() {
        let err: BastionError = sqlx::Error::RowNotFound.into();
        assert!(err.is_not_found());
    }

    #[cfg(feature = "sqlx")]
    #[test]
    fn test_from_sqlx_pool_timeout() {
        let err: BastionError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, BastionError::Database(_)));
    }

    #[test]
    fn test_error_response_from_error() {
        let response = ErrorResponse::from(&BastionError::conflict("email taken"));
        assert_eq!(response.code, "CONFLICT");
        assert!(response.message.contains("email taken"));
    }
}
