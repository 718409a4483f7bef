//! Task and scheduler error types.

use bastion_core::BastionError;
use thiserror::Error;

/// Result type for task operations.
pub type JobResult<T> = Result<T, JobError>;

/// Task-related errors.
#[derive(Debug, Clone, Error)]
pub enum JobError {
    /// Task execution failed.
    #[error("Task execution failed: {0}")]
    ExecutionFailed(String),

    /// Task timed out.
    #[error("Task timed out after {0} seconds")]
    Timeout(u64),

    /// A task with the same name is already registered.
    #[error("Task already registered: {0}")]
    DuplicateTask(String),

    /// Task not found.
    #[error("Task not found: {0}")]
    NotFound(String),

    /// Scheduler error.
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl JobError {
    /// Returns true if running the task again later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, JobError::ExecutionFailed(_) | JobError::Timeout(_))
    }
}

impl From<BastionError> for JobError {
    fn from(err: BastionError) -> Self {
        match err {
            BastionError::Configuration(msg) => JobError::Configuration(msg),
            BastionError::Timeout(msg) => JobError::ExecutionFailed(format!("timed out: {msg}")),
            BastionError::Internal(msg) => JobError::Internal(msg),
            other => JobError::ExecutionFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable_execution_failed() {
        assert!(JobError::ExecutionFailed("oops".into()).is_retryable());
    }

    #[test]
    fn test_is_retryable_timeout() {
        assert!(JobError::Timeout(30).is_retryable());
    }

    #[test]
    fn test_is_not_retryable_duplicate() {
        assert!(!JobError::DuplicateTask("cleanup".into()).is_retryable());
    }

    #[test]
    fn test_from_database_error() {
        let err = JobError::from(BastionError::Database("connection refused".into()));
        match err {
            JobError::ExecutionFailed(msg) => assert!(msg.contains("connection refused")),
            other => panic!("Expected ExecutionFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_from_internal_error() {
        let err = JobError::from(BastionError::Internal("database down".into()));
        assert!(matches!(err, JobError::Internal(msg) if msg == "database down"));
    }

    #[test]
    fn test_error_display_timeout() {
        assert!(JobError::Timeout(60).to_string().contains("60"));
    }
}
