//! Error types shared by every reconciliation component.

use thiserror::Error;

use crate::backend::BackendError;

#[derive(Debug, Clone, Error)]
pub enum ReconcileError {
    /// A container or task specification could not be normalized.
    #[error("invalid spec: {0}")]
    InvalidSpec(String),

    /// A required argument was missing or empty.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The cluster backend rejected or failed a call.
    #[error("backend call {operation} failed: {message}")]
    Backend { operation: String, message: String },

    /// The observed state does not satisfy the predicate yet.
    #[error("not converged: {0}")]
    NotConverged(String),

    /// The observed state can never satisfy the predicate.
    #[error("polling failed: {0}")]
    Polling(String),

    #[error("gave up waiting for {label} after {attempts} attempts")]
    PollingTimeout { label: String, attempts: u32 },

    #[error("cancelled while waiting for {0}")]
    Cancelled(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ReconcileError {
    /// Whether a poll loop should swallow this error and observe again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReconcileError::NotConverged(_) | ReconcileError::Backend { .. }
        )
    }

    /// Whether this error was raised before any I/O took place.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            ReconcileError::InvalidSpec(_) | ReconcileError::InvalidArgument(_)
        )
    }
}

impl From<BackendError> for ReconcileError {
    fn from(err: BackendError) -> Self {
        ReconcileError::Backend {
            operation: err.operation().to_string(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(ReconcileError::NotConverged("starting".into()).is_retryable());
        assert!(
            ReconcileError::Backend {
                operation: "describe_services".into(),
                message: "throttled".into(),
            }
            .is_retryable()
        );
        assert!(!ReconcileError::Polling("no services".into()).is_retryable());
        assert!(!ReconcileError::InvalidArgument("cluster".into()).is_retryable());
    }

    #[test]
    fn backend_error_keeps_operation_name() {
        let err: ReconcileError = BackendError::NotFound {
            operation: "delete_service",
            resource: "svc-1".into(),
        }
        .into();
        match err {
            ReconcileError::Backend { operation, message } => {
                assert_eq!(operation, "delete_service");
                assert!(message.contains("svc-1"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
