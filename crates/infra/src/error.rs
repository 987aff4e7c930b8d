//! Error taxonomy surfaced by the workflow operations.

use thiserror::Error;

use tradeflow_core::DomainError;

use crate::store::StoreError;

/// Failure of a workflow operation.
///
/// Every operation runs in one transaction; when one of these is returned
/// nothing the operation did is visible.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// Malformed or inconsistent input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced product, order, purchase order, contract or line is absent.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("out of stock: {0}")]
    OutOfStock(String),

    #[error("invalid {kind} transition: {from} -> {to}")]
    InvalidTransition {
        kind: &'static str,
        from: String,
        to: String,
    },

    /// Unique key taken or stale version.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Store failure or broken invariant.
    #[error("internal error: {0}")]
    Internal(String),
}

impl WorkflowError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<DomainError> for WorkflowError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => Self::Validation(msg),
            DomainError::InvariantViolation(msg) => Self::Internal(msg),
            DomainError::NotFound(msg) => Self::NotFound(msg),
            DomainError::OutOfStock(msg) => Self::OutOfStock(msg),
            DomainError::InvalidTransition { kind, from, to } => {
                Self::InvalidTransition { kind, from, to }
            }
            DomainError::Conflict(msg) => Self::Conflict(msg),
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::NotFound(msg) => Self::NotFound(msg),
            StoreError::Backend(msg) | StoreError::Corrupt(msg) => Self::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_breaches_are_internal() {
        let err: WorkflowError = DomainError::invariant("reserved went negative").into();
        assert_eq!(err, WorkflowError::Internal("reserved went negative".into()));
    }

    #[test]
    fn store_failures_keep_conflicts_distinct() {
        let conflict: WorkflowError = StoreError::Conflict("sku taken".into()).into();
        assert!(matches!(conflict, WorkflowError::Conflict(_)));

        let backend: WorkflowError = StoreError::Backend("connection reset".into()).into();
        assert!(matches!(backend, WorkflowError::Internal(_)));
    }

    #[test]
    fn transition_errors_keep_their_shape() {
        let err: WorkflowError = DomainError::invalid_transition("order", "pending", "shipped").into();
        assert_eq!(err.to_string(), "invalid order transition: pending -> shipped");
    }
}
