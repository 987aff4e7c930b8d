//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, lifecycle rules, stock). Store and transaction failures belong
/// to the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed or inconsistent input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated (e.g. reserved stock going negative).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Not enough available stock to satisfy a reservation.
    #[error("out of stock: {0}")]
    OutOfStock(String),

    /// A status change is not an edge of the entity's lifecycle graph.
    #[error("invalid {kind} transition: {from} -> {to}")]
    InvalidTransition {
        kind: &'static str,
        from: String,
        to: String,
    },

    /// A conflict occurred (stale version, duplicate key).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn out_of_stock(msg: impl Into<String>) -> Self {
        Self::OutOfStock(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_transition(
        kind: &'static str,
        from: impl core::fmt::Display,
        to: impl core::fmt::Display,
    ) -> Self {
        Self::InvalidTransition {
            kind,
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}
