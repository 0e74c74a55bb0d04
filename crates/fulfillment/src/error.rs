//! Fulfillment error types.

use common::{OrderId, ReviewId};
use domain::{DomainError, OrderStatus, ValidationError};
use ledger::LedgerError;
use resilience::{IntegrityError, ResilienceError};
use serde::Serialize;
use store::StoreError;
use thiserror::Error;

use crate::services::ServiceError;

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    DependencyUnavailable,
    AlreadyDecided,
    AlreadyExists,
    IntegrityCheckFailed,
    NotFound,
    StatusConflict,
    InvalidTransition,
    Fatal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::DependencyUnavailable => "dependency_unavailable",
            ErrorKind::AlreadyDecided => "already_decided",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::IntegrityCheckFailed => "integrity_check_failed",
            ErrorKind::NotFound => "not_found",
            ErrorKind::StatusConflict => "status_conflict",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::Fatal => "fatal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur while fulfilling an order.
///
/// Cloneable so a deduplicated call can hand the same failure to every caller.
#[derive(Debug, Clone, Error)]
pub enum FulfillmentError {
    /// The order can never be submitted as it stands. Never retried.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Breaker open, timed out, or the dependency failed. Retry later.
    #[error("{dependency} unavailable: {reason}")]
    DependencyUnavailable { dependency: String, reason: String },

    #[error("Review {0} has already been decided")]
    AlreadyDecided(ReviewId),

    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    #[error("Integrity check failed: {0}")]
    IntegrityCheckFailed(#[from] IntegrityError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Another invocation moved the order first.
    #[error("Order {order_id} is {actual}, expected {expected}")]
    StatusConflict {
        order_id: OrderId,
        expected: OrderStatus,
        actual: OrderStatus,
    },

    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// The dependency refused the request itself. Sending it again will
    /// not help, so it is treated as fatal.
    #[error("{dependency} rejected the request: {reason}")]
    Rejected { dependency: String, reason: String },

    /// Unexpected. Surfaced to an operator; the order is left as it was.
    #[error("Fatal: {0}")]
    Fatal(String),
}

impl FulfillmentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FulfillmentError::Validation(_) => ErrorKind::Validation,
            FulfillmentError::DependencyUnavailable { .. } => ErrorKind::DependencyUnavailable,
            FulfillmentError::AlreadyDecided(_) => ErrorKind::AlreadyDecided,
            FulfillmentError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            FulfillmentError::IntegrityCheckFailed(_) => ErrorKind::IntegrityCheckFailed,
            FulfillmentError::NotFound { .. } => ErrorKind::NotFound,
            FulfillmentError::StatusConflict { .. } => ErrorKind::StatusConflict,
            FulfillmentError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            FulfillmentError::Rejected { .. } | FulfillmentError::Fatal(_) => ErrorKind::Fatal,
        }
    }

    /// Returns true if re-invoking later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::DependencyUnavailable | ErrorKind::IntegrityCheckFailed
        )
    }

    /// Returns true if the order stays stuck until someone changes it.
    pub fn needs_operator(&self) -> bool {
        matches!(
            self,
            FulfillmentError::Validation(_) | FulfillmentError::Rejected { .. }
        )
    }

    /// Returns true for idempotency guards that callers treat as done.
    pub fn is_success_equivalent(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::AlreadyDecided | ErrorKind::AlreadyExists | ErrorKind::StatusConflict
        )
    }

    /// Classifies the result of a guarded call to `dependency`.
    pub fn from_dependency(dependency: &str, err: ResilienceError<ServiceError>) -> Self {
        match err {
            ResilienceError::Operation(service) if service.is_permanent() => {
                FulfillmentError::Rejected {
                    dependency: dependency.to_string(),
                    reason: service.to_string(),
                }
            }
            ResilienceError::Operation(service) => FulfillmentError::DependencyUnavailable {
                dependency: dependency.to_string(),
                reason: service.to_string(),
            },
            other => FulfillmentError::DependencyUnavailable {
                dependency: dependency.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

impl From<DomainError> for FulfillmentError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidTransition { from, to } => {
                FulfillmentError::InvalidTransition { from, to }
            }
            DomainError::ReviewAlreadyDecided(id) => FulfillmentError::AlreadyDecided(id),
            DomainError::Validation(e) => FulfillmentError::Validation(e),
            other => FulfillmentError::Fatal(other.to_string()),
        }
    }
}

impl From<StoreError> for FulfillmentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => FulfillmentError::NotFound { entity, id },
            StoreError::AlreadyExists { entity, id } => {
                FulfillmentError::AlreadyExists { entity, id }
            }
            StoreError::StatusConflict {
                order_id,
                expected,
                actual,
            } => FulfillmentError::StatusConflict {
                order_id,
                expected,
                actual,
            },
            StoreError::Domain(e) => e.into(),
            other => FulfillmentError::Fatal(other.to_string()),
        }
    }
}

impl From<LedgerError> for FulfillmentError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Store(e) => e.into(),
            other => FulfillmentError::Fatal(other.to_string()),
        }
    }
}

/// Convenience type alias for fulfillment results.
pub type Result<T> = std::result::Result<T, FulfillmentError>;
