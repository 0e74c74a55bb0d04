//! Domain error types.

use common::ReviewId;
use thiserror::Error;

use crate::artifact::EnhancementStatus;
use crate::order::OrderStatus;
use crate::validation::ValidationError;

/// Errors raised by domain rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// The order status machine does not allow this move.
    #[error("Invalid order transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// The enhancement status machine does not allow this move.
    #[error("Invalid enhancement transition: {from} -> {to}")]
    InvalidEnhancementTransition {
        from: EnhancementStatus,
        to: EnhancementStatus,
    },

    /// The review has already been approved or rejected.
    #[error("Review {0} has already been decided")]
    ReviewAlreadyDecided(ReviewId),

    /// A stored value could not be parsed back into a domain enum.
    #[error("Unknown {kind} value: {value}")]
    UnknownValue { kind: &'static str, value: String },

    /// The order failed structural validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Convenience type alias for domain results.
pub type Result<T> = std::result::Result<T, DomainError>;
