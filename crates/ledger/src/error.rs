//! Ledger error types.

use common::OrderId;
use domain::OrderStatus;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur reading or writing the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// An error occurred in the store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The recorded transitions do not form a legal path ending in the
    /// order's stored status.
    #[error("Ledger for order {order_id} is inconsistent: {reason}")]
    Inconsistent { order_id: OrderId, reason: String },

    /// The order's ledger does not match the stored status.
    #[error("Ledger for order {order_id} ends at {recorded} but the order is {actual}")]
    StatusMismatch {
        order_id: OrderId,
        recorded: OrderStatus,
        actual: OrderStatus,
    },
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
