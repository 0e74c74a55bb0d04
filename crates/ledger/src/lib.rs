//! Order status ledger.
//!
//! - [`StatusLedger`]: the only path through which order statuses change,
//!   so every accepted transition leaves exactly one ledger entry
//! - [`OrderTimeline`]: read model over an order's entries (status
//!   sequence, latest status, customer-facing status, notes)

pub mod error;
pub mod status_ledger;
pub mod timeline;

pub use error::{LedgerError, Result};
pub use status_ledger::StatusLedger;
pub use timeline::OrderTimeline;
