//! Persistence for the fulfillment core.
//!
//! Every operation that changes an order status writes its ledger entry in
//! the same atomic step, and every status change is a compare-and-swap on the
//! status the caller last observed.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryFulfillmentStore;
pub use postgres::PostgresFulfillmentStore;
pub use store::{EnhancementUpdate, FulfillmentStore, FulfillmentStoreExt, ReviewInsert};
