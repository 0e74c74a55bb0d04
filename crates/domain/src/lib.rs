//! Domain layer for the print fulfillment core.
//!
//! This crate provides the plain data model and the rules attached to it:
//! - Artifact and its enhancement status
//! - Order with its status state machine and the vendor status mapping
//! - Review (moderation) records
//! - The static vendor catalog and region resolution
//! - Status history entries
//! - Validation of an order before it is sent to the vendor

pub mod artifact;
pub mod catalog;
pub mod error;
pub mod history;
pub mod order;
pub mod review;
pub mod validation;

pub use artifact::{Artifact, EnhancementStatus};
pub use catalog::{
    CatalogEntry, CatalogVariant, ProductType, Region, ResolvedVariant, VendorProduct,
    VendorProductKey,
};
pub use error::{DomainError, Result};
pub use history::{EntryKind, StatusHistoryEntry};
pub use order::{
    CustomerContact, CustomerStatus, Money, Order, OrderStatus, ShippingAddress, VendorOrderRef,
};
pub use review::{Review, ReviewOutcome, ReviewStatus, ReviewType};
pub use validation::{ValidationError, validate_for_vendor};
