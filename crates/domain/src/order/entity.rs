//! The order record.

use chrono::{DateTime, Utc};
use common::{ArtifactId, OrderId};
use serde::{Deserialize, Serialize};

use super::state::OrderStatus;
use super::value_objects::{CustomerContact, Money, ShippingAddress, VendorOrderRef};
use crate::catalog::{ProductType, Region, VendorProductKey};
use crate::error::{DomainError, Result};

/// Prefix of the payment reference assigned before the processor confirms.
const PLACEHOLDER_PREFIX: &str = "pending-";

/// A customer order for one artwork in one product format.
///
/// Status and vendor fields change only through [`Order::transition_to`] and
/// [`Order::attach_vendor_order`], which enforce that a vendor order id exists
/// only once the order is with the vendor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub artifact_id: Option<ArtifactId>,
    pub payment_reference: String,
    pub payment_confirmed_at: Option<DateTime<Utc>>,
    pub product_type: ProductType,
    pub size: String,
    pub price: Money,
    pub currency: String,
    pub contact: CustomerContact,
    pub shipping_address: Option<ShippingAddress>,
    pub vendor_order_id: Option<String>,
    pub vendor_order_status: Option<String>,
    /// Set when the order failed in a way retrying cannot fix. A held order
    /// is skipped by retries until an operator releases it.
    #[serde(default)]
    pub hold_reason: Option<String>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates an order at payment-intent time with a placeholder payment reference.
    pub fn new(
        product_type: ProductType,
        size: impl Into<String>,
        price: Money,
        currency: impl Into<String>,
        contact: CustomerContact,
        shipping_address: Option<ShippingAddress>,
    ) -> Self {
        let id = OrderId::new();
        let now = Utc::now();
        Self {
            id,
            artifact_id: None,
            payment_reference: format!("{PLACEHOLDER_PREFIX}{id}"),
            payment_confirmed_at: None,
            product_type,
            size: size.into(),
            price,
            currency: currency.into(),
            contact,
            shipping_address,
            vendor_order_id: None,
            vendor_order_status: None,
            hold_reason: None,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_artifact(mut self, artifact_id: ArtifactId) -> Self {
        self.artifact_id = Some(artifact_id);
        self
    }

    pub fn is_payment_confirmed(&self) -> bool {
        self.payment_confirmed_at.is_some()
    }

    pub fn is_held(&self) -> bool {
        self.hold_reason.is_some()
    }

    pub fn has_placeholder_payment_reference(&self) -> bool {
        self.payment_reference.starts_with(PLACEHOLDER_PREFIX)
    }

    /// Back-fills the processor's payment reference.
    ///
    /// Returns false if the payment was already confirmed (no change made).
    pub fn confirm_payment(&mut self, payment_reference: impl Into<String>) -> bool {
        if self.is_payment_confirmed() {
            return false;
        }
        let now = Utc::now();
        self.payment_reference = payment_reference.into();
        self.payment_confirmed_at = Some(now);
        self.updated_at = now;
        true
    }

    /// Region the vendor ships this order from, if it ships at all.
    pub fn destination_region(&self) -> Option<Region> {
        if !self.product_type.requires_physical_fulfillment() {
            return None;
        }
        let address = self.shipping_address.as_ref()?;
        Some(Region::for_destination(self.product_type, &address.country))
    }

    pub fn vendor_product_key(&self) -> Option<VendorProductKey> {
        let region = self.destination_region()?;
        Some(VendorProductKey::new(
            self.product_type,
            self.size.clone(),
            region,
        ))
    }

    /// Returns true if the order still has to be handed to the vendor.
    pub fn awaits_vendor_submission(&self) -> bool {
        self.vendor_order_id.is_none()
            && self.product_type.requires_physical_fulfillment()
            && self.status.awaits_vendor_submission()
    }

    pub fn transition_to(&mut self, next: OrderStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Attaches the vendor order and moves the order to processing.
    pub fn attach_vendor_order(&mut self, vendor_order: &VendorOrderRef) -> Result<()> {
        self.transition_to(OrderStatus::Processing)?;
        self.vendor_order_id = Some(vendor_order.vendor_order_id.clone());
        self.vendor_order_status = Some(vendor_order.status.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn print_order(country: &str) -> Order {
        Order::new(
            ProductType::ArtPrint,
            "12x18",
            Money::from_cents(2999),
            "usd",
            CustomerContact {
                name: "Ada Lovelace".to_string(),
                email: "ada@example.com".to_string(),
                phone: None,
            },
            Some(ShippingAddress {
                line1: "1 Main St".to_string(),
                city: "Springfield".to_string(),
                postal_code: "12345".to_string(),
                country: country.to_string(),
                ..Default::default()
            }),
        )
    }

    #[test]
    fn new_order_has_placeholder_reference() {
        let order = print_order("US");
        assert!(order.has_placeholder_payment_reference());
        assert!(!order.is_payment_confirmed());
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.awaits_vendor_submission());
        assert!(!order.is_held());
    }

    #[test]
    fn confirm_payment_backfills_once() {
        let mut order = print_order("US");
        assert!(order.confirm_payment("cs_test_123"));
        assert_eq!(order.payment_reference, "cs_test_123");
        assert!(order.is_payment_confirmed());
        assert!(!order.confirm_payment("cs_test_456"));
        assert_eq!(order.payment_reference, "cs_test_123");
    }

    #[test]
    fn vendor_product_key_uses_destination() {
        let key = print_order("NL").vendor_product_key().unwrap();
        assert_eq!(key.region, Region::Europe);
        assert_eq!(key.size, "12x18");
    }

    #[test]
    fn digital_order_has_no_vendor_key() {
        let mut order = print_order("US");
        order.product_type = ProductType::Digital;
        assert!(order.vendor_product_key().is_none());
        assert!(!order.awaits_vendor_submission());
    }

    #[test]
    fn attach_vendor_order_moves_to_processing() {
        let mut order = print_order("US");
        order
            .attach_vendor_order(&VendorOrderRef {
                vendor_order_id: "po_1".to_string(),
                status: "pending".to_string(),
            })
            .unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.vendor_order_id.as_deref(), Some("po_1"));
        assert!(!order.awaits_vendor_submission());
    }

    #[test]
    fn attach_vendor_order_rejected_when_cancelled() {
        let mut order = print_order("US");
        order.transition_to(OrderStatus::Cancelled).unwrap();
        let result = order.attach_vendor_order(&VendorOrderRef {
            vendor_order_id: "po_1".to_string(),
            status: "pending".to_string(),
        });
        assert!(result.is_err());
        assert!(order.vendor_order_id.is_none());
    }
}
