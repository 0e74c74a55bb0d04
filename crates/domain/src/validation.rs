//! Structural checks run before an order is sent to the print vendor.
//!
//! Failures here are permanent: retrying the same order can never succeed.

use thiserror::Error;

use crate::catalog::{CatalogEntry, ProductType, VendorProductKey};
use crate::order::Order;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Product type {0} is not fulfilled by the print vendor")]
    NotPhysical(ProductType),

    #[error("Order has no shipping address")]
    MissingShippingAddress,

    #[error("Shipping address is missing: {}", .0.join(", "))]
    IncompleteAddress(Vec<&'static str>),

    #[error("Invalid country code: {0:?}")]
    InvalidCountry(String),

    #[error("Size {size} is not offered for {product_type} (available: {})", .available.join(", "))]
    UnsupportedSize {
        product_type: ProductType,
        size: String,
        available: Vec<&'static str>,
    },

    #[error("Customer contact is missing {0}")]
    MissingContact(&'static str),

    #[error("Asset URL must be http(s): {0:?}")]
    InvalidAssetUrl(String),

    #[error("Payment confirmation has no payment reference")]
    MissingPaymentReference,
}

/// Checks that `order` can be submitted to the vendor with `asset_url` as its
/// print file, returning the vendor product key it resolves to.
pub fn validate_for_vendor(
    order: &Order,
    asset_url: &str,
) -> Result<VendorProductKey, ValidationError> {
    if !order.product_type.requires_physical_fulfillment() {
        return Err(ValidationError::NotPhysical(order.product_type));
    }

    let address = order
        .shipping_address
        .as_ref()
        .ok_or(ValidationError::MissingShippingAddress)?;
    let missing = address.missing_fields();
    if !missing.is_empty() {
        return Err(ValidationError::IncompleteAddress(missing));
    }
    let country = address.country.trim();
    if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::InvalidCountry(address.country.clone()));
    }

    if order.contact.name.trim().is_empty() {
        return Err(ValidationError::MissingContact("name"));
    }
    if !order.contact.email.contains('@') {
        return Err(ValidationError::MissingContact("email"));
    }

    if !(asset_url.starts_with("https://") || asset_url.starts_with("http://")) {
        return Err(ValidationError::InvalidAssetUrl(asset_url.to_string()));
    }

    let key = order
        .vendor_product_key()
        .ok_or(ValidationError::MissingShippingAddress)?;
    if key.resolve().is_none() {
        let available = CatalogEntry::find(key.product_type, key.region)
            .map(|entry| entry.variants.iter().map(|v| v.size).collect())
            .unwrap_or_default();
        return Err(ValidationError::UnsupportedSize {
            product_type: key.product_type,
            size: key.size,
            available,
        });
    }

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Region;
    use crate::order::{CustomerContact, Money, ShippingAddress};

    const ASSET: &str = "https://cdn.example.com/art.png";

    fn order(product_type: ProductType, size: &str, country: &str) -> Order {
        Order::new(
            product_type,
            size,
            Money::from_cents(9999),
            "usd",
            CustomerContact {
                name: "Grace Hopper".to_string(),
                email: "grace@example.com".to_string(),
                phone: None,
            },
            Some(ShippingAddress {
                line1: "1 Navy Way".to_string(),
                city: "Arlington".to_string(),
                state: Some("VA".to_string()),
                postal_code: "22202".to_string(),
                country: country.to_string(),
                line2: None,
            }),
        )
    }

    #[test]
    fn valid_order_resolves_key() {
        let key = validate_for_vendor(&order(ProductType::FramedCanvas, "16x20", "US"), ASSET)
            .unwrap();
        assert_eq!(key.region, Region::Global);
    }

    #[test]
    fn digital_is_rejected() {
        assert_eq!(
            validate_for_vendor(&order(ProductType::Digital, "digital", "US"), ASSET),
            Err(ValidationError::NotPhysical(ProductType::Digital))
        );
    }

    #[test]
    fn size_must_exist_for_region() {
        let err =
            validate_for_vendor(&order(ProductType::ArtPrint, "20x24", "DE"), ASSET).unwrap_err();
        match err {
            ValidationError::UnsupportedSize { available, .. } => {
                assert_eq!(available, vec!["12x18", "16x20", "18x24"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn address_must_be_complete() {
        let mut o = order(ProductType::ArtPrint, "12x18", "US");
        o.shipping_address.as_mut().unwrap().postal_code.clear();
        assert_eq!(
            validate_for_vendor(&o, ASSET),
            Err(ValidationError::IncompleteAddress(vec!["postal_code"]))
        );

        o.shipping_address = None;
        assert_eq!(
            validate_for_vendor(&o, ASSET),
            Err(ValidationError::MissingShippingAddress)
        );
    }

    #[test]
    fn country_must_be_two_letters() {
        assert!(matches!(
            validate_for_vendor(&order(ProductType::ArtPrint, "12x18", "USA"), ASSET),
            Err(ValidationError::InvalidCountry(_))
        ));
    }

    #[test]
    fn asset_url_must_be_http() {
        assert!(matches!(
            validate_for_vendor(
                &order(ProductType::ArtPrint, "12x18", "US"),
                "ftp://files/art.png"
            ),
            Err(ValidationError::InvalidAssetUrl(_))
        ));
    }
}
