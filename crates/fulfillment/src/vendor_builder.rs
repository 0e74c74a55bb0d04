//! Vendor product cache and vendor order submission.

use std::sync::Arc;

use chrono::Utc;
use domain::{
    CatalogEntry, Order, ShippingAddress, ValidationError, VendorOrderRef, VendorProduct,
    VendorProductKey, validate_for_vendor,
};
use resilience::{DependencyGuard, RequestDeduplicator};
use store::FulfillmentStore;
use tracing::{error, info};

use crate::config::FulfillmentConfig;
use crate::error::{FulfillmentError, Result};
use crate::services::{VendorApi, VendorOrderRequest, VendorProductRequest};

/// Sole writer of vendor products; produces the vendor order reference the
/// orchestrator stores on the order.
pub struct VendorBuilder<S> {
    store: Arc<S>,
    vendor: Arc<dyn VendorApi>,
    guard: DependencyGuard,
    dedup: RequestDeduplicator<Result<VendorProduct>>,
    order_dedup: RequestDeduplicator<Result<VendorOrderRef>>,
}

impl<S: FulfillmentStore> VendorBuilder<S> {
    pub fn new(store: Arc<S>, vendor: Arc<dyn VendorApi>, config: &FulfillmentConfig) -> Self {
        Self {
            store,
            vendor,
            guard: DependencyGuard::new("vendor", config.vendor),
            dedup: RequestDeduplicator::new("vendor"),
            order_dedup: RequestDeduplicator::new("vendor_order"),
        }
    }

    pub fn guard(&self) -> &DependencyGuard {
        &self.guard
    }

    /// Structural checks before anything is sent to the vendor.
    pub fn validate(&self, order: &Order, asset_url: &str) -> Result<VendorProductKey> {
        Ok(validate_for_vendor(order, asset_url)?)
    }

    /// Returns the cached vendor product for `key`, creating it on first use.
    ///
    /// Concurrent calls for one key create at most one vendor product.
    #[tracing::instrument(skip(self, image_url), fields(key = %key))]
    pub async fn get_or_create_vendor_product(
        &self,
        key: &VendorProductKey,
        image_url: &str,
    ) -> Result<VendorProduct> {
        if let Some(product) = self.store.get_vendor_product(key).await? {
            return Ok(product);
        }
        self.dedup
            .run(&key.cache_key(), || self.create_product(key, image_url))
            .await
    }

    async fn create_product(&self, key: &VendorProductKey, image_url: &str) -> Result<VendorProduct> {
        // Another leader may have stored it since the caller looked.
        if let Some(product) = self.store.get_vendor_product(key).await? {
            return Ok(product);
        }

        let variant = key
            .resolve()
            .ok_or_else(|| ValidationError::UnsupportedSize {
                product_type: key.product_type,
                size: key.size.clone(),
                available: CatalogEntry::sizes_for(key.product_type),
            })?;
        let request = VendorProductRequest {
            key: key.clone(),
            variant,
            title: format!("{} {}", key.product_type.display_name(), key.size),
            description: format!(
                "{} {}, fulfilled from {}",
                key.product_type.display_name(),
                key.size,
                key.region
            ),
            image_url: image_url.to_string(),
        };

        let created = self
            .guard
            .call(|| self.vendor.create_product(&request))
            .await
            .map_err(|e| FulfillmentError::from_dependency("vendor", e))?;

        let product = VendorProduct {
            key: key.clone(),
            vendor_product_id: created.vendor_product_id,
            vendor_variant_id: created.vendor_variant_id,
            created_at: Utc::now(),
        };
        let stored = self.store.insert_vendor_product(&product).await?;
        metrics::counter!("vendor_products_created_total").increment(1);
        info!(vendor_product_id = %stored.vendor_product_id, "Vendor product created");
        Ok(stored)
    }

    /// Places the vendor order for `order`.
    ///
    /// The order id goes to the vendor as its external reference, and an
    /// order already placed under that reference is returned instead of
    /// placing a second one. Concurrent calls for one order share a single
    /// submission.
    #[tracing::instrument(skip(self, order, product), fields(order_id = %order.id))]
    pub async fn submit_vendor_order(
        &self,
        order: &Order,
        asset_url: &str,
        product: &VendorProduct,
    ) -> Result<VendorOrderRef> {
        self.validate(order, asset_url)?;
        let address = order
            .shipping_address
            .clone()
            .ok_or(ValidationError::MissingShippingAddress)?;
        let external_id = order.id.to_string();

        self.order_dedup
            .run(&external_id, || {
                self.place_order(order, external_id.clone(), address, asset_url, product)
            })
            .await
    }

    async fn place_order(
        &self,
        order: &Order,
        external_id: String,
        address: ShippingAddress,
        asset_url: &str,
        product: &VendorProduct,
    ) -> Result<VendorOrderRef> {
        let existing = self
            .guard
            .call(|| self.vendor.find_order_by_external_id(&external_id))
            .await
            .map_err(|e| FulfillmentError::from_dependency("vendor", e))?;
        if let Some(vendor_order) = existing {
            info!(vendor_order_id = %vendor_order.vendor_order_id, "Vendor already has this order");
            return Ok(vendor_order);
        }

        let request = VendorOrderRequest {
            label: format!("Order {external_id}"),
            external_id,
            vendor_product_id: product.vendor_product_id.clone(),
            vendor_variant_id: product.vendor_variant_id,
            image_url: asset_url.to_string(),
            contact: order.contact.clone(),
            address,
        };
        match self
            .guard
            .call(|| self.vendor.create_order(&request))
            .await
            .map_err(|e| FulfillmentError::from_dependency("vendor", e))
        {
            Ok(vendor_order) => {
                metrics::counter!("vendor_orders_created_total").increment(1);
                info!(vendor_order_id = %vendor_order.vendor_order_id, "Vendor order created");
                Ok(vendor_order)
            }
            Err(e) => {
                metrics::counter!("vendor_order_failures_total").increment(1);
                error!(error = %e, kind = %e.kind(), "Vendor order submission failed");
                Err(e)
            }
        }
    }
}
