//! Print-on-demand vendor API.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use domain::{CustomerContact, ResolvedVariant, ShippingAddress, VendorOrderRef, VendorProductKey};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{ServiceError, check_status};

/// Everything needed to create the vendor-side product for one catalog key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorProductRequest {
    pub key: VendorProductKey,
    pub variant: ResolvedVariant,
    pub title: String,
    pub description: String,
    /// Print file placed on the product template.
    pub image_url: String,
}

impl VendorProductRequest {
    /// JSON body for the vendor's create-product endpoint.
    pub fn to_payload(&self) -> Value {
        json!({
            "title": self.title,
            "description": self.description,
            "blueprint_id": self.variant.blueprint_id,
            "print_provider_id": self.variant.print_provider_id,
            "variants": [{
                "id": self.variant.variant_id,
                "price": self.variant.price_cents,
                "is_enabled": true,
            }],
            "print_areas": [{
                "variant_ids": [self.variant.variant_id],
                "placeholders": [{
                    "position": "front",
                    "images": [{
                        "id": self.image_url,
                        "x": 0.5,
                        "y": 0.5,
                        "scale": 1.0,
                        "angle": 0,
                    }],
                }],
            }],
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedProduct {
    pub vendor_product_id: String,
    pub vendor_variant_id: u64,
}

/// A vendor order for one print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorOrderRequest {
    /// Our order id, echoed back by the vendor for reconciliation.
    pub external_id: String,
    pub label: String,
    pub vendor_product_id: String,
    pub vendor_variant_id: u64,
    pub image_url: String,
    pub contact: CustomerContact,
    pub address: ShippingAddress,
}

#[derive(Debug, Serialize)]
struct AddressTo<'a> {
    first_name: String,
    last_name: String,
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<&'a str>,
    country: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    region: Option<&'a str>,
    address1: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    address2: Option<&'a str>,
    city: &'a str,
    zip: &'a str,
}

impl VendorOrderRequest {
    /// JSON body for the vendor's create-order endpoint.
    pub fn to_payload(&self) -> Value {
        let (first_name, last_name) = self.contact.split_name();
        let address = &self.address;
        let address_to = AddressTo {
            first_name,
            last_name,
            email: &self.contact.email,
            phone: self.contact.phone.as_deref(),
            country: address.country.trim().to_ascii_uppercase(),
            region: address.state.as_deref(),
            address1: &address.line1,
            address2: address.line2.as_deref(),
            city: &address.city,
            zip: &address.postal_code,
        };
        json!({
            "external_id": self.external_id,
            "label": self.label,
            "line_items": [{
                "product_id": self.vendor_product_id,
                "variant_id": self.vendor_variant_id,
                "quantity": 1,
                "print_areas": { "front": self.image_url },
            }],
            "shipping_method": 1,
            "send_shipping_notification": true,
            "address_to": address_to,
        })
    }
}

/// Trait for the print vendor's product and order endpoints.
#[async_trait]
pub trait VendorApi: Send + Sync {
    async fn create_product(
        &self,
        request: &VendorProductRequest,
    ) -> Result<CreatedProduct, ServiceError>;

    async fn create_order(&self, request: &VendorOrderRequest)
    -> Result<VendorOrderRef, ServiceError>;

    /// Looks up an order previously submitted with `external_id`.
    async fn find_order_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<VendorOrderRef>, ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryVendorState {
    products: Vec<VendorProductRequest>,
    /// Every order placed, duplicates included.
    orders: Vec<(VendorOrderRequest, VendorOrderRef)>,
    create_order_calls: usize,
    next_id: u32,
    fail_on_create_product: bool,
    fail_on_create_order: bool,
    reject_orders: bool,
    lose_order_response: bool,
    product_delay: Option<Duration>,
    order_delay: Option<Duration>,
}

/// In-memory vendor for testing.
///
/// Like a real vendor, `create_order` places a new order on every call;
/// only `find_order_by_external_id` knows about earlier ones.
#[derive(Debug, Clone, Default)]
pub struct InMemoryVendorApi {
    state: Arc<RwLock<InMemoryVendorState>>,
}

impl InMemoryVendorApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_create_product(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create_product = fail;
    }

    pub fn set_fail_on_create_order(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create_order = fail;
    }

    /// Refuses every order with a client error, as for a bad address.
    pub fn set_reject_orders(&self, reject: bool) {
        self.state.write().unwrap().reject_orders = reject;
    }

    /// Accepts orders but fails the call as if the response was lost in transit.
    pub fn set_lose_order_response(&self, lose: bool) {
        self.state.write().unwrap().lose_order_response = lose;
    }

    /// Makes product creation take `delay`, to widen race windows in tests.
    pub fn set_product_delay(&self, delay: Duration) {
        self.state.write().unwrap().product_delay = Some(delay);
    }

    /// Makes order creation take `delay` before the order is placed.
    pub fn set_order_delay(&self, delay: Duration) {
        self.state.write().unwrap().order_delay = Some(delay);
    }

    pub fn product_count(&self) -> usize {
        self.state.read().unwrap().products.len()
    }

    /// Number of orders placed, duplicates included.
    pub fn order_count(&self) -> usize {
        self.state.read().unwrap().orders.len()
    }

    /// Number of `create_order` calls that reached the vendor, failed ones included.
    pub fn create_order_calls(&self) -> usize {
        self.state.read().unwrap().create_order_calls
    }

    /// The first order placed under `external_id`.
    pub fn order(&self, external_id: &str) -> Option<VendorOrderRequest> {
        self.state
            .read()
            .unwrap()
            .orders
            .iter()
            .find(|(request, _)| request.external_id == external_id)
            .map(|(request, _)| request.clone())
    }
}

#[async_trait]
impl VendorApi for InMemoryVendorApi {
    async fn create_product(
        &self,
        request: &VendorProductRequest,
    ) -> Result<CreatedProduct, ServiceError> {
        let delay = self.state.read().unwrap().product_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().unwrap();
        if state.fail_on_create_product {
            return Err(ServiceError::Unavailable("vendor catalog offline".to_string()));
        }
        state.next_id += 1;
        let vendor_product_id = format!("PROD-{:04}", state.next_id);
        state.products.push(request.clone());
        Ok(CreatedProduct {
            vendor_product_id,
            vendor_variant_id: request.variant.variant_id,
        })
    }

    async fn create_order(
        &self,
        request: &VendorOrderRequest,
    ) -> Result<VendorOrderRef, ServiceError> {
        let delay = {
            let mut state = self.state.write().unwrap();
            state.create_order_calls += 1;
            if state.fail_on_create_order {
                return Err(ServiceError::Unavailable("vendor orders offline".to_string()));
            }
            if state.reject_orders {
                return Err(ServiceError::Status {
                    status: 422,
                    message: "address_to.zip is invalid".to_string(),
                });
            }
            state.order_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().unwrap();
        state.next_id += 1;
        let vendor_order = VendorOrderRef {
            vendor_order_id: format!("VO-{:04}", state.next_id),
            status: "pending".to_string(),
        };
        state.orders.push((request.clone(), vendor_order.clone()));
        if state.lose_order_response {
            return Err(ServiceError::Transport("connection reset".to_string()));
        }
        Ok(vendor_order)
    }

    async fn find_order_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<VendorOrderRef>, ServiceError> {
        let state = self.state.read().unwrap();
        if state.fail_on_create_order {
            return Err(ServiceError::Unavailable("vendor orders offline".to_string()));
        }
        Ok(state
            .orders
            .iter()
            .find(|(request, _)| request.external_id == external_id)
            .map(|(_, r)| r.clone()))
    }
}

#[derive(Debug, Deserialize)]
struct ProductResponse {
    id: String,
    #[serde(default)]
    variants: Vec<ProductVariant>,
}

#[derive(Debug, Deserialize)]
struct ProductVariant {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    external_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderPage {
    #[serde(default)]
    data: Vec<OrderResponse>,
    #[serde(default)]
    current_page: u32,
    #[serde(default)]
    last_page: u32,
}

/// Client for a Printify-style REST API scoped to one shop.
#[derive(Debug, Clone)]
pub struct HttpVendorApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
    shop_id: String,
}

impl HttpVendorApi {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        token: impl Into<String>,
        shop_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            shop_id: shop_id.into(),
        }
    }

    fn shop_url(&self, path: &str) -> String {
        format!("{}/shops/{}/{path}", self.base_url, self.shop_id)
    }
}

fn order_ref(response: OrderResponse) -> VendorOrderRef {
    VendorOrderRef {
        vendor_order_id: response.id,
        status: response.status.unwrap_or_else(|| "pending".to_string()),
    }
}

#[async_trait]
impl VendorApi for HttpVendorApi {
    #[tracing::instrument(skip(self, request), fields(key = %request.key))]
    async fn create_product(
        &self,
        request: &VendorProductRequest,
    ) -> Result<CreatedProduct, ServiceError> {
        let response = self
            .client
            .post(self.shop_url("products.json"))
            .bearer_auth(&self.token)
            .json(&request.to_payload())
            .send()
            .await?;
        let body: ProductResponse = check_status(response).await?.json().await?;
        let vendor_variant_id = body
            .variants
            .iter()
            .map(|v| v.id)
            .find(|id| *id == request.variant.variant_id)
            .unwrap_or(request.variant.variant_id);
        Ok(CreatedProduct {
            vendor_product_id: body.id,
            vendor_variant_id,
        })
    }

    #[tracing::instrument(skip(self, request), fields(external_id = %request.external_id))]
    async fn create_order(
        &self,
        request: &VendorOrderRequest,
    ) -> Result<VendorOrderRef, ServiceError> {
        let response = self
            .client
            .post(self.shop_url("orders.json"))
            .bearer_auth(&self.token)
            .json(&request.to_payload())
            .send()
            .await?;
        let body: OrderResponse = check_status(response).await?.json().await?;
        Ok(order_ref(body))
    }

    /// Walks every page of the shop's orders.
    #[tracing::instrument(skip(self))]
    async fn find_order_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<VendorOrderRef>, ServiceError> {
        let mut page_number = 1;
        loop {
            let response = self
                .client
                .get(self.shop_url("orders.json"))
                .bearer_auth(&self.token)
                .query(&[("page", page_number)])
                .send()
                .await?;
            let page: OrderPage = check_status(response).await?.json().await?;
            if let Some(found) = page
                .data
                .into_iter()
                .find(|o| o.external_id.as_deref() == Some(external_id))
            {
                return Ok(Some(order_ref(found)));
            }
            let current = page.current_page.max(page_number);
            if current >= page.last_page {
                return Ok(None);
            }
            page_number = current + 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use domain::{ProductType, Region};

    use super::*;

    fn order_request() -> VendorOrderRequest {
        VendorOrderRequest {
            external_id: "order-1".to_string(),
            label: "Order order-1".to_string(),
            vendor_product_id: "PROD-1".to_string(),
            vendor_variant_id: 92396,
            image_url: "https://cdn.example.com/a.png".to_string(),
            contact: CustomerContact {
                name: "Ada King Lovelace".to_string(),
                email: "ada@example.com".to_string(),
                phone: None,
            },
            address: ShippingAddress {
                line1: "1 Main St".to_string(),
                city: "Springfield".to_string(),
                state: Some("IL".to_string()),
                postal_code: "62701".to_string(),
                country: "us".to_string(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_order_payload_shape() {
        let payload = order_request().to_payload();
        assert_eq!(payload["external_id"], "order-1");
        assert_eq!(payload["line_items"][0]["quantity"], 1);
        assert_eq!(
            payload["line_items"][0]["print_areas"]["front"],
            "https://cdn.example.com/a.png"
        );
        assert_eq!(payload["shipping_method"], 1);
        let address = &payload["address_to"];
        assert_eq!(address["first_name"], "Ada");
        assert_eq!(address["last_name"], "King Lovelace");
        assert_eq!(address["country"], "US");
        assert_eq!(address["region"], "IL");
        assert!(address.get("address2").is_none());
        assert!(address.get("phone").is_none());
    }

    #[test]
    fn test_product_payload_shape() {
        let key = VendorProductKey::new(ProductType::ArtPrint, "12x18", Region::NorthAmerica);
        let variant = key.resolve().unwrap();
        let request = VendorProductRequest {
            key,
            variant,
            title: "Art Print 12x18".to_string(),
            description: String::new(),
            image_url: "https://cdn.example.com/a.png".to_string(),
        };
        let payload = request.to_payload();
        assert_eq!(payload["blueprint_id"], variant.blueprint_id);
        assert_eq!(payload["variants"][0]["id"], variant.variant_id);
        assert_eq!(
            payload["print_areas"][0]["placeholders"][0]["position"],
            "front"
        );
    }

    #[tokio::test]
    async fn test_every_create_places_an_order() {
        let vendor = InMemoryVendorApi::new();
        let first = vendor.create_order(&order_request()).await.unwrap();
        let second = vendor.create_order(&order_request()).await.unwrap();

        assert_ne!(first.vendor_order_id, second.vendor_order_id);
        assert_eq!(vendor.order_count(), 2);
        assert_eq!(vendor.create_order_calls(), 2);
        let found = vendor.find_order_by_external_id("order-1").await.unwrap();
        assert_eq!(found, Some(first));
    }

    #[derive(Deserialize)]
    struct PageQuery {
        page: u32,
    }

    async fn paged_orders(axum::extract::Query(query): axum::extract::Query<PageQuery>) -> axum::Json<Value> {
        let data = if query.page == 3 {
            json!([{ "id": "VO-77", "status": "in-production", "external_id": "order-1" }])
        } else {
            json!([{ "id": format!("VO-{}", query.page), "external_id": "someone-else" }])
        };
        axum::Json(json!({ "current_page": query.page, "last_page": 3, "data": data }))
    }

    #[tokio::test]
    async fn test_lookup_follows_pagination() {
        let app = axum::Router::new().route("/shops/{shop}/orders.json", axum::routing::get(paged_orders));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let api = HttpVendorApi::new(reqwest::Client::new(), format!("http://{addr}"), "token", "42");
        let found = api.find_order_by_external_id("order-1").await.unwrap().unwrap();
        assert_eq!(found.vendor_order_id, "VO-77");
        assert_eq!(found.status, "in-production");
        assert!(api.find_order_by_external_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lost_response_is_findable() {
        let vendor = InMemoryVendorApi::new();
        vendor.set_lose_order_response(true);
        assert!(vendor.create_order(&order_request()).await.is_err());

        let found = vendor.find_order_by_external_id("order-1").await.unwrap();
        assert!(found.is_some());
        assert_eq!(vendor.order_count(), 1);
    }
}
