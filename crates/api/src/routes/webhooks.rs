//! Print vendor status webhook.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use store::FulfillmentStore;

use super::orders::OrderResponse;
use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct VendorStatusEvent {
    #[serde(alias = "id")]
    pub vendor_order_id: String,
    pub status: String,
}

/// POST /webhooks/vendor: apply a status reported by the print vendor.
#[tracing::instrument(skip(state, event), fields(vendor_order_id = %event.vendor_order_id, status = %event.status))]
pub async fn vendor<S: FulfillmentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(event): Json<VendorStatusEvent>,
) -> Result<Json<OrderResponse>, ApiError> {
    if event.status.trim().is_empty() {
        return Err(ApiError::BadRequest("status is required".to_string()));
    }
    let order = state
        .orchestrator
        .apply_vendor_status(&event.vendor_order_id, &event.status)
        .await?;
    Ok(Json(order.into()))
}
