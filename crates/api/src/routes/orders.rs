//! Order queries, drive trigger and administrative actions.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::OrderId;
use domain::{CustomerStatus, Order};
use fulfillment::{DriveOutcome, DriveReport};
use ledger::OrderTimeline;
use serde::{Deserialize, Serialize};
use store::{FulfillmentStore, FulfillmentStoreExt};

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct OrderResponse {
    #[serde(flatten)]
    pub order: Order,
    pub customer_status: CustomerStatus,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            customer_status: order.status.customer_status(),
            order,
        }
    }
}

#[derive(Deserialize)]
pub struct ReasonRequest {
    pub reason: String,
}

#[derive(Serialize)]
pub struct SweepResponse {
    pub driven: usize,
    pub failed: usize,
    pub reports: Vec<DriveReport>,
}

/// GET /orders/{id}: current order record.
#[tracing::instrument(skip(state))]
pub async fn get<S: FulfillmentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id("order", &id)?;
    let order = state
        .orchestrator
        .store()
        .get_order(order_id)
        .await
        .map_err(|e| ApiError::Fulfillment(e.into()))?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;
    Ok(Json(order.into()))
}

/// GET /orders/{id}/history: the order's status ledger.
#[tracing::instrument(skip(state))]
pub async fn history<S: FulfillmentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderTimeline>, ApiError> {
    let order_id: OrderId = parse_id("order", &id)?;
    state
        .orchestrator
        .store()
        .require_order(order_id)
        .await
        .map_err(|e| ApiError::Fulfillment(e.into()))?;
    let timeline = state
        .orchestrator
        .ledger()
        .timeline(order_id)
        .await
        .map_err(|e| ApiError::Fulfillment(e.into()))?;
    Ok(Json(timeline))
}

/// POST /orders/{id}/drive: perform the order's next pipeline step.
#[tracing::instrument(skip(state))]
pub async fn drive<S: FulfillmentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<DriveOutcome>, ApiError> {
    let order_id: OrderId = parse_id("order", &id)?;
    Ok(Json(state.orchestrator.drive(order_id).await?))
}

/// POST /orders/{id}/cancel: cancel an order the vendor has not received.
#[tracing::instrument(skip(state, req))]
pub async fn cancel<S: FulfillmentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<ReasonRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id("order", &id)?;
    let order = state.orchestrator.cancel_order(order_id, &req.reason).await?;
    Ok(Json(order.into()))
}

/// POST /orders/{id}/fail: an operator gives up on the order.
#[tracing::instrument(skip(state, req))]
pub async fn fail<S: FulfillmentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<ReasonRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id("order", &id)?;
    let order = state.orchestrator.mark_failed(order_id, &req.reason).await?;
    Ok(Json(order.into()))
}

/// POST /orders/{id}/release: clear an operator hold and drive the order.
#[tracing::instrument(skip(state, req))]
pub async fn release<S: FulfillmentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<ReasonRequest>,
) -> Result<Json<DriveOutcome>, ApiError> {
    let order_id: OrderId = parse_id("order", &id)?;
    Ok(Json(state.orchestrator.release_hold(order_id, &req.reason).await?))
}

/// POST /orders/retry-sweep: drive every paid order still waiting for the vendor.
#[tracing::instrument(skip(state))]
pub async fn retry_sweep<S: FulfillmentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<SweepResponse>, ApiError> {
    let reports = state.orchestrator.retry_sweep().await?;
    Ok(Json(SweepResponse {
        driven: reports.len(),
        failed: reports.iter().filter(|r| !r.is_ok()).count(),
        reports,
    }))
}
