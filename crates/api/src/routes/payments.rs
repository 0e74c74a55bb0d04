//! Payment confirmation intake.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use fulfillment::{PaymentConfirmation, PaymentIntake};
use store::FulfillmentStore;

use crate::AppState;
use crate::error::ApiError;

/// POST /payments/confirmed: record a confirmed payment and drive its order.
///
/// Answers 201 when the order was created from the payment, 200 otherwise
/// (including replays of an already recorded confirmation).
#[tracing::instrument(skip(state, event), fields(payment_reference = %event.payment_reference))]
pub async fn confirmed<S: FulfillmentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(event): Json<PaymentConfirmation>,
) -> Result<(StatusCode, Json<PaymentIntake>), ApiError> {
    let intake = state.orchestrator.confirm_payment(event).await?;
    let status = if intake.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(intake)))
}
