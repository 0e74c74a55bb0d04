//! Moderation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{ArtifactId, ReviewId};
use domain::{Review, ReviewOutcome, ReviewType};
use fulfillment::ReviewDecision;
use serde::{Deserialize, Serialize};
use store::FulfillmentStore;

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct PendingQuery {
    pub review_type: Option<ReviewType>,
}

#[derive(Deserialize)]
pub struct DecisionRequest {
    pub outcome: ReviewOutcome,
    pub reviewer: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct ReviewRequest {
    pub review_type: ReviewType,
}

#[derive(Serialize)]
pub struct ReviewRequested {
    pub review_id: ReviewId,
}

/// GET /reviews/pending: reviews waiting for a moderator, oldest first.
#[tracing::instrument(skip(state, query))]
pub async fn pending<S: FulfillmentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<PendingQuery>,
) -> Result<Json<Vec<Review>>, ApiError> {
    let reviews = state
        .orchestrator
        .review_gate()
        .pending_reviews(query.review_type)
        .await?;
    Ok(Json(reviews))
}

#[tracing::instrument(skip(state))]
pub async fn get<S: FulfillmentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Review>, ApiError> {
    let review_id: ReviewId = parse_id("review", &id)?;
    Ok(Json(state.orchestrator.review_gate().get(review_id).await?))
}

/// POST /reviews/{id}/decision: approve or reject, then resume waiting orders.
#[tracing::instrument(skip(state, req))]
pub async fn decide<S: FulfillmentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<ReviewDecision>, ApiError> {
    let review_id: ReviewId = parse_id("review", &id)?;
    if req.reviewer.trim().is_empty() {
        return Err(ApiError::BadRequest("reviewer is required".to_string()));
    }
    let decision = state
        .orchestrator
        .decide_review(review_id, req.outcome, req.reviewer.trim(), req.notes)
        .await?;
    Ok(Json(decision))
}

#[tracing::instrument(skip(state))]
pub async fn for_artifact<S: FulfillmentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Review>>, ApiError> {
    let artifact_id: ArtifactId = parse_id("artifact", &id)?;
    let reviews = state
        .orchestrator
        .review_gate()
        .reviews_for_artifact(artifact_id)
        .await?;
    Ok(Json(reviews))
}

/// POST /artifacts/{id}/reviews: request a review, reusing a pending one.
#[tracing::instrument(skip(state, req))]
pub async fn request<S: FulfillmentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<ReviewRequest>,
) -> Result<(StatusCode, Json<ReviewRequested>), ApiError> {
    let artifact_id: ArtifactId = parse_id("artifact", &id)?;
    let review_id = state
        .orchestrator
        .review_gate()
        .request_review(artifact_id, req.review_type)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(ReviewRequested { review_id })))
}
