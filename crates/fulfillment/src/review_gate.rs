//! Human moderation gate.
//!
//! A review goes `pending -> approved` or `pending -> rejected` and never
//! moves again. The gate knows nothing about orders: advancing an order
//! after approval is the orchestrator's job.

use std::sync::Arc;

use common::{ArtifactId, ReviewId};
use domain::{Review, ReviewOutcome, ReviewStatus, ReviewType};
use serde::Serialize;
use store::{FulfillmentStore, FulfillmentStoreExt};
use tracing::{info, warn};

use crate::Result;
use crate::services::{Notification, Notifier};

/// Where an artifact stands for one review type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "review_id", rename_all = "snake_case")]
pub enum ReviewState {
    NotRequested,
    Pending(ReviewId),
    Approved(ReviewId),
    /// The latest review was rejected and none is pending.
    Rejected(ReviewId),
}

pub struct ReviewGate<S> {
    store: Arc<S>,
    notifier: Arc<dyn Notifier>,
}

impl<S: FulfillmentStore> ReviewGate<S> {
    pub fn new(store: Arc<S>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Returns the pending review of this type for the artifact, creating one
    /// (and notifying a reviewer) if none is pending.
    #[tracing::instrument(skip(self))]
    pub async fn request_review(
        &self,
        artifact_id: ArtifactId,
        review_type: ReviewType,
    ) -> Result<ReviewId> {
        self.store.require_artifact(artifact_id).await?;

        let inserted = self
            .store
            .insert_review_unless_pending(&Review::new(artifact_id, review_type))
            .await?;
        let review_id = inserted.review().id;
        if !inserted.was_created() {
            return Ok(review_id);
        }

        metrics::counter!("reviews_requested_total").increment(1);
        info!(%review_id, "Review requested");
        let notification = Notification::ReviewRequested {
            review_id,
            artifact_id,
            review_type,
        };
        if let Err(e) = self.notifier.notify(notification).await {
            warn!(%review_id, error = %e, "Reviewer notification failed");
        }
        Ok(review_id)
    }

    /// Records a moderator decision. Fails with `AlreadyDecided` unless the
    /// review is pending.
    #[tracing::instrument(skip(self, notes))]
    pub async fn decide(
        &self,
        review_id: ReviewId,
        outcome: ReviewOutcome,
        reviewer: &str,
        notes: Option<String>,
    ) -> Result<Review> {
        let review = self
            .store
            .decide_review(review_id, outcome, reviewer, notes)
            .await?;
        metrics::counter!("reviews_decided_total", "outcome" => review.status.as_str())
            .increment(1);
        info!(status = %review.status, "Review decided");
        Ok(review)
    }

    pub async fn get(&self, review_id: ReviewId) -> Result<Review> {
        Ok(self.store.require_review(review_id).await?)
    }

    pub async fn pending_reviews(&self, review_type: Option<ReviewType>) -> Result<Vec<Review>> {
        Ok(self.store.pending_reviews(review_type).await?)
    }

    pub async fn reviews_for_artifact(&self, artifact_id: ArtifactId) -> Result<Vec<Review>> {
        Ok(self.store.reviews_for_artifact(artifact_id).await?)
    }

    /// Any approval wins; otherwise a pending review; otherwise the most
    /// recent rejection.
    pub async fn state(&self, artifact_id: ArtifactId, review_type: ReviewType) -> Result<ReviewState> {
        let reviews = self.store.reviews_for_artifact(artifact_id).await?;
        let of_type = || reviews.iter().filter(move |r| r.review_type == review_type);

        if let Some(review) = of_type().find(|r| r.status == ReviewStatus::Approved) {
            return Ok(ReviewState::Approved(review.id));
        }
        if let Some(review) = of_type().find(|r| r.status.is_pending()) {
            return Ok(ReviewState::Pending(review.id));
        }
        Ok(of_type()
            .max_by_key(|r| (r.decided_at, r.created_at))
            .map_or(ReviewState::NotRequested, |r| ReviewState::Rejected(r.id)))
    }
}
