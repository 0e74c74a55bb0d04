use async_trait::async_trait;
use common::{ArtifactId, OrderId, ReviewId};
use domain::{
    Artifact, Order, OrderStatus, Review, ReviewOutcome, ReviewType, StatusHistoryEntry,
    VendorOrderRef, VendorProduct, VendorProductKey,
};

use crate::{Result, StoreError};

/// A change to an artifact's enhancement fields.
///
/// Applied through the artifact's own transition rules, so an enhanced URL can
/// only ever be stored together with the completed status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnhancementUpdate {
    Processing,
    Completed { enhanced_url: String },
    Failed,
    NotRequired,
}

impl EnhancementUpdate {
    pub(crate) fn apply(&self, artifact: &mut Artifact) -> domain::Result<()> {
        match self {
            EnhancementUpdate::Processing => artifact.mark_processing(),
            EnhancementUpdate::Completed { enhanced_url } => {
                artifact.mark_completed(enhanced_url.clone())
            }
            EnhancementUpdate::Failed => artifact.mark_failed(),
            EnhancementUpdate::NotRequired => artifact.mark_not_required(),
        }
    }
}

/// Outcome of inserting a review when one may already be pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewInsert {
    /// The review was stored as new.
    Created(Review),
    /// A pending review of the same type already existed and was returned instead.
    Existing(Review),
}

impl ReviewInsert {
    pub fn review(&self) -> &Review {
        match self {
            ReviewInsert::Created(review) | ReviewInsert::Existing(review) => review,
        }
    }

    pub fn into_review(self) -> Review {
        match self {
            ReviewInsert::Created(review) | ReviewInsert::Existing(review) => review,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, ReviewInsert::Created(_))
    }
}

/// Core trait for fulfillment persistence.
///
/// All implementations must be thread-safe (Send + Sync). Operations that
/// touch an order's status append the matching ledger entry atomically.
#[async_trait]
pub trait FulfillmentStore: Send + Sync {
    // --- artifacts ---

    /// Stores a new artifact. Fails with `AlreadyExists` on a duplicate id.
    async fn insert_artifact(&self, artifact: &Artifact) -> Result<()>;

    async fn get_artifact(&self, id: ArtifactId) -> Result<Option<Artifact>>;

    /// Applies an enhancement status change and returns the updated artifact.
    async fn update_enhancement(
        &self,
        id: ArtifactId,
        update: EnhancementUpdate,
    ) -> Result<Artifact>;

    // --- orders ---

    /// Stores a new order. Fails with `AlreadyExists` on a duplicate id or
    /// payment reference.
    async fn insert_order(&self, order: &Order) -> Result<()>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    async fn find_order_by_payment_reference(&self, reference: &str) -> Result<Option<Order>>;

    async fn find_order_by_vendor_order_id(&self, vendor_order_id: &str) -> Result<Option<Order>>;

    /// Back-fills the payment reference. A no-op if the payment is already confirmed.
    async fn confirm_payment(&self, id: OrderId, payment_reference: &str) -> Result<Order>;

    /// Links an artifact to an order that does not have one yet.
    async fn attach_artifact(&self, id: OrderId, artifact_id: ArtifactId) -> Result<Order>;

    /// Moves the order from `expected` to `next` and appends one transition entry.
    ///
    /// Fails with `StatusConflict` if the stored status is no longer `expected`.
    async fn transition_order(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
        note: &str,
    ) -> Result<Order>;

    /// Stores the vendor order on the order, moves it from `expected` to
    /// processing and appends one transition entry.
    async fn record_vendor_order(
        &self,
        id: OrderId,
        expected: OrderStatus,
        vendor_order: &VendorOrderRef,
        note: &str,
    ) -> Result<Order>;

    /// Stores the raw status last reported by the vendor.
    async fn update_vendor_status(&self, id: OrderId, vendor_status: &str) -> Result<Order>;

    /// Puts the order on hold with `reason`, or releases it with `None`.
    async fn set_hold(&self, id: OrderId, reason: Option<&str>) -> Result<Order>;

    /// Paid physical orders that have not reached the vendor yet, oldest first.
    async fn orders_awaiting_vendor(&self) -> Result<Vec<Order>>;

    // --- status ledger ---

    /// Appends an annotation entry. Transition entries are only written by
    /// the status-changing operations above.
    async fn append_history(&self, entry: StatusHistoryEntry) -> Result<StatusHistoryEntry>;

    /// All entries for an order ordered by (recorded_at, sequence).
    async fn history(&self, order_id: OrderId) -> Result<Vec<StatusHistoryEntry>>;

    // --- reviews ---

    /// Stores `review` unless a pending review of the same type exists for
    /// the artifact, in which case that one is returned.
    async fn insert_review_unless_pending(&self, review: &Review) -> Result<ReviewInsert>;

    async fn get_review(&self, id: ReviewId) -> Result<Option<Review>>;

    /// Decides a pending review. Deciding a decided review is a domain error.
    async fn decide_review(
        &self,
        id: ReviewId,
        outcome: ReviewOutcome,
        reviewer: &str,
        notes: Option<String>,
    ) -> Result<Review>;

    /// Reviews for an artifact, oldest first.
    async fn reviews_for_artifact(&self, artifact_id: ArtifactId) -> Result<Vec<Review>>;

    /// Pending reviews, oldest first, optionally restricted to one type.
    async fn pending_reviews(&self, review_type: Option<ReviewType>) -> Result<Vec<Review>>;

    // --- vendor product cache ---

    async fn get_vendor_product(&self, key: &VendorProductKey) -> Result<Option<VendorProduct>>;

    /// Stores a vendor product unless one already exists for its key.
    /// Returns whichever entry is stored after the call.
    async fn insert_vendor_product(&self, product: &VendorProduct) -> Result<VendorProduct>;
}

/// Convenience lookups that turn a missing record into `NotFound`.
#[async_trait]
pub trait FulfillmentStoreExt: FulfillmentStore {
    async fn require_order(&self, id: OrderId) -> Result<Order> {
        self.get_order(id)
            .await?
            .ok_or_else(|| StoreError::not_found("order", id))
    }

    async fn require_artifact(&self, id: ArtifactId) -> Result<Artifact> {
        self.get_artifact(id)
            .await?
            .ok_or_else(|| StoreError::not_found("artifact", id))
    }

    async fn require_review(&self, id: ReviewId) -> Result<Review> {
        self.get_review(id)
            .await?
            .ok_or_else(|| StoreError::not_found("review", id))
    }
}

impl<T: FulfillmentStore + ?Sized> FulfillmentStoreExt for T {}
