use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{ArtifactId, OrderId, ReviewId};
use domain::{
    Artifact, EntryKind, Order, OrderStatus, Review, ReviewOutcome, ReviewType,
    StatusHistoryEntry, VendorOrderRef, VendorProduct, VendorProductKey,
};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    store::{EnhancementUpdate, FulfillmentStore, ReviewInsert},
};

#[derive(Default)]
struct State {
    artifacts: HashMap<ArtifactId, Artifact>,
    orders: HashMap<OrderId, Order>,
    reviews: HashMap<ReviewId, Review>,
    vendor_products: HashMap<VendorProductKey, VendorProduct>,
    history: Vec<StatusHistoryEntry>,
    next_sequence: i64,
}

impl State {
    fn push_history(&mut self, mut entry: StatusHistoryEntry) -> StatusHistoryEntry {
        self.next_sequence += 1;
        entry.sequence = self.next_sequence;
        entry.recorded_at = Utc::now();
        self.history.push(entry.clone());
        entry
    }

    fn order_mut(&mut self, id: OrderId) -> Result<&mut Order> {
        self.orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("order", id))
    }
}

/// In-memory fulfillment store for testing and single-process deployments.
///
/// All collections sit behind one lock so that a status change and its
/// ledger entry are applied together, like a database transaction.
#[derive(Clone, Default)]
pub struct InMemoryFulfillmentStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryFulfillmentStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of cached vendor products.
    pub async fn vendor_product_count(&self) -> usize {
        self.state.read().await.vendor_products.len()
    }

    /// Returns the total number of ledger entries across all orders.
    pub async fn history_len(&self) -> usize {
        self.state.read().await.history.len()
    }

    /// Clears all records.
    pub async fn clear(&self) {
        *self.state.write().await = State::default();
    }
}

fn sorted_by_created<T, K: Ord>(mut items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    items.sort_by_key(|item| key(item));
    items
}

#[async_trait]
impl FulfillmentStore for InMemoryFulfillmentStore {
    async fn insert_artifact(&self, artifact: &Artifact) -> Result<()> {
        let mut state = self.state.write().await;
        if state.artifacts.contains_key(&artifact.id) {
            return Err(StoreError::already_exists("artifact", artifact.id));
        }
        state.artifacts.insert(artifact.id, artifact.clone());
        Ok(())
    }

    async fn get_artifact(&self, id: ArtifactId) -> Result<Option<Artifact>> {
        Ok(self.state.read().await.artifacts.get(&id).cloned())
    }

    async fn update_enhancement(
        &self,
        id: ArtifactId,
        update: EnhancementUpdate,
    ) -> Result<Artifact> {
        let mut state = self.state.write().await;
        let artifact = state
            .artifacts
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("artifact", id))?;

        // Apply to a copy so a rejected change leaves the stored record untouched.
        let mut updated = artifact.clone();
        update.apply(&mut updated)?;
        *artifact = updated.clone();
        Ok(updated)
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut state = self.state.write().await;
        if state.orders.contains_key(&order.id) {
            return Err(StoreError::already_exists("order", order.id));
        }
        if state
            .orders
            .values()
            .any(|o| o.payment_reference == order.payment_reference)
        {
            return Err(StoreError::already_exists(
                "payment reference",
                &order.payment_reference,
            ));
        }
        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn find_order_by_payment_reference(&self, reference: &str) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .find(|o| o.payment_reference == reference)
            .cloned())
    }

    async fn find_order_by_vendor_order_id(&self, vendor_order_id: &str) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .find(|o| o.vendor_order_id.as_deref() == Some(vendor_order_id))
            .cloned())
    }

    async fn confirm_payment(&self, id: OrderId, payment_reference: &str) -> Result<Order> {
        let mut state = self.state.write().await;
        let taken = state
            .orders
            .values()
            .any(|o| o.id != id && o.payment_reference == payment_reference);
        let order = state.order_mut(id)?;
        if taken && !order.is_payment_confirmed() {
            return Err(StoreError::already_exists("payment reference", payment_reference));
        }
        order.confirm_payment(payment_reference);
        Ok(order.clone())
    }

    async fn attach_artifact(&self, id: OrderId, artifact_id: ArtifactId) -> Result<Order> {
        let mut state = self.state.write().await;
        if !state.artifacts.contains_key(&artifact_id) {
            return Err(StoreError::not_found("artifact", artifact_id));
        }
        let order = state.order_mut(id)?;
        match order.artifact_id {
            Some(existing) if existing != artifact_id => {
                Err(StoreError::already_exists("order artifact", existing))
            }
            _ => {
                order.artifact_id = Some(artifact_id);
                order.updated_at = Utc::now();
                Ok(order.clone())
            }
        }
    }

    async fn transition_order(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
        note: &str,
    ) -> Result<Order> {
        let mut state = self.state.write().await;
        let order = state.order_mut(id)?;
        if order.status != expected {
            return Err(StoreError::StatusConflict {
                order_id: id,
                expected,
                actual: order.status,
            });
        }
        order.transition_to(next)?;
        let updated = order.clone();
        state.push_history(StatusHistoryEntry::transition(id, next, note));
        Ok(updated)
    }

    async fn record_vendor_order(
        &self,
        id: OrderId,
        expected: OrderStatus,
        vendor_order: &VendorOrderRef,
        note: &str,
    ) -> Result<Order> {
        let mut state = self.state.write().await;
        let order = state.order_mut(id)?;
        if order.status != expected {
            return Err(StoreError::StatusConflict {
                order_id: id,
                expected,
                actual: order.status,
            });
        }
        if let Some(existing) = &order.vendor_order_id {
            return Err(StoreError::already_exists("vendor order", existing));
        }
        order.attach_vendor_order(vendor_order)?;
        let updated = order.clone();
        state.push_history(StatusHistoryEntry::transition(
            id,
            OrderStatus::Processing,
            note,
        ));
        Ok(updated)
    }

    async fn update_vendor_status(&self, id: OrderId, vendor_status: &str) -> Result<Order> {
        let mut state = self.state.write().await;
        let order = state.order_mut(id)?;
        order.vendor_order_status = Some(vendor_status.to_string());
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn set_hold(&self, id: OrderId, reason: Option<&str>) -> Result<Order> {
        let mut state = self.state.write().await;
        let order = state.order_mut(id)?;
        order.hold_reason = reason.map(str::to_string);
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn orders_awaiting_vendor(&self) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let orders = state
            .orders
            .values()
            .filter(|o| o.is_payment_confirmed() && o.awaits_vendor_submission())
            .cloned()
            .collect();
        Ok(sorted_by_created(orders, |o: &Order| o.created_at))
    }

    async fn append_history(&self, entry: StatusHistoryEntry) -> Result<StatusHistoryEntry> {
        let mut state = self.state.write().await;
        if !state.orders.contains_key(&entry.order_id) {
            return Err(StoreError::not_found("order", entry.order_id));
        }
        let entry = StatusHistoryEntry {
            kind: EntryKind::Annotation,
            ..entry
        };
        Ok(state.push_history(entry))
    }

    async fn history(&self, order_id: OrderId) -> Result<Vec<StatusHistoryEntry>> {
        let state = self.state.read().await;
        let mut entries: Vec<_> = state
            .history
            .iter()
            .filter(|e| e.order_id == order_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| (e.recorded_at, e.sequence));
        Ok(entries)
    }

    async fn insert_review_unless_pending(&self, review: &Review) -> Result<ReviewInsert> {
        let mut state = self.state.write().await;
        let existing = state
            .reviews
            .values()
            .filter(|r| {
                r.artifact_id == review.artifact_id
                    && r.review_type == review.review_type
                    && r.status.is_pending()
            })
            .min_by_key(|r| r.created_at)
            .cloned();
        if let Some(existing) = existing {
            return Ok(ReviewInsert::Existing(existing));
        }
        if state.reviews.contains_key(&review.id) {
            return Err(StoreError::already_exists("review", review.id));
        }
        state.reviews.insert(review.id, review.clone());
        Ok(ReviewInsert::Created(review.clone()))
    }

    async fn get_review(&self, id: ReviewId) -> Result<Option<Review>> {
        Ok(self.state.read().await.reviews.get(&id).cloned())
    }

    async fn decide_review(
        &self,
        id: ReviewId,
        outcome: ReviewOutcome,
        reviewer: &str,
        notes: Option<String>,
    ) -> Result<Review> {
        let mut state = self.state.write().await;
        let review = state
            .reviews
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("review", id))?;
        review.decide(outcome, reviewer, notes)?;
        Ok(review.clone())
    }

    async fn reviews_for_artifact(&self, artifact_id: ArtifactId) -> Result<Vec<Review>> {
        let state = self.state.read().await;
        let reviews = state
            .reviews
            .values()
            .filter(|r| r.artifact_id == artifact_id)
            .cloned()
            .collect();
        Ok(sorted_by_created(reviews, |r: &Review| r.created_at))
    }

    async fn pending_reviews(&self, review_type: Option<ReviewType>) -> Result<Vec<Review>> {
        let state = self.state.read().await;
        let reviews = state
            .reviews
            .values()
            .filter(|r| r.status.is_pending())
            .filter(|r| review_type.is_none_or(|t| r.review_type == t))
            .cloned()
            .collect();
        Ok(sorted_by_created(reviews, |r: &Review| r.created_at))
    }

    async fn get_vendor_product(&self, key: &VendorProductKey) -> Result<Option<VendorProduct>> {
        Ok(self.state.read().await.vendor_products.get(key).cloned())
    }

    async fn insert_vendor_product(&self, product: &VendorProduct) -> Result<VendorProduct> {
        let mut state = self.state.write().await;
        let stored = state
            .vendor_products
            .entry(product.key.clone())
            .or_insert_with(|| product.clone());
        Ok(stored.clone())
    }
}
