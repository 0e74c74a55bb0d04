//! Status writes and ledger queries for orders.

use std::sync::Arc;

use common::OrderId;
use domain::{Order, OrderStatus, StatusHistoryEntry, VendorOrderRef};
use store::{FulfillmentStore, FulfillmentStoreExt};
use tracing::{debug, info};

use crate::Result;
use crate::timeline::OrderTimeline;

/// Writes order status changes together with their ledger entries.
///
/// Each status write is a compare-and-swap on the status the caller last
/// read; a caller working from a stale read gets `StatusConflict` and
/// nothing is recorded.
pub struct StatusLedger<S> {
    store: Arc<S>,
}

impl<S> Clone for StatusLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: FulfillmentStore> StatusLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Moves the order from `expected` to `next` and records one transition entry.
    #[tracing::instrument(skip(self, note), fields(%order_id, from = %expected, to = %next))]
    pub async fn transition(
        &self,
        order_id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
        note: &str,
    ) -> Result<Order> {
        let order = self
            .store
            .transition_order(order_id, expected, next, note)
            .await?;
        Self::count_transition(next);
        info!(note, "Order status changed");
        Ok(order)
    }

    /// Stores the vendor order and moves the order to processing in one step.
    #[tracing::instrument(skip(self, vendor_order, note), fields(%order_id, vendor_order_id = %vendor_order.vendor_order_id))]
    pub async fn record_vendor_order(
        &self,
        order_id: OrderId,
        expected: OrderStatus,
        vendor_order: &VendorOrderRef,
        note: &str,
    ) -> Result<Order> {
        let order = self
            .store
            .record_vendor_order(order_id, expected, vendor_order, note)
            .await?;
        Self::count_transition(order.status);
        info!(note, "Vendor order recorded");
        Ok(order)
    }

    /// Records a note against the order's current status.
    #[tracing::instrument(skip(self, note), fields(%order_id))]
    pub async fn annotate(
        &self,
        order_id: OrderId,
        note: impl Into<String> + Send,
    ) -> Result<StatusHistoryEntry> {
        let order = self.store.require_order(order_id).await?;
        self.annotate_at(order_id, order.status, note).await
    }

    /// Records a note against a status the caller has already read.
    pub async fn annotate_at(
        &self,
        order_id: OrderId,
        status: OrderStatus,
        note: impl Into<String> + Send,
    ) -> Result<StatusHistoryEntry> {
        let entry = self
            .store
            .append_history(StatusHistoryEntry::annotation(order_id, status, note))
            .await?;
        debug!(%order_id, note = %entry.note, "Ledger note recorded");
        Ok(entry)
    }

    pub async fn entries(&self, order_id: OrderId) -> Result<Vec<StatusHistoryEntry>> {
        Ok(self.timeline(order_id).await?.entries)
    }

    /// Transition entries only, oldest first.
    pub async fn transitions(&self, order_id: OrderId) -> Result<Vec<StatusHistoryEntry>> {
        let timeline = self.timeline(order_id).await?;
        Ok(timeline.transitions().cloned().collect())
    }

    pub async fn latest_status(&self, order_id: OrderId) -> Result<OrderStatus> {
        Ok(self.timeline(order_id).await?.latest_status())
    }

    pub async fn status_sequence(&self, order_id: OrderId) -> Result<Vec<OrderStatus>> {
        Ok(self.timeline(order_id).await?.status_sequence())
    }

    pub async fn timeline(&self, order_id: OrderId) -> Result<OrderTimeline> {
        let entries = self.store.history(order_id).await?;
        Ok(OrderTimeline::from_entries(order_id, entries))
    }

    /// Checks the order's ledger against its stored status.
    pub async fn verify(&self, order_id: OrderId) -> Result<OrderTimeline> {
        let order = self.store.require_order(order_id).await?;
        let timeline = self.timeline(order_id).await?;
        timeline.verify(order.status)?;
        Ok(timeline)
    }

    fn count_transition(status: OrderStatus) {
        metrics::counter!("order_transitions_total", "status" => status.as_str()).increment(1);
    }
}
