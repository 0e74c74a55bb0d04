//! Order timeline read model, rebuilt from ledger entries.

use chrono::{DateTime, Utc};
use common::OrderId;
use domain::{CustomerStatus, OrderStatus, StatusHistoryEntry};
use serde::Serialize;

use crate::{LedgerError, Result};

/// An order's ledger entries in recorded order.
///
/// Every order starts in `Pending`; transition entries record each status
/// it moved to afterwards. Annotations carry notes without a status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderTimeline {
    pub order_id: OrderId,
    pub entries: Vec<StatusHistoryEntry>,
}

impl OrderTimeline {
    /// Builds a timeline, ordering entries by `(recorded_at, sequence)`.
    pub fn from_entries(order_id: OrderId, mut entries: Vec<StatusHistoryEntry>) -> Self {
        entries.retain(|e| e.order_id == order_id);
        entries.sort_by_key(|e| (e.recorded_at, e.sequence));
        Self { order_id, entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn transitions(&self) -> impl Iterator<Item = &StatusHistoryEntry> {
        self.entries.iter().filter(|e| e.is_transition())
    }

    pub fn annotations(&self) -> impl Iterator<Item = &StatusHistoryEntry> {
        self.entries.iter().filter(|e| !e.is_transition())
    }

    /// Statuses the order has held, starting from `Pending`.
    pub fn status_sequence(&self) -> Vec<OrderStatus> {
        std::iter::once(OrderStatus::Pending)
            .chain(self.transitions().map(|e| e.status))
            .collect()
    }

    /// The status after the last recorded transition.
    pub fn latest_status(&self) -> OrderStatus {
        self.transitions()
            .last()
            .map(|e| e.status)
            .unwrap_or_default()
    }

    pub fn customer_status(&self) -> CustomerStatus {
        self.latest_status().customer_status()
    }

    pub fn last_recorded_at(&self) -> Option<DateTime<Utc>> {
        self.entries.last().map(|e| e.recorded_at)
    }

    /// When the order last entered `status`, if it ever did.
    pub fn entered_at(&self, status: OrderStatus) -> Option<DateTime<Utc>> {
        self.transitions()
            .filter(|e| e.status == status)
            .last()
            .map(|e| e.recorded_at)
    }

    pub fn notes(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.note.as_str()).collect()
    }

    /// Checks that each recorded transition was legal from the one before,
    /// and that the last one matches `current`.
    pub fn verify(&self, current: OrderStatus) -> Result<()> {
        let sequence = self.status_sequence();
        for pair in sequence.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            if !from.can_transition_to(to) {
                return Err(LedgerError::Inconsistent {
                    order_id: self.order_id,
                    reason: format!("recorded transition {from} -> {to} is not allowed"),
                });
            }
        }
        let recorded = self.latest_status();
        if recorded != current {
            return Err(LedgerError::StatusMismatch {
                order_id: self.order_id,
                recorded,
                actual: current,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn entry(
        order_id: OrderId,
        status: OrderStatus,
        transition: bool,
        seq: i64,
        at: DateTime<Utc>,
    ) -> StatusHistoryEntry {
        let mut e = if transition {
            StatusHistoryEntry::transition(order_id, status, format!("entry {seq}"))
        } else {
            StatusHistoryEntry::annotation(order_id, status, format!("entry {seq}"))
        };
        e.sequence = seq;
        e.recorded_at = at;
        e
    }

    #[test]
    fn empty_timeline_is_pending() {
        let timeline = OrderTimeline::from_entries(OrderId::new(), vec![]);
        assert!(timeline.is_empty());
        assert_eq!(timeline.latest_status(), OrderStatus::Pending);
        assert_eq!(timeline.status_sequence(), vec![OrderStatus::Pending]);
        assert_eq!(timeline.customer_status(), CustomerStatus::Received);
        assert!(timeline.verify(OrderStatus::Pending).is_ok());
    }

    #[test]
    fn orders_by_timestamp_then_sequence() {
        let id = OrderId::new();
        let now = Utc::now();
        let timeline = OrderTimeline::from_entries(
            id,
            vec![
                entry(id, OrderStatus::Shipped, true, 3, now),
                entry(id, OrderStatus::Processing, true, 2, now),
                entry(id, OrderStatus::Pending, false, 1, now - Duration::seconds(1)),
            ],
        );
        assert_eq!(timeline.notes(), vec!["entry 1", "entry 2", "entry 3"]);
        assert_eq!(
            timeline.status_sequence(),
            vec![
                OrderStatus::Pending,
                OrderStatus::Processing,
                OrderStatus::Shipped
            ]
        );
        assert_eq!(timeline.annotations().count(), 1);
        assert_eq!(timeline.customer_status(), CustomerStatus::Shipped);
        assert_eq!(timeline.entered_at(OrderStatus::Processing), Some(now));
        assert!(timeline.verify(OrderStatus::Shipped).is_ok());
    }

    #[test]
    fn ignores_other_orders_entries() {
        let id = OrderId::new();
        let other = OrderId::new();
        let now = Utc::now();
        let timeline = OrderTimeline::from_entries(
            id,
            vec![
                entry(other, OrderStatus::Processing, true, 1, now),
                entry(id, OrderStatus::Cancelled, true, 2, now),
            ],
        );
        assert_eq!(timeline.entries.len(), 1);
        assert_eq!(timeline.latest_status(), OrderStatus::Cancelled);
    }

    #[test]
    fn verify_rejects_illegal_path() {
        let id = OrderId::new();
        let now = Utc::now();
        let timeline = OrderTimeline::from_entries(
            id,
            vec![entry(id, OrderStatus::Shipped, true, 1, now)],
        );
        assert!(matches!(
            timeline.verify(OrderStatus::Shipped),
            Err(LedgerError::Inconsistent { .. })
        ));
    }

    #[test]
    fn verify_rejects_status_drift() {
        let id = OrderId::new();
        let now = Utc::now();
        let timeline = OrderTimeline::from_entries(
            id,
            vec![entry(id, OrderStatus::Processing, true, 1, now)],
        );
        assert!(matches!(
            timeline.verify(OrderStatus::Shipped),
            Err(LedgerError::StatusMismatch {
                recorded: OrderStatus::Processing,
                actual: OrderStatus::Shipped,
                ..
            })
        ));
    }
}
