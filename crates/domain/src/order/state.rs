//! Order status state machine.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};

/// The status of an order in its fulfillment lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──┬──► PendingReview ──┐
///           │                    ▼
///           └──────────────► Processing ──► Shipped ──► Delivered
///                                 └─────────────────────────▲
///
/// any non-terminal ──► Failed | Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created, waiting for payment confirmation or the next pipeline step.
    #[default]
    Pending,

    /// Waiting on a human moderation decision.
    PendingReview,

    /// The vendor has the order (or a digital order is being delivered).
    Processing,

    /// Handed to the carrier.
    Shipped,

    /// Received by the customer (terminal state).
    Delivered,

    /// An operator gave up on the order (terminal state).
    Failed,

    /// Cancelled before production (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if the machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        if self.is_terminal() {
            return false;
        }
        match next {
            Failed | Cancelled => true,
            PendingReview => matches!(self, Pending),
            Processing => matches!(self, Pending | PendingReview),
            Shipped => matches!(self, Processing),
            Delivered => matches!(self, Processing | Shipped),
            Pending => false,
        }
    }

    /// Returns true if the order may still be handed to the vendor.
    pub fn awaits_vendor_submission(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::PendingReview)
    }

    /// Returns true if a vendor order id may be attached in this status.
    pub fn allows_vendor_order(&self) -> bool {
        matches!(
            self,
            OrderStatus::Processing | OrderStatus::Shipped | OrderStatus::Delivered
        )
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Failed | OrderStatus::Cancelled
        )
    }

    /// Coarse status shown to the customer.
    pub fn customer_status(&self) -> CustomerStatus {
        match self {
            OrderStatus::Pending | OrderStatus::PendingReview | OrderStatus::Failed => {
                CustomerStatus::Received
            }
            OrderStatus::Processing => CustomerStatus::InProduction,
            OrderStatus::Shipped => CustomerStatus::Shipped,
            OrderStatus::Delivered => CustomerStatus::Delivered,
            OrderStatus::Cancelled => CustomerStatus::Cancelled,
        }
    }

    /// Maps a print vendor's order status onto ours.
    ///
    /// Unknown vendor statuses are treated as still in production.
    pub fn from_vendor_status(vendor_status: &str) -> OrderStatus {
        match vendor_status.trim().to_ascii_lowercase().as_str() {
            "fulfilled" | "shipped" | "on-hold-shipped" => OrderStatus::Shipped,
            "delivered" => OrderStatus::Delivered,
            "cancelled" | "canceled" => OrderStatus::Cancelled,
            _ => OrderStatus::Processing,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::PendingReview => "pending_review",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "pending_review" => Ok(OrderStatus::PendingReview),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "failed" => Ok(OrderStatus::Failed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::UnknownValue {
                kind: "order status",
                value: other.to_string(),
            }),
        }
    }
}

/// What a customer is told about their order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerStatus {
    Received,
    InProduction,
    Shipped,
    Delivered,
    Cancelled,
}

impl CustomerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerStatus::Received => "received",
            CustomerStatus::InProduction => "in_production",
            CustomerStatus::Shipped => "shipped",
            CustomerStatus::Delivered => "delivered",
            CustomerStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for CustomerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::PendingReview,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Failed,
        OrderStatus::Cancelled,
    ];

    #[test]
    fn test_default_status_is_pending() {
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
    }

    #[test]
    fn test_happy_path_transitions() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::PendingReview));
        assert!(OrderStatus::PendingReview.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Delivered));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Delivered));
    }

    #[test]
    fn test_no_backwards_transitions() {
        assert!(!OrderStatus::Processing.can_transition_to(OrderStatus::PendingReview));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Processing));
        assert!(!OrderStatus::PendingReview.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Shipped));
    }

    #[test]
    fn test_failed_and_cancelled_reachable_from_non_terminal() {
        for status in ALL.iter().filter(|s| !s.is_terminal()) {
            assert!(status.can_transition_to(OrderStatus::Failed));
            assert!(status.can_transition_to(OrderStatus::Cancelled));
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for status in ALL.iter().filter(|s| s.is_terminal()) {
            for next in ALL {
                assert!(!status.can_transition_to(next));
            }
        }
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(!OrderStatus::Shipped.is_terminal());
    }

    #[test]
    fn test_vendor_order_allowed_only_after_submission() {
        assert!(!OrderStatus::Pending.allows_vendor_order());
        assert!(!OrderStatus::PendingReview.allows_vendor_order());
        assert!(OrderStatus::Processing.allows_vendor_order());
        assert!(OrderStatus::Delivered.allows_vendor_order());
        assert!(!OrderStatus::Cancelled.allows_vendor_order());
    }

    #[test]
    fn test_vendor_status_mapping() {
        assert_eq!(
            OrderStatus::from_vendor_status("pending"),
            OrderStatus::Processing
        );
        assert_eq!(
            OrderStatus::from_vendor_status("in-production"),
            OrderStatus::Processing
        );
        assert_eq!(
            OrderStatus::from_vendor_status("fulfilled"),
            OrderStatus::Shipped
        );
        assert_eq!(
            OrderStatus::from_vendor_status("shipped"),
            OrderStatus::Shipped
        );
        assert_eq!(
            OrderStatus::from_vendor_status("Delivered"),
            OrderStatus::Delivered
        );
        assert_eq!(
            OrderStatus::from_vendor_status("cancelled"),
            OrderStatus::Cancelled
        );
        assert_eq!(
            OrderStatus::from_vendor_status("something-new"),
            OrderStatus::Processing
        );
    }

    #[test]
    fn test_customer_status_is_coarse() {
        assert_eq!(
            OrderStatus::PendingReview.customer_status(),
            CustomerStatus::Received
        );
        assert_eq!(
            OrderStatus::Processing.customer_status(),
            CustomerStatus::InProduction
        );
        assert_eq!(
            OrderStatus::Shipped.customer_status(),
            CustomerStatus::Shipped
        );
    }

    #[test]
    fn test_display_and_parse() {
        for status in ALL {
            assert_eq!(status.to_string().parse::<OrderStatus>().unwrap(), status);
        }
        assert_eq!(OrderStatus::PendingReview.to_string(), "pending_review");
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&OrderStatus::PendingReview).unwrap();
        assert_eq!(json, "\"pending_review\"");
    }
}
