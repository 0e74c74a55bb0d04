//! Fire-and-forget notifications to reviewers and customers.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{ArtifactId, OrderId, ReviewId};
use domain::{OrderStatus, ReviewType};
use tracing::info;

use super::ServiceError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A reviewer should look at an artifact.
    ReviewRequested {
        review_id: ReviewId,
        artifact_id: ArtifactId,
        review_type: ReviewType,
    },
    /// An order reached a new status.
    OrderStatusChanged {
        order_id: OrderId,
        status: OrderStatus,
        note: String,
    },
}

/// Callers log a notifier failure and carry on; it never aborts a transition.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), ServiceError>;
}

/// Writes notifications to the log. Used when no delivery channel is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), ServiceError> {
        match notification {
            Notification::ReviewRequested {
                review_id,
                artifact_id,
                review_type,
            } => info!(%review_id, %artifact_id, %review_type, "Review requested"),
            Notification::OrderStatusChanged {
                order_id,
                status,
                note,
            } => info!(%order_id, %status, note, "Order status notification"),
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<Notification>,
    fail_on_notify: bool,
}

/// In-memory notifier for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_notify(&self, fail: bool) {
        self.state.write().unwrap().fail_on_notify = fail;
    }

    /// Notifications delivered so far.
    pub fn sent(&self) -> Vec<Notification> {
        self.state.read().unwrap().sent.clone()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), ServiceError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_notify {
            return Err(ServiceError::Unavailable("mail relay down".to_string()));
        }
        state.sent.push(notification);
        Ok(())
    }
}
