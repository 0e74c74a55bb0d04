//! Order orchestrator: drives a paid order through review, enhancement and
//! vendor submission.
//!
//! Every invocation re-reads the persisted order and performs the next
//! incomplete step, so invoking it repeatedly (or concurrently, from a retry
//! sweep racing a webhook) is safe. Status writes are compare-and-swap; an
//! invocation that loses the race reports `Superseded` and changes nothing.

use std::sync::Arc;
use std::time::Instant;

use common::{ArtifactId, OrderId, ReviewId};
use domain::{
    Artifact, CustomerContact, Money, Order, OrderStatus, ProductType, Review, ReviewOutcome,
    ReviewStatus, ShippingAddress, ValidationError,
};
use ledger::{LedgerError, StatusLedger};
use serde::{Deserialize, Serialize};
use store::{FulfillmentStore, FulfillmentStoreExt, StoreError};
use tracing::{debug, info, warn};

use crate::config::{FulfillmentConfig, ModerationConfig};
use crate::error::{ErrorKind, FulfillmentError, Result};
use crate::review_gate::{ReviewGate, ReviewState};
use crate::services::{AssetSource, EnhancementService, Notification, Notifier, VendorApi};
use crate::upscale::{EnhancedAsset, UpscaleOrchestrator};
use crate::vendor_builder::VendorBuilder;

/// The external services the orchestrator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub enhancement: Arc<dyn EnhancementService>,
    pub vendor: Arc<dyn VendorApi>,
    pub notifier: Arc<dyn Notifier>,
    pub assets: Arc<dyn AssetSource>,
}

/// What one drive invocation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DriveOutcome {
    /// No payment confirmation yet.
    AwaitingPayment,
    /// A physical order with no artifact to print.
    AwaitingArtifact,
    AwaitingReview { review_id: ReviewId },
    /// The review was rejected; an operator has to decide what happens next.
    ReviewRejected { review_id: ReviewId },
    Submitted {
        vendor_order_id: String,
        asset_url: String,
        used_fallback: bool,
    },
    /// A digital order, delivered without a vendor step.
    Delivered,
    /// The vendor could not be reached; the order is left for a later retry.
    VendorDeferred { kind: ErrorKind, reason: String },
    /// A failure retrying cannot fix; waiting for an operator to release it.
    Held { reason: String },
    /// Another invocation moved the order first.
    Superseded { status: OrderStatus },
    NoAction { status: OrderStatus },
}

/// A confirmed payment reported by the payment processor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentConfirmation {
    /// The order created at payment-intent time, if there was one.
    #[serde(default)]
    pub order_id: Option<OrderId>,
    pub payment_reference: String,
    pub amount_cents: i64,
    pub currency: String,
    pub product_type: ProductType,
    pub size: String,
    pub contact: CustomerContact,
    #[serde(default)]
    pub shipping_address: Option<ShippingAddress>,
    #[serde(default)]
    pub artifact_id: Option<ArtifactId>,
    /// Creates a new artifact when `artifact_id` is absent.
    #[serde(default)]
    pub asset_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentIntake {
    pub order_id: OrderId,
    /// True if no order existed and one was created from the payment.
    pub created: bool,
    pub outcome: DriveOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriveFailure {
    pub kind: ErrorKind,
    pub message: String,
}

/// Result of driving one order as part of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriveReport {
    pub order_id: OrderId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<DriveOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<DriveFailure>,
}

impl DriveReport {
    fn new(order_id: OrderId, result: Result<DriveOutcome>) -> Self {
        match result {
            Ok(outcome) => Self {
                order_id,
                outcome: Some(outcome),
                error: None,
            },
            Err(e) => Self {
                order_id,
                outcome: None,
                error: Some(DriveFailure {
                    kind: e.kind(),
                    message: e.to_string(),
                }),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewDecision {
    pub review: Review,
    /// Orders that were waiting on this review and were driven again.
    pub resumed: Vec<DriveReport>,
}

/// Sole writer of order status and the status ledger.
pub struct OrderOrchestrator<S> {
    store: Arc<S>,
    ledger: StatusLedger<S>,
    review_gate: ReviewGate<S>,
    upscale: UpscaleOrchestrator<S>,
    vendor: VendorBuilder<S>,
    notifier: Arc<dyn Notifier>,
    moderation: ModerationConfig,
}

impl<S: FulfillmentStore> OrderOrchestrator<S> {
    pub fn new(store: Arc<S>, collaborators: Collaborators, config: FulfillmentConfig) -> Self {
        Self {
            ledger: StatusLedger::new(store.clone()),
            review_gate: ReviewGate::new(store.clone(), collaborators.notifier.clone()),
            upscale: UpscaleOrchestrator::new(
                store.clone(),
                collaborators.enhancement,
                collaborators.assets,
                &config,
            ),
            vendor: VendorBuilder::new(store.clone(), collaborators.vendor, &config),
            notifier: collaborators.notifier,
            moderation: config.moderation,
            store,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn ledger(&self) -> &StatusLedger<S> {
        &self.ledger
    }

    pub fn review_gate(&self) -> &ReviewGate<S> {
        &self.review_gate
    }

    pub fn upscale(&self) -> &UpscaleOrchestrator<S> {
        &self.upscale
    }

    pub fn vendor(&self) -> &VendorBuilder<S> {
        &self.vendor
    }

    /// Performs the next incomplete step for the order.
    #[tracing::instrument(skip(self))]
    pub async fn drive(&self, order_id: OrderId) -> Result<DriveOutcome> {
        metrics::counter!("fulfillment_drive_total").increment(1);
        let start = Instant::now();
        let result = self.drive_once(order_id).await;
        metrics::histogram!("fulfillment_drive_duration_seconds")
            .record(start.elapsed().as_secs_f64());

        match result {
            Err(FulfillmentError::StatusConflict { actual, .. }) => {
                debug!(status = %actual, "Order moved by another invocation");
                Ok(DriveOutcome::Superseded { status: actual })
            }
            other => other,
        }
    }

    async fn drive_once(&self, order_id: OrderId) -> Result<DriveOutcome> {
        let order = self.store.require_order(order_id).await?;
        if order.status.is_terminal() {
            return Ok(DriveOutcome::NoAction {
                status: order.status,
            });
        }
        if !order.is_payment_confirmed() {
            return Ok(DriveOutcome::AwaitingPayment);
        }
        if let Some(reason) = order.hold_reason {
            return Ok(DriveOutcome::Held { reason });
        }
        if !order.product_type.requires_physical_fulfillment() {
            return self.deliver_digital(&order).await;
        }
        if !order.awaits_vendor_submission() {
            return Ok(DriveOutcome::NoAction {
                status: order.status,
            });
        }
        let Some(artifact_id) = order.artifact_id else {
            return Ok(DriveOutcome::AwaitingArtifact);
        };

        if let Some(outcome) = self.moderate(&order, artifact_id).await? {
            return Ok(outcome);
        }

        // Structural problems fail before an enhancement call is spent.
        let artifact = self.store.require_artifact(artifact_id).await?;
        if let Err(e) = self.vendor.validate(&order, &artifact.primary_url) {
            return self.hold(&order, format!("validation failed: {e}"), e).await;
        }

        let asset = self.upscale.ensure_enhanced(artifact_id).await?;
        let note = match &asset.fallback_reason {
            Some(reason) => format!("used_fallback=true, sending original asset: {reason}"),
            None => format!("used_fallback=false, sending {}", asset.url),
        };
        self.ledger.annotate_at(order.id, order.status, note).await?;

        self.submit(&order, asset).await
    }

    /// Returns `Some` when the order has to wait for a moderator.
    async fn moderate(&self, order: &Order, artifact_id: ArtifactId) -> Result<Option<DriveOutcome>> {
        // An order already waiting keeps waiting even if moderation was
        // switched off since.
        if !self.moderation.enabled && order.status != OrderStatus::PendingReview {
            return Ok(None);
        }
        let review_type = self.moderation.review_type;

        let review_id = match self.review_gate.state(artifact_id, review_type).await? {
            ReviewState::Approved(_) => return Ok(None),
            ReviewState::Rejected(review_id) => {
                warn!(order_id = %order.id, %review_id, "Review rejected, waiting for an operator");
                return Ok(Some(DriveOutcome::ReviewRejected { review_id }));
            }
            ReviewState::Pending(review_id) => review_id,
            ReviewState::NotRequested => {
                self.review_gate
                    .request_review(artifact_id, review_type)
                    .await?
            }
        };

        if order.status == OrderStatus::Pending {
            let note = format!("awaiting {review_type} review {review_id}");
            let updated = self
                .ledger
                .transition(order.id, OrderStatus::Pending, OrderStatus::PendingReview, &note)
                .await?;
            self.notify_status(&updated, &note).await;
        }
        Ok(Some(DriveOutcome::AwaitingReview { review_id }))
    }

    async fn submit(&self, order: &Order, asset: EnhancedAsset) -> Result<DriveOutcome> {
        let key = match self.vendor.validate(order, &asset.url) {
            Ok(key) => key,
            Err(e) => return self.hold(order, format!("validation failed: {e}"), e).await,
        };
        let product = match self
            .vendor
            .get_or_create_vendor_product(&key, &asset.url)
            .await
        {
            Ok(product) => product,
            Err(e) => return self.defer(order, "vendor product", e).await,
        };

        // The order may have been cancelled while enhancement was running.
        let current = self.store.require_order(order.id).await?;
        if !current.awaits_vendor_submission() {
            info!(order_id = %current.id, status = %current.status, "Order left the pipeline, not submitting");
            return Ok(DriveOutcome::Superseded {
                status: current.status,
            });
        }

        let vendor_order = match self
            .vendor
            .submit_vendor_order(&current, &asset.url, &product)
            .await
        {
            Ok(vendor_order) => vendor_order,
            Err(e) => return self.defer(&current, "vendor order", e).await,
        };

        let note = format!("vendor order {} created", vendor_order.vendor_order_id);
        match self
            .ledger
            .record_vendor_order(current.id, current.status, &vendor_order, &note)
            .await
        {
            Ok(updated) => {
                self.notify_status(&updated, &note).await;
                Ok(DriveOutcome::Submitted {
                    vendor_order_id: vendor_order.vendor_order_id,
                    asset_url: asset.url,
                    used_fallback: asset.used_fallback,
                })
            }
            Err(LedgerError::Store(StoreError::StatusConflict { actual, .. })) => {
                let latest = self.store.require_order(current.id).await?;
                if latest.vendor_order_id.as_deref() != Some(vendor_order.vendor_order_id.as_str()) {
                    warn!(
                        order_id = %current.id,
                        vendor_order_id = %vendor_order.vendor_order_id,
                        status = %actual,
                        "Vendor order placed after the order moved on"
                    );
                    self.ledger
                        .annotate_at(
                            current.id,
                            actual,
                            format!(
                                "vendor order {} was placed after the order became {actual}; cancel it with the vendor",
                                vendor_order.vendor_order_id
                            ),
                        )
                        .await?;
                }
                Ok(DriveOutcome::Superseded { status: actual })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Records a vendor failure. Retryable failures leave the order for a
    /// later pass; anything else is returned to the caller.
    async fn defer(&self, order: &Order, stage: &str, error: FulfillmentError) -> Result<DriveOutcome> {
        let note = format!("{stage} failed: {error}");
        if error.needs_operator() {
            return self.hold(order, note, error).await;
        }
        self.ledger.annotate_at(order.id, order.status, note).await?;
        if !error.is_retryable() {
            return Err(error);
        }
        Ok(DriveOutcome::VendorDeferred {
            kind: error.kind(),
            reason: error.to_string(),
        })
    }

    /// Puts the order on hold so retries skip it, then returns `error`.
    async fn hold(&self, order: &Order, note: String, error: FulfillmentError) -> Result<DriveOutcome> {
        self.store.set_hold(order.id, Some(&note)).await?;
        self.ledger
            .annotate_at(order.id, order.status, format!("{note}; held for an operator"))
            .await?;
        metrics::counter!("fulfillment_orders_held_total").increment(1);
        warn!(order_id = %order.id, error = %error, "Order held for an operator");
        Err(error)
    }

    async fn deliver_digital(&self, order: &Order) -> Result<DriveOutcome> {
        if let Some(artifact_id) = order.artifact_id {
            self.upscale.mark_not_required(artifact_id).await?;
        }

        let mut status = order.status;
        if status.awaits_vendor_submission() {
            self.ledger
                .transition(order.id, status, OrderStatus::Processing, "digital order, no vendor step")
                .await?;
            status = OrderStatus::Processing;
        }
        let note = "digital delivery complete";
        let updated = self
            .ledger
            .transition(order.id, status, OrderStatus::Delivered, note)
            .await?;
        self.notify_status(&updated, note).await;
        Ok(DriveOutcome::Delivered)
    }

    /// Records a confirmed payment and drives the order.
    ///
    /// Creates the order if the payment has none (a paid session whose
    /// order was never written), otherwise back-fills the payment reference.
    /// Replaying the same confirmation only drives the order again, including
    /// when two deliveries of it race.
    #[tracing::instrument(skip(self, event), fields(payment_reference = %event.payment_reference))]
    pub async fn confirm_payment(&self, event: PaymentConfirmation) -> Result<PaymentIntake> {
        let reference = event.payment_reference.trim().to_string();
        if reference.is_empty() {
            return Err(ValidationError::MissingPaymentReference.into());
        }

        if let Some(intake) = self.replay_payment(&reference).await? {
            return Ok(intake);
        }

        match self.record_payment(event, &reference).await {
            Ok((order_id, created)) => {
                let outcome = self.drive(order_id).await?;
                Ok(PaymentIntake {
                    order_id,
                    created,
                    outcome,
                })
            }
            // Another delivery of the same confirmation recorded it first.
            Err(FulfillmentError::AlreadyExists {
                entity: "payment reference",
                ..
            }) => match self.replay_payment(&reference).await? {
                Some(intake) => Ok(intake),
                None => Err(FulfillmentError::NotFound {
                    entity: "payment reference",
                    id: reference,
                }),
            },
            Err(e) => Err(e),
        }
    }

    /// Drives the order already holding `reference`, if there is one.
    async fn replay_payment(&self, reference: &str) -> Result<Option<PaymentIntake>> {
        let Some(order) = self.store.find_order_by_payment_reference(reference).await? else {
            return Ok(None);
        };
        debug!(order_id = %order.id, "Payment already recorded");
        let outcome = self.drive(order.id).await?;
        Ok(Some(PaymentIntake {
            order_id: order.id,
            created: false,
            outcome,
        }))
    }

    /// Stores the payment on its order, creating the order if needed.
    async fn record_payment(&self, event: PaymentConfirmation, reference: &str) -> Result<(OrderId, bool)> {
        let artifact_id = self.resolve_artifact(&event).await?;
        let existing = match event.order_id {
            Some(id) => self.store.get_order(id).await?,
            None => None,
        };

        if let Some(order) = existing {
            let confirmed = self.store.confirm_payment(order.id, reference).await?;
            if order.artifact_id.is_none()
                && let Some(artifact_id) = artifact_id
            {
                self.store.attach_artifact(order.id, artifact_id).await?;
            }
            if confirmed.payment_reference == reference {
                self.ledger
                    .annotate_at(order.id, confirmed.status, format!("payment confirmed ({reference})"))
                    .await?;
            } else {
                warn!(
                    order_id = %order.id,
                    recorded = %confirmed.payment_reference,
                    "Order already paid under another reference, ignoring this one"
                );
            }
            return Ok((order.id, false));
        }

        let mut order = Order::new(
            event.product_type,
            event.size,
            Money::from_cents(event.amount_cents),
            event.currency,
            event.contact,
            event.shipping_address,
        );
        if let Some(id) = event.order_id {
            order.id = id;
        }
        if let Some(artifact_id) = artifact_id {
            order = order.with_artifact(artifact_id);
        }
        order.confirm_payment(reference);
        self.store.insert_order(&order).await?;
        self.ledger
            .annotate_at(
                order.id,
                OrderStatus::Pending,
                format!("payment confirmed ({reference}); order created from payment"),
            )
            .await?;
        info!(order_id = %order.id, "Order created from confirmed payment");
        Ok((order.id, true))
    }

    async fn resolve_artifact(&self, event: &PaymentConfirmation) -> Result<Option<ArtifactId>> {
        if let Some(artifact_id) = event.artifact_id {
            self.store.require_artifact(artifact_id).await?;
            return Ok(Some(artifact_id));
        }
        let Some(url) = &event.asset_url else {
            return Ok(None);
        };
        let artifact = Artifact::new(url.clone());
        self.store.insert_artifact(&artifact).await?;
        Ok(Some(artifact.id))
    }

    /// Records a moderator decision. An approval drives every order waiting
    /// on the artifact; a rejection is noted on them and left to an operator.
    #[tracing::instrument(skip(self, notes))]
    pub async fn decide_review(
        &self,
        review_id: ReviewId,
        outcome: ReviewOutcome,
        reviewer: &str,
        notes: Option<String>,
    ) -> Result<ReviewDecision> {
        let review = self
            .review_gate
            .decide(review_id, outcome, reviewer, notes)
            .await?;

        let waiting: Vec<Order> = self
            .store
            .orders_awaiting_vendor()
            .await?
            .into_iter()
            .filter(|o| {
                o.artifact_id == Some(review.artifact_id) && o.status == OrderStatus::PendingReview
            })
            .collect();

        let mut resumed = Vec::new();
        for order in waiting {
            if review.status == ReviewStatus::Approved {
                resumed.push(DriveReport::new(order.id, self.drive(order.id).await));
            } else {
                self.ledger
                    .annotate_at(
                        order.id,
                        order.status,
                        format!("review {review_id} rejected; waiting for an operator decision"),
                    )
                    .await?;
            }
        }
        Ok(ReviewDecision { review, resumed })
    }

    /// Applies a status reported by the vendor for one of its orders.
    ///
    /// The raw status is always stored; the order only moves if the mapped
    /// status is a legal next step.
    #[tracing::instrument(skip(self))]
    pub async fn apply_vendor_status(&self, vendor_order_id: &str, vendor_status: &str) -> Result<Order> {
        let order = self
            .store
            .find_order_by_vendor_order_id(vendor_order_id)
            .await?
            .ok_or_else(|| FulfillmentError::NotFound {
                entity: "vendor order",
                id: vendor_order_id.to_string(),
            })?;
        let order = self.store.update_vendor_status(order.id, vendor_status).await?;

        let target = OrderStatus::from_vendor_status(vendor_status);
        if target == order.status || !order.status.can_transition_to(target) {
            debug!(status = %order.status, %target, "Vendor status does not move the order");
            return Ok(order);
        }

        let note = format!("vendor reported {vendor_status}");
        match self
            .ledger
            .transition(order.id, order.status, target, &note)
            .await
        {
            Ok(updated) => {
                self.notify_status(&updated, &note).await;
                Ok(updated)
            }
            Err(LedgerError::Store(StoreError::StatusConflict { .. })) => {
                Ok(self.store.require_order(order.id).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Cancels an order that has not reached the vendor.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: OrderId, reason: &str) -> Result<Order> {
        let order = self.store.require_order(order_id).await?;
        if order.vendor_order_id.is_some() || !order.status.awaits_vendor_submission() {
            return Err(FulfillmentError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Cancelled,
            });
        }
        let note = format!("cancelled: {reason}");
        let updated = self
            .ledger
            .transition(order_id, order.status, OrderStatus::Cancelled, &note)
            .await?;
        self.notify_status(&updated, &note).await;
        Ok(updated)
    }

    /// An operator gives up on the order.
    #[tracing::instrument(skip(self))]
    pub async fn mark_failed(&self, order_id: OrderId, reason: &str) -> Result<Order> {
        let order = self.store.require_order(order_id).await?;
        if order.status.is_terminal() {
            return Err(FulfillmentError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Failed,
            });
        }
        let updated = self
            .ledger
            .transition(order_id, order.status, OrderStatus::Failed, &format!("failed: {reason}"))
            .await?;
        Ok(updated)
    }

    /// Clears an operator hold and drives the order again.
    #[tracing::instrument(skip(self))]
    pub async fn release_hold(&self, order_id: OrderId, note: &str) -> Result<DriveOutcome> {
        let order = self.store.require_order(order_id).await?;
        if order.is_held() {
            self.store.set_hold(order_id, None).await?;
            self.ledger
                .annotate_at(order_id, order.status, format!("hold released: {note}"))
                .await?;
            info!(%order_id, "Operator hold released");
        }
        self.drive(order_id).await
    }

    /// Drives every paid physical order that has not reached the vendor,
    /// skipping orders held for an operator.
    #[tracing::instrument(skip(self))]
    pub async fn retry_sweep(&self) -> Result<Vec<DriveReport>> {
        let (held, orders): (Vec<Order>, Vec<Order>) = self
            .store
            .orders_awaiting_vendor()
            .await?
            .into_iter()
            .partition(Order::is_held);
        let mut reports = Vec::with_capacity(orders.len());
        for order in orders {
            reports.push(DriveReport::new(order.id, self.drive(order.id).await));
        }
        let failed = reports.iter().filter(|r| !r.is_ok()).count();
        info!(orders = reports.len(), failed, held = held.len(), "Retry sweep finished");
        Ok(reports)
    }

    async fn notify_status(&self, order: &Order, note: &str) {
        let notification = Notification::OrderStatusChanged {
            order_id: order.id,
            status: order.status,
            note: note.to_string(),
        };
        if let Err(e) = self.notifier.notify(notification).await {
            warn!(order_id = %order.id, error = %e, "Status notification failed");
        }
    }
}
