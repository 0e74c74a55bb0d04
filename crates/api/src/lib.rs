//! HTTP adapter for the print fulfillment core.
//!
//! Exposes the orchestrator's trigger events (payment confirmed, review
//! decided, vendor webhook, retry sweep) and operator queries as REST
//! endpoints, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use fulfillment::{Collaborators, FulfillmentConfig, OrderOrchestrator};
use metrics_exporter_prometheus::PrometheusHandle;
use store::FulfillmentStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S> {
    pub orchestrator: OrderOrchestrator<S>,
}

impl<S: FulfillmentStore> AppState<S> {
    pub fn new(store: Arc<S>, collaborators: Collaborators, config: FulfillmentConfig) -> Self {
        Self {
            orchestrator: OrderOrchestrator::new(store, collaborators, config),
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: FulfillmentStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/payments/confirmed", post(routes::payments::confirmed::<S>))
        .route("/orders/retry-sweep", post(routes::orders::retry_sweep::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/history", get(routes::orders::history::<S>))
        .route("/orders/{id}/drive", post(routes::orders::drive::<S>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .route("/orders/{id}/fail", post(routes::orders::fail::<S>))
        .route("/orders/{id}/release", post(routes::orders::release::<S>))
        .route("/reviews/pending", get(routes::reviews::pending::<S>))
        .route("/reviews/{id}", get(routes::reviews::get::<S>))
        .route("/reviews/{id}/decision", post(routes::reviews::decide::<S>))
        .route(
            "/artifacts/{id}/reviews",
            get(routes::reviews::for_artifact::<S>).post(routes::reviews::request::<S>),
        )
        .route("/webhooks/vendor", post(routes::webhooks::vendor::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
