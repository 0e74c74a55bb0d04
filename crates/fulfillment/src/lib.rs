//! Fulfillment orchestration for generated-art print orders.
//!
//! [`OrderOrchestrator`] owns order status. It moves a paid order through the
//! optional [`ReviewGate`], image enhancement ([`UpscaleOrchestrator`]) and
//! vendor submission ([`VendorBuilder`]). Every external call goes through a
//! per-dependency circuit breaker and concurrency cap from `resilience`.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod review_gate;
pub mod services;
pub mod upscale;
pub mod vendor_builder;

pub use config::{FulfillmentConfig, ModerationConfig};
pub use error::{ErrorKind, FulfillmentError, Result};
pub use orchestrator::{
    Collaborators, DriveFailure, DriveOutcome, DriveReport, OrderOrchestrator, PaymentConfirmation,
    PaymentIntake, ReviewDecision,
};
pub use review_gate::{ReviewGate, ReviewState};
pub use services::{
    AssetSource, CreatedProduct, EnhancementParams, EnhancementRequest, EnhancementResult,
    EnhancementService, HttpAssetSource, HttpEnhancementService, HttpVendorApi,
    InMemoryAssetSource, InMemoryEnhancementService, InMemoryNotifier, InMemoryVendorApi,
    LoggingNotifier, Notification, Notifier, ServiceError, VendorApi, VendorOrderRequest,
    VendorProductRequest,
};
pub use upscale::{EnhancedAsset, UpscaleOrchestrator};
pub use vendor_builder::VendorBuilder;
