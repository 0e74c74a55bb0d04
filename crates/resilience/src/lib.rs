//! Protection for calls to flaky external services.
//!
//! - [`CircuitBreaker`]: fail fast after repeated failures, then admit one trial call
//! - [`RequestDeduplicator`]: collapse concurrent calls sharing a key into one
//! - [`BoundedQueue`]: cap in-flight calls to a dependency, FIFO admission
//! - [`IntegrityVerifier`]: reject transformed assets that look truncated or inflated
//! - [`DependencyGuard`]: queue + breaker + timeout bundled per dependency

pub mod circuit_breaker;
pub mod dedup;
pub mod error;
pub mod guard;
pub mod integrity;
pub mod queue;

pub use circuit_breaker::{BreakerConfig, BreakerStats, CircuitBreaker, CircuitState};
pub use dedup::RequestDeduplicator;
pub use error::ResilienceError;
pub use guard::{DependencyGuard, DependencyPolicy};
pub use integrity::{IntegrityError, IntegrityPolicy, IntegrityVerifier, VerifiedAsset};
pub use queue::{BoundedQueue, QueueError, QueuePermit};
