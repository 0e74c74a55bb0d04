//! Per-dependency protection: bounded queue in front of a circuit breaker.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::circuit_breaker::{BreakerConfig, CircuitBreaker, CircuitState};
use crate::error::ResilienceError;
use crate::queue::BoundedQueue;

/// Protection settings for one external dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyPolicy {
    pub breaker: BreakerConfig,
    pub max_concurrent: usize,
    /// How long a call may wait for a queue slot. `None` waits indefinitely.
    pub queue_timeout: Option<Duration>,
}

impl DependencyPolicy {
    /// Creates a policy with three concurrent calls and no queue timeout.
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            breaker: BreakerConfig::new(failure_threshold, cooldown),
            max_concurrent: 3,
            queue_timeout: None,
        }
    }

    /// Image enhancement: slow and flaky, so it trips early.
    pub fn enhancement() -> Self {
        Self::new(3, Duration::from_secs(30)).with_call_timeout(Duration::from_secs(120))
    }

    /// Print vendor API: opens after 5 failures, 30 second calls.
    pub fn vendor() -> Self {
        Self::new(5, Duration::from_secs(60)).with_call_timeout(Duration::from_secs(30))
    }

    /// Asset downloads for the integrity check.
    pub fn storage() -> Self {
        Self::new(5, Duration::from_secs(60)).with_call_timeout(Duration::from_secs(30))
    }

    /// Customer uploads: opens after 3 failures, 60 second calls.
    pub fn upload() -> Self {
        Self::new(3, Duration::from_secs(30)).with_call_timeout(Duration::from_secs(60))
    }

    /// Sets the per-call deadline.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.breaker.call_timeout = Some(timeout);
        self
    }

    /// Sets the concurrency cap. Zero is raised to 1.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Sets how long a call may wait for a slot.
    pub fn with_queue_timeout(mut self, timeout: Duration) -> Self {
        self.queue_timeout = Some(timeout);
        self
    }
}

impl Default for DependencyPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}

/// Everything an outbound call to one dependency goes through.
///
/// An open breaker rejects before the call waits for a slot, so a dead
/// dependency never builds up a queue.
#[derive(Debug)]
pub struct DependencyGuard {
    breaker: CircuitBreaker,
    queue: BoundedQueue,
    queue_timeout: Option<Duration>,
}

impl DependencyGuard {
    /// Creates the breaker and queue for the named dependency.
    pub fn new(name: impl Into<String>, policy: DependencyPolicy) -> Self {
        let name = name.into();
        Self {
            breaker: CircuitBreaker::new(name.clone(), policy.breaker),
            queue: BoundedQueue::new(name, policy.max_concurrent),
            queue_timeout: policy.queue_timeout,
        }
    }

    /// Returns the dependency name.
    pub fn name(&self) -> &str {
        self.breaker.name()
    }

    /// Returns the dependency's circuit breaker.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Returns the dependency's queue.
    pub fn queue(&self) -> &BoundedQueue {
        &self.queue
    }

    /// Returns the breaker state.
    pub fn state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Runs `operation` through the breaker while holding a queue slot.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.breaker.would_admit() {
            // Let the breaker record the rejection.
            return self.breaker.call(operation).await;
        }

        let _permit = self
            .queue
            .acquire(self.queue_timeout)
            .await
            .map_err(|e| self.queue.reject(e))?;
        debug!(dependency = %self.name(), "Dependency call admitted");
        self.breaker.call(operation).await
    }
}
