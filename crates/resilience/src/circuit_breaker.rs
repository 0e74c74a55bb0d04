//! Circuit breaker.
//!
//! Closed: calls pass through and consecutive failures are counted.
//! Open: calls fail immediately until the cooldown elapses.
//! HalfOpen: exactly one trial call is let through; success closes the
//! breaker, failure re-opens it with a fresh cooldown.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::ResilienceError;

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - all calls fail fast without executing
    Open,
    /// Testing recovery - a single trial call is allowed
    HalfOpen,
}

impl CircuitState {
    /// Returns the state name used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tuning for one breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// How long the breaker stays open before allowing a trial call.
    pub cooldown: Duration,
    /// Deadline for a single call; exceeding it counts as a failure.
    pub call_timeout: Option<Duration>,
}

impl BreakerConfig {
    /// Creates a config with no call timeout. A zero threshold is raised to 1.
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            call_timeout: None,
        }
    }

    /// Sets the per-call deadline.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}

/// Point-in-time view of a breaker, for logs and health endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakerStats {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub total_calls: u64,
    pub total_failures: u64,
    pub rejected_calls: u64,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    total_calls: u64,
    total_failures: u64,
    rejected_calls: u64,
}

/// How a call was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Trial,
}

/// Releases the half-open trial slot if the trial call is dropped before it
/// reports an outcome, so the next caller can run the trial instead.
struct TrialSlot<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.inner.lock().trial_in_flight = false;
        }
    }
}

/// A circuit breaker guarding one external dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker for the named dependency.
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        let name = name.into();
        info!(
            dependency = %name,
            failure_threshold = config.failure_threshold,
            cooldown_ms = config.cooldown.as_millis() as u64,
            "Circuit breaker initialized"
        );
        Self {
            name,
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
                total_calls: 0,
                total_failures: 0,
                rejected_calls: 0,
            }),
        }
    }

    /// Returns the dependency name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the breaker's tuning.
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Current state. An open breaker whose cooldown has elapsed still reports
    /// `Open` until the next call turns it half-open.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Returns a snapshot of the breaker's counters.
    pub fn stats(&self) -> BreakerStats {
        let inner = self.inner.lock();
        BreakerStats {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            total_calls: inner.total_calls,
            total_failures: inner.total_failures,
            rejected_calls: inner.rejected_calls,
        }
    }

    /// Returns false if a call made now would be rejected without running.
    ///
    /// Does not change state; used to fail fast before waiting for a queue slot.
    pub fn would_admit(&self) -> bool {
        let inner = self.inner.lock();
        let state = inner.state;
        match state {
            CircuitState::Closed => true,
            CircuitState::Open => self.cooldown_elapsed(&inner),
            CircuitState::HalfOpen => !inner.trial_in_flight,
        }
    }

    /// Executes an operation with circuit breaker protection.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(admission) = self.admit() else {
            metrics::counter!("circuit_breaker_rejections_total", "dependency" => self.name.clone())
                .increment(1);
            debug!(dependency = %self.name, "Call rejected by open circuit breaker");
            return Err(ResilienceError::BreakerOpen {
                dependency: self.name.clone(),
            });
        };

        let mut trial = TrialSlot {
            breaker: self,
            armed: admission == Admission::Trial,
        };

        let start = Instant::now();
        let outcome = match self.config.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, operation()).await {
                Ok(result) => result.map_err(ResilienceError::Operation),
                Err(_) => Err(ResilienceError::CallTimeout {
                    dependency: self.name.clone(),
                    after: limit,
                }),
            },
            None => operation().await.map_err(ResilienceError::Operation),
        };
        metrics::histogram!("dependency_call_duration_seconds", "dependency" => self.name.clone())
            .record(start.elapsed().as_secs_f64());

        trial.armed = false;
        match &outcome {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(admission),
        }
        outcome
    }

    fn cooldown_elapsed(&self, inner: &Inner) -> bool {
        inner
            .opened_at
            .is_none_or(|opened| opened.elapsed() >= self.config.cooldown)
    }

    fn admit(&self) -> Option<Admission> {
        let mut inner = self.inner.lock();
        let state = inner.state;
        let admission = match state {
            CircuitState::Closed => Some(Admission::Normal),
            CircuitState::Open if self.cooldown_elapsed(&inner) => {
                inner.state = CircuitState::HalfOpen;
                inner.trial_in_flight = true;
                info!(dependency = %self.name, "Circuit breaker half-open, allowing trial call");
                Some(Admission::Trial)
            }
            CircuitState::Open => None,
            CircuitState::HalfOpen if !inner.trial_in_flight => {
                inner.trial_in_flight = true;
                Some(Admission::Trial)
            }
            CircuitState::HalfOpen => None,
        };
        match admission {
            Some(_) => inner.total_calls += 1,
            None => inner.rejected_calls += 1,
        }
        admission
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        inner.trial_in_flight = false;
        if inner.state != CircuitState::Closed {
            inner.state = CircuitState::Closed;
            inner.opened_at = None;
            info!(dependency = %self.name, "Circuit breaker closed after successful call");
        }
    }

    fn record_failure(&self, admission: Admission) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.total_failures += 1;

        let reopen_after_trial =
            admission == Admission::Trial && inner.state == CircuitState::HalfOpen;
        let trip = inner.state == CircuitState::Closed
            && inner.consecutive_failures >= self.config.failure_threshold;

        if admission == Admission::Trial {
            inner.trial_in_flight = false;
        }

        if reopen_after_trial || trip {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            metrics::counter!("circuit_breaker_opened_total", "dependency" => self.name.clone())
                .increment(1);
            warn!(
                dependency = %self.name,
                consecutive_failures = inner.consecutive_failures,
                cooldown_ms = self.config.cooldown.as_millis() as u64,
                "Circuit breaker opened"
            );
        } else {
            debug!(
                dependency = %self.name,
                consecutive_failures = inner.consecutive_failures,
                "Call failed"
            );
        }
    }
}
