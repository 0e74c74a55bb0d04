use std::time::Duration;

use thiserror::Error;

/// Why a protected call did not produce the operation's own result.
///
/// The first three variants are raised by the protection layer itself;
/// `Operation` carries the wrapped call's error unchanged.
#[derive(Debug, Clone, Error)]
pub enum ResilienceError<E> {
    /// The breaker is open; the dependency was not contacted.
    #[error("Circuit breaker is open for {dependency}")]
    BreakerOpen { dependency: String },

    /// No concurrency slot became free in time; the dependency was not contacted.
    #[error("Timed out after {waited:?} waiting for a {dependency} slot")]
    QueueTimeout { dependency: String, waited: Duration },

    /// The call started but did not finish within its deadline.
    #[error("{dependency} call timed out after {after:?}")]
    CallTimeout { dependency: String, after: Duration },

    /// The operation itself failed.
    #[error("{0}")]
    Operation(E),
}

impl<E> ResilienceError<E> {
    /// Returns true if the dependency was never contacted.
    pub fn is_rejected(&self) -> bool {
        matches!(
            self,
            ResilienceError::BreakerOpen { .. } | ResilienceError::QueueTimeout { .. }
        )
    }

    /// Returns true if the breaker rejected the call.
    pub fn is_breaker_open(&self) -> bool {
        matches!(self, ResilienceError::BreakerOpen { .. })
    }

    /// Returns true if the call or the queue wait timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ResilienceError::QueueTimeout { .. } | ResilienceError::CallTimeout { .. }
        )
    }

    /// Converts the operation error, keeping protection-layer variants as they are.
    pub fn map_operation<F>(self, f: impl FnOnce(E) -> F) -> ResilienceError<F> {
        match self {
            ResilienceError::BreakerOpen { dependency } => {
                ResilienceError::BreakerOpen { dependency }
            }
            ResilienceError::QueueTimeout { dependency, waited } => {
                ResilienceError::QueueTimeout { dependency, waited }
            }
            ResilienceError::CallTimeout { dependency, after } => {
                ResilienceError::CallTimeout { dependency, after }
            }
            ResilienceError::Operation(e) => ResilienceError::Operation(f(e)),
        }
    }
}
