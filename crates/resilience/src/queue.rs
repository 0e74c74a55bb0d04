//! Bounded-concurrency admission for calls to a rate-limited dependency.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::debug;

use crate::error::ResilienceError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Timed out after {0:?} waiting for a slot")]
    Timeout(Duration),

    #[error("Queue has been closed")]
    Closed,
}

/// A held concurrency slot. The slot is released when this is dropped.
#[derive(Debug)]
pub struct QueuePermit {
    _permit: OwnedSemaphorePermit,
    queue: Arc<QueueGauge>,
}

impl Drop for QueuePermit {
    fn drop(&mut self) {
        let in_flight = self.queue.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        self.queue.publish(in_flight);
    }
}

#[derive(Debug)]
struct QueueGauge {
    name: String,
    in_flight: AtomicUsize,
    waiting: AtomicUsize,
}

impl QueueGauge {
    fn publish(&self, in_flight: usize) {
        metrics::gauge!("bounded_queue_in_flight", "dependency" => self.name.clone())
            .set(in_flight as f64);
    }
}

/// Admits up to `max_concurrent` holders at once; later arrivals wait in
/// FIFO order (the underlying semaphore is fair).
#[derive(Debug, Clone)]
pub struct BoundedQueue {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    gauge: Arc<QueueGauge>,
}

impl BoundedQueue {
    /// Creates a queue admitting `max_concurrent` calls at a time.
    pub fn new(name: impl Into<String>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            gauge: Arc::new(QueueGauge {
                name: name.into(),
                in_flight: AtomicUsize::new(0),
                waiting: AtomicUsize::new(0),
            }),
        }
    }

    /// Returns the dependency name.
    pub fn name(&self) -> &str {
        &self.gauge.name
    }

    /// Returns the concurrency cap.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Number of calls currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.gauge.in_flight.load(Ordering::SeqCst)
    }

    /// Number of calls waiting for a slot.
    pub fn waiting(&self) -> usize {
        self.gauge.waiting.load(Ordering::SeqCst)
    }

    /// Waits for a slot, giving up after `timeout` if one is given.
    pub async fn acquire(&self, timeout: Option<Duration>) -> Result<QueuePermit, QueueError> {
        self.gauge.waiting.fetch_add(1, Ordering::SeqCst);
        let start = Instant::now();
        let acquire = self.semaphore.clone().acquire_owned();
        let permit = match timeout {
            Some(limit) => match tokio::time::timeout(limit, acquire).await {
                Ok(result) => result.map_err(|_| QueueError::Closed),
                Err(_) => Err(QueueError::Timeout(limit)),
            },
            None => acquire.await.map_err(|_| QueueError::Closed),
        };
        self.gauge.waiting.fetch_sub(1, Ordering::SeqCst);

        let permit = permit.inspect_err(|e| {
            debug!(dependency = %self.gauge.name, error = %e, "Queue admission failed");
        })?;
        let in_flight = self.gauge.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.gauge.publish(in_flight);
        debug!(
            dependency = %self.gauge.name,
            waited_ms = start.elapsed().as_millis() as u64,
            in_flight,
            "Queue slot acquired"
        );
        Ok(QueuePermit {
            _permit: permit,
            queue: self.gauge.clone(),
        })
    }

    /// Runs `operation` while holding a slot.
    pub async fn run<F, Fut, T, E>(
        &self,
        timeout: Option<Duration>,
        operation: F,
    ) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let _permit = self.acquire(timeout).await.map_err(|e| self.reject(e))?;
        operation().await.map_err(ResilienceError::Operation)
    }

    pub(crate) fn reject<E>(&self, error: QueueError) -> ResilienceError<E> {
        match error {
            QueueError::Timeout(waited) => ResilienceError::QueueTimeout {
                dependency: self.gauge.name.clone(),
                waited,
            },
            // A closed queue admits nothing, same as an exhausted wait.
            QueueError::Closed => ResilienceError::QueueTimeout {
                dependency: self.gauge.name.clone(),
                waited: Duration::ZERO,
            },
        }
    }
}
