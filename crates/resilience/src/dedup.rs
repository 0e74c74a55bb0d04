//! Collapses concurrent calls that share a key into one in-flight operation.
//!
//! The first caller for a key runs the operation; callers arriving while it
//! runs wait for and receive a clone of the same result, success or failure.
//! The key is evicted as soon as the operation completes, so a later call
//! starts a fresh operation.

use std::collections::HashMap;
use std::future::Future;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

type Slot<T> = watch::Receiver<Option<T>>;

/// Removes the leader's key if its future is dropped before completing.
/// Waiting followers then see the channel close and elect a new leader.
struct LeaderGuard<'a, T> {
    inflight: &'a Mutex<HashMap<String, Slot<T>>>,
    key: &'a str,
    armed: bool,
}

impl<T> Drop for LeaderGuard<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.inflight.lock().remove(self.key);
        }
    }
}

/// Shares one in-flight operation per key between concurrent callers.
pub struct RequestDeduplicator<T> {
    name: String,
    inflight: Mutex<HashMap<String, Slot<T>>>,
}

impl<T> RequestDeduplicator<T>
where
    T: Clone + Send + Sync,
{
    /// Creates a deduplicator; `name` labels its logs and metrics.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Number of keys with an operation currently running.
    pub fn in_flight(&self) -> usize {
        self.inflight.lock().len()
    }

    /// Returns true if an operation for `key` is running.
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.inflight.lock().contains_key(key)
    }

    /// Runs `operation` unless one is already running for `key`, in which
    /// case the running operation's result is returned instead.
    pub async fn run<F, Fut>(&self, key: &str, operation: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let tx = loop {
            let mut rx = {
                let mut inflight = self.inflight.lock();
                match inflight.get(key) {
                    Some(rx) => rx.clone(),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        inflight.insert(key.to_string(), rx);
                        break tx;
                    }
                }
            };

            metrics::counter!("dedup_shared_total", "dependency" => self.name.clone())
                .increment(1);
            debug!(dependency = %self.name, key, "Joining in-flight request");

            if let Ok(value) = rx.wait_for(Option::is_some).await
                && let Some(result) = value.as_ref()
            {
                return result.clone();
            }
            // The leader was dropped without a result; try to lead ourselves.
        };

        let mut guard = LeaderGuard {
            inflight: &self.inflight,
            key,
            armed: true,
        };
        let result = operation().await;

        self.inflight.lock().remove(key);
        guard.armed = false;
        tx.send_replace(Some(result.clone()));
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use futures_util::future::join_all;

    use super::*;

    #[tokio::test]
    async fn concurrent_calls_share_one_operation() {
        let dedup = Arc::new(RequestDeduplicator::<Result<u32, String>>::new("test"));
        let calls = Arc::new(AtomicU32::new(0));

        let tasks = (0..10).map(|_| {
            let dedup = dedup.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                dedup
                    .run("artifact-1", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(42)
                    })
                    .await
            })
        });
        let results = join_all(tasks).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap(), Ok(42));
        }
        assert_eq!(dedup.in_flight(), 0);
    }

    #[tokio::test]
    async fn failures_are_shared_too() {
        let dedup = Arc::new(RequestDeduplicator::<Result<u32, String>>::new("test"));
        let calls = Arc::new(AtomicU32::new(0));

        let tasks = (0..5).map(|_| {
            let dedup = dedup.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                dedup
                    .run("k", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Err("upstream down".to_string())
                    })
                    .await
            })
        });
        for result in join_all(tasks).await {
            assert_eq!(result.unwrap(), Err("upstream down".to_string()));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn key_is_evicted_after_completion() {
        let dedup = RequestDeduplicator::<u32>::new("test");
        let calls = AtomicU32::new(0);

        let first = dedup
            .run("k", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                1
            })
            .await;
        assert!(!dedup.is_in_flight("k"));
        let second = dedup
            .run("k", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                2
            })
            .await;

        assert_eq!((first, second), (1, 2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn different_keys_run_independently() {
        let dedup = RequestDeduplicator::<&'static str>::new("test");
        let (a, b) = tokio::join!(
            dedup.run("a", || async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                "a"
            }),
            dedup.run("b", || async { "b" }),
        );
        assert_eq!((a, b), ("a", "b"));
    }

    #[tokio::test]
    async fn follower_takes_over_when_leader_is_dropped() {
        let dedup = Arc::new(RequestDeduplicator::<u32>::new("test"));

        let leader = {
            let dedup = dedup.clone();
            tokio::spawn(async move {
                dedup
                    .run("k", || async {
                        tokio::time::sleep(Duration::from_secs(10)).await;
                        1
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(dedup.is_in_flight("k"));

        let follower = {
            let dedup = dedup.clone();
            tokio::spawn(async move { dedup.run("k", || async { 2 }).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        leader.abort();

        let value = tokio::time::timeout(Duration::from_secs(1), follower)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value, 2);
        assert!(!dedup.is_in_flight("k"));
    }
}
