//! A dependency going down and coming back, as seen through the guard.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::future::join_all;
use resilience::{
    CircuitState, DependencyGuard, DependencyPolicy, RequestDeduplicator, ResilienceError,
};

struct FlakyUpstream {
    healthy: AtomicBool,
    calls: AtomicUsize,
}

impl FlakyUpstream {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            healthy: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    async fn fetch(&self) -> Result<&'static str, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.healthy.load(Ordering::SeqCst) {
            Ok("payload")
        } else {
            Err("503 service unavailable".to_string())
        }
    }
}

#[tokio::test]
async fn outage_trips_then_recovers_after_cooldown() {
    let upstream = FlakyUpstream::new();
    let guard = DependencyGuard::new(
        "enhancement",
        DependencyPolicy::new(3, Duration::from_millis(50)),
    );

    for _ in 0..3 {
        let result = guard.call(|| upstream.fetch()).await;
        assert!(matches!(result, Err(ResilienceError::Operation(_))));
    }
    assert_eq!(guard.state(), CircuitState::Open);

    // While open, nothing reaches the upstream.
    let result = guard.call(|| upstream.fetch()).await;
    assert!(result.unwrap_err().is_breaker_open());
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 3);

    upstream.healthy.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(guard.call(|| upstream.fetch()).await.unwrap(), "payload");
    assert_eq!(guard.state(), CircuitState::Closed);
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn failed_trial_reopens() {
    let upstream = FlakyUpstream::new();
    let guard = DependencyGuard::new("vendor", DependencyPolicy::new(1, Duration::from_millis(30)));

    let _ = guard.call(|| upstream.fetch()).await;
    assert_eq!(guard.state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(40)).await;
    let _ = guard.call(|| upstream.fetch()).await;
    assert_eq!(guard.state(), CircuitState::Open);

    // Fresh cooldown: an immediate retry is rejected.
    let result = guard.call(|| upstream.fetch()).await;
    assert!(result.unwrap_err().is_breaker_open());
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn deduplicated_guarded_calls_hit_upstream_once() {
    let upstream = FlakyUpstream::new();
    upstream.healthy.store(true, Ordering::SeqCst);
    let guard = Arc::new(DependencyGuard::new("storage", DependencyPolicy::default()));
    let dedup = Arc::new(RequestDeduplicator::<Result<&'static str, String>>::new("storage"));

    let tasks = (0..8).map(|_| {
        let upstream = upstream.clone();
        let guard = guard.clone();
        let dedup = dedup.clone();
        tokio::spawn(async move {
            dedup
                .run("artifact-1", || async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    guard
                        .call(|| upstream.fetch())
                        .await
                        .map_err(|e| e.to_string())
                })
                .await
        })
    });

    for result in join_all(tasks).await {
        assert_eq!(result.unwrap().unwrap(), "payload");
    }
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
    assert_eq!(dedup.in_flight(), 0);
}
