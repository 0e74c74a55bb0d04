use std::io::Cursor;

use criterion::{Criterion, criterion_group, criterion_main};
use image::{ImageFormat, RgbImage};
use resilience::{
    BreakerConfig, CircuitBreaker, DependencyGuard, DependencyPolicy, IntegrityVerifier,
    RequestDeduplicator,
};

fn bench_breaker(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let breaker = CircuitBreaker::new("bench", BreakerConfig::default());

    c.bench_function("circuit_breaker_closed_call", |b| {
        b.to_async(&rt).iter(|| async {
            breaker.call(|| async { Ok::<_, ()>(1) }).await.unwrap();
        })
    });
}

fn bench_guard(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let guard = DependencyGuard::new("bench", DependencyPolicy::default());

    c.bench_function("dependency_guard_call", |b| {
        b.to_async(&rt).iter(|| async {
            guard.call(|| async { Ok::<_, ()>(1) }).await.unwrap();
        })
    });
}

fn bench_dedup(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let dedup = RequestDeduplicator::<u64>::new("bench");

    c.bench_function("dedup_single_caller", |b| {
        b.to_async(&rt).iter(|| async {
            dedup.run("key", || async { 1 }).await;
        })
    });
}

fn bench_integrity(c: &mut Criterion) {
    let mut bytes = Cursor::new(Vec::new());
    RgbImage::new(512, 512)
        .write_to(&mut bytes, ImageFormat::Png)
        .unwrap();
    let bytes = bytes.into_inner();
    let verifier = IntegrityVerifier::default();

    c.bench_function("integrity_verify_png_header", |b| {
        b.iter(|| verifier.verify(bytes.len(), &bytes).unwrap())
    });
}

criterion_group!(benches, bench_breaker, bench_guard, bench_dedup, bench_integrity);
criterion_main!(benches);
