//! Session Performance Benchmarks for castlane
//!
//! Run with: cargo bench --bench session_benchmarks
//!
//! These benchmarks measure lane round trips and registry selection, the two
//! paths every user command goes through.

use castlane::cycler::next_index;
use castlane::testing::{SyntheticBackend, SyntheticTransport};
use castlane::{Category, MediaRegistry, MemoryStore, SessionConfig, SessionCoordinator};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

fn bench_cycler(c: &mut Criterion) {
    let mut group = c.benchmark_group("cycler");
    for size in [2usize, 16, 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut index = 0;
            b.iter(|| {
                index = next_index(black_box(size), index, true).unwrap_or(0);
            });
        });
    }
    group.finish();
}

fn bench_registry_select(c: &mut Criterion) {
    let registry = MediaRegistry::new(
        Arc::new(SyntheticBackend::new()),
        Arc::new(MemoryStore::new()),
    );
    c.bench_function("registry_select_next_camera", |b| {
        b.iter(|| registry.select_next(black_box(Category::VideoSource), true))
    });
    c.bench_function("registry_publish_codecs", |b| {
        let config = SessionConfig::default();
        b.iter(|| registry.publish_codecs(&config.media, &config.codec_policy))
    });
}

fn bench_lane_round_trip(c: &mut Criterion) {
    let session = match SessionCoordinator::new(
        SessionConfig::default(),
        Arc::new(SyntheticBackend::new()),
        Arc::new(SyntheticTransport::new()),
        Arc::new(MemoryStore::new()),
    ) {
        Ok(session) => session,
        Err(e) => panic!("session setup failed: {}", e),
    };

    let mut group = c.benchmark_group("lane");
    group.throughput(Throughput::Elements(1));
    group.bench_function("publish_lane_round_trip", |b| {
        b.iter(|| session.stop_publish().wait_blocking())
    });
    group.bench_function("subscribe_lane_round_trip", |b| {
        b.iter(|| session.stop_subscribe().wait_blocking())
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_cycler,
    bench_registry_select,
    bench_lane_round_trip
);
criterion_main!(benches);
