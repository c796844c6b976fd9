//! Pool benchmarks
//!
//! Compares cached allocation against going to the raw allocator every time

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use nebula_devpool::prelude::*;
use std::hint::black_box;
use std::sync::Arc;

const SIZES: [usize; 4] = [256, 4096, 64 * 1024, 1024 * 1024];

/// Benchmark single allocate/release cycle
fn bench_single_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_cycle");

    for size in SIZES {
        group.throughput(Throughput::Bytes(size as u64));

        // Pooled: every iteration after the first is a cache hit
        group.bench_with_input(BenchmarkId::new("pooled", size), &size, |b, &size| {
            let pool = SingleDevicePool::with_system_allocator(
                DeviceId::new(0),
                PoolConfig::from_megabytes(64),
            )
            .unwrap();

            b.iter(|| {
                let handle = pool.allocate(black_box(size)).unwrap();
                black_box(handle.ptr());
            });
        });

        // Caching disabled (baseline)
        group.bench_with_input(BenchmarkId::new("uncached", size), &size, |b, &size| {
            let pool = SingleDevicePool::with_system_allocator(
                DeviceId::new(0),
                PoolConfig::caching_disabled(),
            )
            .unwrap();

            b.iter(|| {
                let handle = pool.allocate(black_box(size)).unwrap();
                black_box(handle.ptr());
            });
        });

        // Raw allocator (baseline)
        group.bench_with_input(BenchmarkId::new("raw", size), &size, |b, &size| {
            let raw = SystemAllocator::new();

            b.iter(|| {
                let block = raw.allocate(DeviceId::new(0), black_box(size)).unwrap();
                raw.free(black_box(block));
            });
        });
    }

    group.finish();
}

/// Benchmark batch allocations with mixed size classes
fn bench_mixed_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed_batch");
    group.throughput(Throughput::Elements(100));

    group.bench_function("pooled_100_mixed", |b| {
        let pool = SingleDevicePool::with_system_allocator(
            DeviceId::new(0),
            PoolConfig::from_megabytes(64),
        )
        .unwrap();

        b.iter(|| {
            let handles: Vec<_> = (0..100)
                .map(|i| pool.allocate(256 * (1 + i % 16)).unwrap())
                .collect();
            black_box(&handles);
        });
    });

    group.finish();
}

/// Benchmark routing through the multi-device front-end
fn bench_multi_device(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_device");

    group.bench_function("current_device_4k", |b| {
        let pool = MultiDevicePool::new(PoolConfig::from_megabytes(64)).unwrap();

        b.iter(|| {
            let handle = pool.allocate(black_box(4096)).unwrap();
            black_box(handle.ptr());
        });
    });

    group.bench_function("through_hook_4k", |b| {
        let hook = AllocatorHook::new();
        hook.install(Arc::new(
            MultiDevicePool::new(PoolConfig::from_megabytes(64)).unwrap(),
        ));

        b.iter(|| {
            let handle = hook.allocate(black_box(4096)).unwrap();
            black_box(handle.ptr());
        });
    });

    group.bench_function("round_robin_4_devices", |b| {
        let pool = MultiDevicePool::new(PoolConfig::from_megabytes(64)).unwrap();
        let mut ordinal = 0_u32;

        b.iter(|| {
            ordinal = (ordinal + 1) % 4;
            let handle = ThreadDeviceContext::with_device(DeviceId::new(ordinal), || {
                pool.allocate(black_box(4096)).unwrap()
            });
            black_box(handle.ptr());
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_single_cycle,
    bench_mixed_batch,
    bench_multi_device
);
criterion_main!(benches);
