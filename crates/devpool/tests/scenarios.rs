//! Worked allocate/release scenarios with a 256-byte unit and a 1 KiB budget.

use std::sync::Arc;

use nebula_devpool::prelude::*;
use nebula_devpool::testing::ScriptedAllocator;

const BUDGET: usize = 1024;

fn single() -> (Arc<SingleDevicePool>, Arc<ScriptedAllocator>) {
    let raw = Arc::new(ScriptedAllocator::new());
    let pool = SingleDevicePool::new(DeviceId::new(0), PoolConfig::new(BUDGET), raw.clone())
        .expect("valid config");
    (pool, raw)
}

#[test]
fn cache_hit_after_release() {
    let (pool, raw) = single();

    let block = pool.allocate(100).unwrap().into_block();
    assert_eq!(block.size(), 256);
    assert_eq!(pool.in_use_count(), 1);
    assert_eq!(raw.allocate_calls(), 1);

    pool.release(block.ptr(), 256).unwrap();
    assert_eq!(pool.free_bytes(), 256);

    let reused = pool.allocate(100).unwrap();
    assert_eq!(reused.ptr(), block.ptr());
    assert_eq!(raw.allocate_calls(), 1);
}

#[test]
fn release_that_would_reach_budget_is_evicted_then_purged() {
    let (pool, raw) = single();

    let blocks: Vec<Block> = (0..4)
        .map(|_| pool.allocate(256).unwrap().into_block())
        .collect();
    for block in &blocks[..3] {
        pool.release(block.ptr(), block.size()).unwrap();
    }
    assert_eq!(pool.free_bytes(), 768);

    // 768 + 256 == 1024, which is not below the budget.
    pool.release(blocks[3].ptr(), 256).unwrap();
    assert_eq!(raw.free_calls(), 1);
    assert_eq!(pool.count_free_blocks(), 3);

    pool.purge_free();
    assert_eq!(raw.free_calls(), 4);
    assert_eq!(pool.count_free_blocks(), 0);
    assert_eq!(raw.live_blocks(), 0);
    assert_eq!(raw.double_frees(), 0);
}

#[test]
fn sizes_200_and_256_share_a_bucket() {
    let (pool, raw) = single();

    drop(pool.allocate(200).unwrap());
    let handle = pool.allocate(256).unwrap();

    assert_eq!(handle.size(), 256);
    assert_eq!(raw.allocate_calls(), 1);
}

#[test]
fn single_exhaustion_is_hidden_from_caller() {
    let (pool, raw) = single();
    raw.fail_next(RawAllocError::ResourceExhausted);

    let handle = pool.allocate(512).expect("recovered after purge");

    assert_eq!(handle.size(), 512);
    assert_eq!(raw.allocate_calls(), 2);
}

#[test]
fn zero_size_requests_leave_no_trace() {
    let (pool, raw) = single();
    let before = pool.stats();

    let handle = pool.allocate(0).unwrap();
    assert_eq!(handle.block(), Block::zero_sized(DeviceId::new(0)));
    handle.release().unwrap();

    assert_eq!(pool.stats(), before);
    assert_eq!(raw.allocate_calls(), 0);
}

#[test]
fn double_release_through_pool_api() {
    let (pool, _raw) = single();
    let handle = pool.allocate(300).unwrap();
    let (ptr, size) = (handle.ptr(), handle.size());

    handle.release().unwrap();
    let err = pool.release(ptr, size).unwrap_err();

    assert!(matches!(err, PoolError::NotOwned { .. }));
    assert_eq!(err.code(), "POOL:OWNERSHIP:NOT_OWNED");
}

#[test]
fn device_activity_does_not_leak_across_devices() {
    let raw = Arc::new(ScriptedAllocator::new());
    let pool = MultiDevicePool::with_allocator(PoolConfig::new(BUDGET), raw).unwrap();

    ThreadDeviceContext::with_device(DeviceId::new(0), || {
        drop(pool.allocate(256).unwrap());
        drop(pool.allocate(512).unwrap());
        assert_eq!(pool.count_free_blocks(), 2);
    });

    ThreadDeviceContext::with_device(DeviceId::new(1), || {
        assert_eq!(pool.count_free_blocks(), 0);
        pool.purge_free();
    });

    ThreadDeviceContext::with_device(DeviceId::new(0), || {
        assert_eq!(pool.count_free_blocks(), 2);
    });
}
