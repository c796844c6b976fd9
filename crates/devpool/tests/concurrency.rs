//! Many threads sharing one multi-device pool.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use nebula_devpool::prelude::*;
use nebula_devpool::testing::ScriptedAllocator;

const THREADS: u32 = 8;
const ROUNDS: usize = 200;

#[test]
fn threads_on_separate_devices() {
    let raw = Arc::new(ScriptedAllocator::new());
    let pool = Arc::new(
        MultiDevicePool::with_allocator(PoolConfig::new(64 * 1024), raw.clone()).unwrap(),
    );

    let workers: Vec<_> = (0..THREADS)
        .map(|ordinal| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                ThreadDeviceContext::set(DeviceId::new(ordinal % 4));
                for round in 0..ROUNDS {
                    let size = 256 * (1 + round % 8);
                    let handle = pool.allocate(size).unwrap();
                    assert_eq!(handle.device(), DeviceId::new(ordinal % 4));
                    assert_eq!(handle.size(), size);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(pool.devices().len(), 4);
    for stats in pool.stats() {
        assert_eq!(stats.in_use_blocks, 0);
        assert!(stats.free_bytes < stats.max_size);
        assert!(stats.hits > 0);
    }

    pool.purge_all();
    assert_eq!(raw.live_blocks(), 0);
    assert_eq!(raw.double_frees(), 0);
}

#[test]
fn threads_sharing_one_device_never_share_a_block() {
    let raw = Arc::new(ScriptedAllocator::new());
    let pool = Arc::new(
        MultiDevicePool::with_allocator(PoolConfig::new(1 << 20), raw.clone())
            .unwrap()
            .with_device_context(FixedDevice(DeviceId::new(0))),
    );

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                for _ in 0..ROUNDS / 16 {
                    let held: Vec<_> = (0..16).map(|_| pool.allocate(512).unwrap()).collect();
                    let distinct: HashSet<_> = held.iter().map(Handle::ptr).collect();
                    assert_eq!(distinct.len(), held.len());
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let pool0 = pool.get(DeviceId::new(0)).unwrap();
    assert_eq!(pool0.in_use_count(), 0);
    assert_eq!(raw.double_frees(), 0);
}
