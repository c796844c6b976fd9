//! Per-device routing
//!
//! Sub-pools are created lazily the first time a device is seen. Each one
//! keeps its own budget; nothing is shared between devices except the
//! configuration and the raw allocator.

use core::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::single::{Handle, SingleDevicePool};
use super::stats::PoolStats;
use super::DeviceAllocator;
use crate::block::{DeviceId, DevicePtr};
use crate::config::PoolConfig;
use crate::device::{DeviceContext, ThreadDeviceContext};
use crate::error::{PoolError, PoolResult};
use crate::raw::{RawAllocator, SystemAllocator};

/// Pool front-end for every device in the process
///
/// # Example
/// ```
/// use nebula_devpool::prelude::*;
///
/// let pool = MultiDevicePool::new(PoolConfig::new(1 << 20))?;
///
/// let on_zero = pool.allocate(1000)?;
/// let on_one = ThreadDeviceContext::with_device(DeviceId::new(1), || pool.allocate(1000))?;
///
/// assert_eq!(on_zero.device(), DeviceId::new(0));
/// assert_eq!(on_one.device(), DeviceId::new(1));
/// # Ok::<(), nebula_devpool::PoolError>(())
/// ```
pub struct MultiDevicePool {
    config: PoolConfig,
    allocator: Arc<dyn RawAllocator>,
    context: Box<dyn DeviceContext>,
    pools: DashMap<DeviceId, Arc<SingleDevicePool>>,
}

impl MultiDevicePool {
    /// Pool backed by [`SystemAllocator`], routing by [`ThreadDeviceContext`]
    pub fn new(config: PoolConfig) -> PoolResult<Self> {
        Self::with_allocator(config, Arc::new(SystemAllocator::new()))
    }

    /// Pool in front of a custom raw allocator
    pub fn with_allocator(config: PoolConfig, allocator: Arc<dyn RawAllocator>) -> PoolResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            allocator,
            context: Box::new(ThreadDeviceContext),
            pools: DashMap::new(),
        })
    }

    /// Replace the current-device resolver
    #[must_use = "builder methods must be chained or built"]
    pub fn with_device_context<C: DeviceContext + 'static>(mut self, context: C) -> Self {
        self.context = Box::new(context);
        self
    }

    /// Device the caller currently targets
    pub fn current_device(&self) -> DeviceId {
        self.context.current_device()
    }

    /// Sub-pool for `device`, creating it on first use
    pub fn device_pool(&self, device: DeviceId) -> Arc<SingleDevicePool> {
        if let Some(pool) = self.pools.get(&device) {
            return Arc::clone(pool.value());
        }

        let pool = self.pools.entry(device).or_insert_with(|| {
            debug!(%device, max_size = self.config.max_size, "creating device pool");
            SingleDevicePool::build(device, self.config, Arc::clone(&self.allocator))
        });
        Arc::clone(pool.value())
    }

    /// Sub-pool for `device` if one exists
    pub fn get(&self, device: DeviceId) -> Option<Arc<SingleDevicePool>> {
        self.pools.get(&device).map(|pool| Arc::clone(pool.value()))
    }

    /// Allocate on the current device
    pub fn allocate(&self, size: usize) -> PoolResult<Handle> {
        let device = self.current_device();
        if size == 0 {
            return Ok(Handle::zero_sized(device));
        }
        self.device_pool(device).allocate(size)
    }

    /// Release `ptr` into the current device's pool
    pub fn release(&self, ptr: DevicePtr, size: usize) -> PoolResult<()> {
        let device = self.current_device();
        match self.get(device) {
            Some(pool) => pool.release(ptr, size),
            None if ptr.is_null() && size == 0 => Ok(()),
            None => Err(PoolError::not_owned(device, ptr)),
        }
    }

    /// Purge the current device's free buckets
    pub fn purge_free(&self) {
        if let Some(pool) = self.get(self.current_device()) {
            pool.purge_free();
        }
    }

    /// Purge the free buckets of every device
    pub fn purge_all(&self) {
        for pool in self.pools() {
            pool.purge_free();
        }
    }

    /// Cached blocks on the current device
    pub fn count_free_blocks(&self) -> usize {
        self.get(self.current_device())
            .map_or(0, |pool| pool.count_free_blocks())
    }

    /// Devices that have a sub-pool, in ascending order
    pub fn devices(&self) -> Vec<DeviceId> {
        let mut devices: Vec<_> = self.pools.iter().map(|entry| *entry.key()).collect();
        devices.sort_unstable();
        devices
    }

    /// Per-device snapshots, in ascending device order
    pub fn stats(&self) -> Vec<PoolStats> {
        let mut stats: Vec<_> = self.pools().iter().map(|pool| pool.stats()).collect();
        stats.sort_unstable_by_key(|s| s.device);
        stats
    }

    /// Shared configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    // Snapshot the sub-pools so no shard lock is held while they are driven.
    fn pools(&self) -> Vec<Arc<SingleDevicePool>> {
        self.pools
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

impl DeviceAllocator for MultiDevicePool {
    fn allocate(&self, size: usize) -> PoolResult<Handle> {
        Self::allocate(self, size)
    }

    fn purge_free(&self) {
        Self::purge_free(self);
    }

    fn count_free_blocks(&self) -> usize {
        Self::count_free_blocks(self)
    }
}

impl fmt::Debug for MultiDevicePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiDevicePool")
            .field("config", &self.config)
            .field("allocator", &self.allocator.name())
            .field("devices", &self.devices())
            .finish_non_exhaustive()
    }
}
