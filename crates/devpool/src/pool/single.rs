//! Single-device free-list pool
//!
//! # Ownership
//!
//! Every pooled [`Block`] lives in exactly one place at a time:
//! - the in-use map, from `allocate` until `release`
//! - a free bucket (LIFO stack keyed by rounded size) while cached
//! - the raw allocator, after an eviction or a purge
//!
//! A [`Handle`] carries a `Weak` link back to its pool. Dropping or
//! releasing the handle returns the block; if the pool is already gone the
//! release is a no-op and the block is left to the backend.

use core::fmt;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::DeviceAllocator;
use super::stats::{Counters, PoolStats};
use crate::block::{Block, DeviceId, DevicePtr, round_up};
use crate::config::PoolConfig;
use crate::error::{PoolError, PoolResult};
use crate::raw::{RawAllocError, RawAllocator, SystemAllocator};

#[derive(Default)]
struct PoolState {
    in_use: HashMap<DevicePtr, Block>,
    free: HashMap<usize, Vec<Block>>,
    /// Sum of block sizes across `free`
    free_bytes: usize,
    counters: Counters,
}

impl PoolState {
    fn pop_free(&mut self, size: usize) -> Option<Block> {
        let block = self.free.get_mut(&size)?.pop()?;
        self.free_bytes -= block.size();
        Some(block)
    }

    fn push_free(&mut self, block: Block) {
        self.free_bytes += block.size();
        self.free.entry(block.size()).or_default().push(block);
    }

    fn free_block_count(&self) -> usize {
        self.free.values().map(Vec::len).sum()
    }
}

/// Size-bucketed block cache for one device
///
/// # Example
/// ```
/// use nebula_devpool::prelude::*;
///
/// let pool = SingleDevicePool::with_system_allocator(DeviceId::new(0), PoolConfig::new(4096))?;
///
/// let handle = pool.allocate(100)?;
/// assert_eq!(handle.size(), 256);
/// let ptr = handle.ptr();
///
/// // Dropping the handle caches the block...
/// drop(handle);
/// assert_eq!(pool.count_free_blocks(), 1);
///
/// // ...and the next request of the same size class reuses it.
/// assert_eq!(pool.allocate(200)?.ptr(), ptr);
/// # Ok::<(), nebula_devpool::PoolError>(())
/// ```
pub struct SingleDevicePool {
    device: DeviceId,
    max_size: usize,
    allocator: Arc<dyn RawAllocator>,
    state: Mutex<PoolState>,
    this: Weak<SingleDevicePool>,
}

impl SingleDevicePool {
    /// Create a pool for `device` in front of `allocator`
    pub fn new(
        device: DeviceId,
        config: PoolConfig,
        allocator: Arc<dyn RawAllocator>,
    ) -> PoolResult<Arc<Self>> {
        config.validate()?;
        Ok(Self::build(device, config, allocator))
    }

    /// Create a pool backed by [`SystemAllocator`]
    pub fn with_system_allocator(device: DeviceId, config: PoolConfig) -> PoolResult<Arc<Self>> {
        Self::new(device, config, Arc::new(SystemAllocator::new()))
    }

    /// Construct without validating `config`
    pub(crate) fn build(
        device: DeviceId,
        config: PoolConfig,
        allocator: Arc<dyn RawAllocator>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            device,
            max_size: config.max_size,
            allocator,
            state: Mutex::new(PoolState::default()),
            this: this.clone(),
        })
    }

    /// Allocate `size` bytes, reusing a cached block of the same size class
    /// when one is available.
    ///
    /// A zero-byte request returns a zero-size handle without touching the
    /// pool. On raw exhaustion the free buckets are purged and the raw
    /// allocation is retried once.
    pub fn allocate(&self, size: usize) -> PoolResult<Handle> {
        if size == 0 {
            return Ok(Handle::zero_sized(self.device));
        }
        let size = round_up(size)?;

        let mut state = self.state.lock();
        let block = if let Some(block) = state.pop_free(size) {
            state.counters.hits += 1;
            trace!(device = %self.device, size, ptr = %block.ptr(), "reused cached block");
            block
        } else {
            state.counters.misses += 1;
            self.allocate_raw(&mut state, size)?
        };

        state.in_use.insert(block.ptr(), block);
        drop(state);

        Ok(Handle {
            block,
            pool: Some(self.this.clone()),
        })
    }

    fn allocate_raw(&self, state: &mut PoolState, size: usize) -> PoolResult<Block> {
        let block = match self.allocator.allocate(self.device, size) {
            Ok(block) => block,
            Err(RawAllocError::ResourceExhausted) => {
                warn!(
                    device = %self.device,
                    size,
                    cached_bytes = state.free_bytes,
                    "device memory exhausted, purging free blocks and retrying"
                );
                state.counters.exhaustion_recoveries += 1;
                self.purge_locked(state);

                self.allocator
                    .allocate(self.device, size)
                    .map_err(|err| self.raw_error(err, size))?
            }
            Err(err) => return Err(self.raw_error(err, size)),
        };

        debug_assert_eq!(block.size(), size, "raw allocator returned a different size");
        state.counters.raw_allocations += 1;
        debug!(device = %self.device, size, ptr = %block.ptr(), "raw allocation");
        Ok(block)
    }

    fn raw_error(&self, err: RawAllocError, size: usize) -> PoolError {
        match err {
            RawAllocError::ResourceExhausted => PoolError::resource_exhausted(self.device, size),
            RawAllocError::Failed(reason) => PoolError::allocation_failed(self.device, size, reason),
        }
    }

    /// Release the block at `ptr`.
    ///
    /// The block is cached when the free buckets plus this block stay below
    /// the retention budget, and returned to the raw allocator otherwise.
    /// Releasing a pointer that is not in use fails with
    /// [`PoolError::NotOwned`]. `size` is only checked against the recorded
    /// size class; a mismatch is logged and the recorded size wins.
    pub fn release(&self, ptr: DevicePtr, size: usize) -> PoolResult<()> {
        if ptr.is_null() && size == 0 {
            return Ok(());
        }
        let mut state = self.state.lock();
        let block = state
            .in_use
            .remove(&ptr)
            .ok_or_else(|| PoolError::not_owned(self.device, ptr))?;
        state.counters.releases += 1;

        if round_up(size).ok() != Some(block.size()) {
            warn!(
                device = %self.device,
                %ptr,
                requested = size,
                actual = block.size(),
                "release size does not match the allocated size class"
            );
        }

        let size = block.size();
        if state.free_bytes + size < self.max_size {
            state.push_free(block);
            trace!(device = %self.device, size, %ptr, "cached released block");
        } else {
            state.counters.evictions += 1;
            state.counters.raw_frees += 1;
            drop(state);
            debug!(device = %self.device, size, %ptr, "retention budget full, freeing block");
            self.allocator.free(block);
        }
        Ok(())
    }

    /// Return every cached block to the raw allocator.
    ///
    /// Blocks in use are untouched.
    pub fn purge_free(&self) {
        let mut state = self.state.lock();
        self.purge_locked(&mut state);
    }

    fn purge_locked(&self, state: &mut PoolState) {
        let bytes = state.free_bytes;
        let mut blocks = 0_u64;
        for (_, bucket) in state.free.drain() {
            for block in bucket {
                self.allocator.free(block);
                blocks += 1;
            }
        }
        state.free_bytes = 0;
        state.counters.raw_frees += blocks;
        state.counters.purges += 1;
        debug!(device = %self.device, blocks, bytes, "purged free blocks");
    }

    /// Number of blocks cached across all buckets
    pub fn count_free_blocks(&self) -> usize {
        self.state.lock().free_block_count()
    }

    /// Bytes cached across all buckets
    pub fn free_bytes(&self) -> usize {
        self.state.lock().free_bytes
    }

    /// Number of blocks currently handed out
    pub fn in_use_count(&self) -> usize {
        self.state.lock().in_use.len()
    }

    /// Bytes currently handed out
    pub fn in_use_bytes(&self) -> usize {
        self.state.lock().in_use.values().map(Block::size).sum()
    }

    /// Whether `ptr` is currently handed out by this pool
    pub fn owns(&self, ptr: DevicePtr) -> bool {
        self.state.lock().in_use.contains_key(&ptr)
    }

    /// Device this pool serves
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Retention budget in bytes
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Snapshot of counters and gauges
    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            free_blocks: state.free_block_count(),
            free_bytes: state.free_bytes,
            in_use_blocks: state.in_use.len(),
            in_use_bytes: state.in_use.values().map(Block::size).sum(),
            ..PoolStats::from_counters(self.device, self.max_size, state.counters)
        }
    }
}

impl DeviceAllocator for SingleDevicePool {
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

impl fmt::Debug for SingleDevicePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleDevicePool")
            .field("device", &self.device)
            .field("max_size", &self.max_size)
            .field("allocator", &self.allocator.name())
            .finish_non_exhaustive()
    }
}

impl Drop for SingleDevicePool {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for (_, bucket) in state.free.drain() {
            for block in bucket {
                self.allocator.free(block);
            }
        }
        if !state.in_use.is_empty() {
            debug!(
                device = %self.device,
                blocks = state.in_use.len(),
                "pool dropped with blocks still in use; their handles will not return them"
            );
        }
    }
}

/// Caller-facing ownership of one pooled block
///
/// Dropping the handle releases the block into its pool. The link to the
/// pool is weak: a handle that outlives its pool releases into nothing.
#[derive(Debug)]
pub struct Handle {
    block: Block,
    pool: Option<Weak<SingleDevicePool>>,
}

impl Handle {
    pub(crate) fn zero_sized(device: DeviceId) -> Self {
        Self {
            block: Block::zero_sized(device),
            pool: None,
        }
    }

    /// The wrapped block
    pub fn block(&self) -> Block {
        self.block
    }

    /// Device address
    pub fn ptr(&self) -> DevicePtr {
        self.block.ptr()
    }

    /// Rounded size in bytes
    pub fn size(&self) -> usize {
        self.block.size()
    }

    /// Device the memory lives on
    pub fn device(&self) -> DeviceId {
        self.block.device()
    }

    /// Whether this handle came from a zero-byte request
    pub fn is_zero_sized(&self) -> bool {
        self.block.is_zero_sized()
    }

    /// Owning pool, if it is still alive
    pub fn pool(&self) -> Option<Arc<SingleDevicePool>> {
        self.pool.as_ref().and_then(Weak::upgrade)
    }

    /// Release the block now, reporting ownership errors
    pub fn release(mut self) -> PoolResult<()> {
        self.release_inner()
    }

    /// Detach the block from automatic release.
    ///
    /// The caller becomes responsible for calling
    /// [`SingleDevicePool::release`] with the block's pointer and size.
    pub fn into_block(mut self) -> Block {
        self.pool = None;
        self.block
    }

    fn release_inner(&mut self) -> PoolResult<()> {
        let Some(pool) = self.pool.take() else {
            return Ok(());
        };
        match pool.upgrade() {
            Some(pool) => pool.release(self.block.ptr(), self.block.size()),
            None => {
                debug!(
                    device = %self.block.device(),
                    ptr = %self.block.ptr(),
                    size = self.block.size(),
                    "owning pool is gone, release is a no-op"
                );
                Ok(())
            }
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if let Err(err) = self.release_inner() {
            warn!(%err, "failed to release block on handle drop");
        }
    }
}
