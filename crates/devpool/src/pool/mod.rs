//! Free-list device memory pools
//!
//! - [`SingleDevicePool`]: buckets, in-use tracking and eviction for one device
//! - [`MultiDevicePool`]: routes each call to the sub-pool of the current device

mod multi;
mod single;
mod stats;

pub use multi::MultiDevicePool;
pub use single::{Handle, SingleDevicePool};
pub use stats::PoolStats;

use crate::error::PoolResult;

/// Allocation entry point that can be installed in an
/// [`AllocatorHook`](crate::hook::AllocatorHook)
pub trait DeviceAllocator: Send + Sync {
    /// Allocate `size` bytes; the returned handle releases on drop
    fn allocate(&self, size: usize) -> PoolResult<Handle>;

    /// Return cached blocks to the raw allocator
    fn purge_free(&self);

    /// Number of cached blocks
    fn count_free_blocks(&self) -> usize;
}
