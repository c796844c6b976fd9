//! Pool statistics

use crate::block::DeviceId;

/// Event counters kept under the pool lock
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Counters {
    pub(crate) hits: u64,
    pub(crate) misses: u64,
    pub(crate) raw_allocations: u64,
    pub(crate) raw_frees: u64,
    pub(crate) releases: u64,
    pub(crate) evictions: u64,
    pub(crate) purges: u64,
    pub(crate) exhaustion_recoveries: u64,
}

/// Point-in-time snapshot of one device pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Device the pool serves
    pub device: DeviceId,
    /// Retention budget in bytes
    pub max_size: usize,

    /// Allocations served from a free bucket
    pub hits: u64,
    /// Allocations that needed the raw allocator
    pub misses: u64,
    /// Successful raw allocations
    pub raw_allocations: u64,
    /// Blocks handed back to the raw allocator (evictions and purges)
    pub raw_frees: u64,
    /// Successful releases
    pub releases: u64,
    /// Releases that bypassed the cache because of the budget
    pub evictions: u64,
    /// Number of purge passes
    pub purges: u64,
    /// Purge-and-retry passes triggered by exhaustion
    pub exhaustion_recoveries: u64,

    /// Blocks cached in free buckets
    pub free_blocks: usize,
    /// Bytes cached in free buckets
    pub free_bytes: usize,
    /// Blocks currently handed out
    pub in_use_blocks: usize,
    /// Bytes currently handed out
    pub in_use_bytes: usize,
}

impl PoolStats {
    pub(crate) fn from_counters(device: DeviceId, max_size: usize, counters: Counters) -> Self {
        Self {
            device,
            max_size,
            hits: counters.hits,
            misses: counters.misses,
            raw_allocations: counters.raw_allocations,
            raw_frees: counters.raw_frees,
            releases: counters.releases,
            evictions: counters.evictions,
            purges: counters.purges,
            exhaustion_recoveries: counters.exhaustion_recoveries,
            ..Self::default()
        }
    }

    /// Fraction of non-empty allocations served from the cache
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Bytes held from the raw allocator, cached or in use
    #[must_use]
    pub fn resident_bytes(&self) -> usize {
        self.free_bytes + self.in_use_bytes
    }
}
