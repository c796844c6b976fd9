//! Testing utilities for device pools

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::block::{Block, DeviceId, DevicePtr};
use crate::raw::{RawAllocError, RawAllocator};

const BASE_ADDR: u64 = 0x7f00_0000_0000;

/// Raw allocator double with fake addresses, call counters and scripted
/// failures.
///
/// Addresses are unique for the lifetime of the allocator and never
/// dereferenced.
#[derive(Debug)]
pub struct ScriptedAllocator {
    next_addr: AtomicU64,
    allocate_calls: AtomicUsize,
    free_calls: AtomicUsize,
    double_frees: AtomicUsize,
    failures: Mutex<VecDeque<RawAllocError>>,
    live: Mutex<HashSet<DevicePtr>>,
}

impl Default for ScriptedAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedAllocator {
    /// Allocator that always succeeds until told otherwise
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_addr: AtomicU64::new(BASE_ADDR),
            allocate_calls: AtomicUsize::new(0),
            free_calls: AtomicUsize::new(0),
            double_frees: AtomicUsize::new(0),
            failures: Mutex::default(),
            live: Mutex::default(),
        }
    }

    /// Make the next allocation attempt fail with `error`.
    ///
    /// Calls queue up: two calls fail the next two attempts.
    pub fn fail_next(&self, error: RawAllocError) {
        self.failures.lock().push_back(error);
    }

    /// Allocation attempts, including failed ones
    pub fn allocate_calls(&self) -> usize {
        self.allocate_calls.load(Ordering::SeqCst)
    }

    /// Blocks returned through [`RawAllocator::free`]
    pub fn free_calls(&self) -> usize {
        self.free_calls.load(Ordering::SeqCst)
    }

    /// Frees of blocks that were not live
    pub fn double_frees(&self) -> usize {
        self.double_frees.load(Ordering::SeqCst)
    }

    /// Blocks handed out and not yet freed
    pub fn live_blocks(&self) -> usize {
        self.live.lock().len()
    }
}

impl RawAllocator for ScriptedAllocator {
    fn allocate(&self, device: DeviceId, size: usize) -> Result<Block, RawAllocError> {
        self.allocate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }

        let stride = (size as u64).max(1);
        let ptr = DevicePtr::new(self.next_addr.fetch_add(stride, Ordering::SeqCst));
        self.live.lock().insert(ptr);
        Ok(Block::new(ptr, size, device))
    }

    fn free(&self, block: Block) {
        self.free_calls.fetch_add(1, Ordering::SeqCst);
        if !self.live.lock().remove(&block.ptr()) {
            self.double_frees.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addresses_are_unique() {
        let raw = ScriptedAllocator::new();
        let a = raw.allocate(DeviceId::new(0), 256).unwrap();
        let b = raw.allocate(DeviceId::new(1), 256).unwrap();
        assert_ne!(a.ptr(), b.ptr());
        assert_eq!(raw.live_blocks(), 2);
    }

    #[test]
    fn test_scripted_failures_are_consumed_in_order() {
        let raw = ScriptedAllocator::new();
        raw.fail_next(RawAllocError::ResourceExhausted);
        raw.fail_next(RawAllocError::failed("boom"));

        assert_eq!(
            raw.allocate(DeviceId::new(0), 256),
            Err(RawAllocError::ResourceExhausted)
        );
        assert_eq!(
            raw.allocate(DeviceId::new(0), 256),
            Err(RawAllocError::failed("boom"))
        );
        assert!(raw.allocate(DeviceId::new(0), 256).is_ok());
        assert_eq!(raw.allocate_calls(), 3);
    }

    #[test]
    fn test_double_free_is_counted() {
        let raw = ScriptedAllocator::new();
        let block = raw.allocate(DeviceId::new(0), 256).unwrap();
        raw.free(block);
        raw.free(block);
        assert_eq!(raw.free_calls(), 2);
        assert_eq!(raw.double_frees(), 1);
    }
}
