//! Raw device allocation backends
//!
//! The pool never talks to a driver directly. Everything below it goes
//! through [`RawAllocator`], which makes the expensive primitive pluggable:
//! a CUDA/HIP binding in production, [`SystemAllocator`] by default, and
//! [`ScriptedAllocator`](crate::testing::ScriptedAllocator) in tests.

use core::alloc::Layout;
use std::collections::HashMap;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{trace, warn};

use crate::block::{ALLOCATION_UNIT, Block, DeviceId, DevicePtr};

/// Failure reported by a raw allocation backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RawAllocError {
    /// The device is out of capacity; freeing cached blocks may help
    #[error("out of device memory")]
    ResourceExhausted,

    /// Any other backend failure; never retried
    #[error("{0}")]
    Failed(String),
}

impl RawAllocError {
    /// Create a fatal backend failure
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

/// The expensive allocation primitive the pool caches in front of
pub trait RawAllocator: Send + Sync {
    /// Allocate `size` bytes on `device`.
    ///
    /// `size` is always a non-zero multiple of [`ALLOCATION_UNIT`] when
    /// called by a pool.
    fn allocate(&self, device: DeviceId, size: usize) -> Result<Block, RawAllocError>;

    /// Return a block obtained from [`allocate`](Self::allocate)
    fn free(&self, block: Block);

    /// Backend name for diagnostics
    fn name(&self) -> &'static str {
        core::any::type_name::<Self>()
    }
}

/// Default backend: 256-byte aligned host memory from the global allocator.
///
/// Stands in for the system's raw device allocator where no driver is
/// linked. An optional per-device capacity makes exhaustion reproducible.
///
/// Only blocks it handed out and has not freed yet are returned to the
/// global allocator; anything else passed to [`free`](RawAllocator::free) is
/// ignored with a warning.
#[derive(Debug, Default)]
pub struct SystemAllocator {
    capacity: Option<usize>,
    used: Mutex<Accounting>,
}

#[derive(Debug, Default)]
struct Accounting {
    live: HashMap<DevicePtr, (DeviceId, usize)>,
    per_device: HashMap<DeviceId, usize>,
}

impl SystemAllocator {
    /// Unlimited backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that reports exhaustion once a device holds `capacity` bytes
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            used: Mutex::default(),
        }
    }

    /// Bytes currently handed out on `device`
    pub fn used_bytes(&self, device: DeviceId) -> usize {
        self.used
            .lock()
            .per_device
            .get(&device)
            .copied()
            .unwrap_or(0)
    }

    fn layout(size: usize) -> Result<Layout, RawAllocError> {
        Layout::from_size_align(size, ALLOCATION_UNIT)
            .map_err(|e| RawAllocError::failed(format!("invalid layout for {size} bytes: {e}")))
    }
}

impl RawAllocator for SystemAllocator {
    fn allocate(&self, device: DeviceId, size: usize) -> Result<Block, RawAllocError> {
        if size == 0 {
            return Err(RawAllocError::failed("zero-size raw allocation"));
        }
        let layout = Self::layout(size)?;

        let mut used = self.used.lock();
        let current = used.per_device.get(&device).copied().unwrap_or(0);
        if let Some(capacity) = self.capacity
            && current.saturating_add(size) > capacity
        {
            return Err(RawAllocError::ResourceExhausted);
        }

        // SAFETY: layout has non-zero size (checked above) and a valid
        // power-of-two alignment.
        let ptr = unsafe { std::alloc::alloc(layout) };
        if ptr.is_null() {
            return Err(RawAllocError::ResourceExhausted);
        }

        let addr = DevicePtr::new(ptr as u64);
        used.live.insert(addr, (device, size));
        used.per_device.insert(device, current + size);
        trace!(%device, size, ptr = %addr, "system allocator handed out block");
        Ok(Block::new(addr, size, device))
    }

    fn free(&self, block: Block) {
        if block.is_zero_sized() {
            return;
        }

        let mut used = self.used.lock();
        let recorded = used.live.get(&block.ptr()).copied();
        if recorded != Some((block.device(), block.size())) {
            warn!(
                device = %block.device(),
                ptr = %block.ptr(),
                size = block.size(),
                ?recorded,
                "ignoring free of a block this allocator did not hand out"
            );
            return;
        }
        let Ok(layout) = Self::layout(block.size()) else {
            return;
        };
        used.live.remove(&block.ptr());
        if let Some(bytes) = used.per_device.get_mut(&block.device()) {
            *bytes = bytes.saturating_sub(block.size());
        }

        // SAFETY: `live` held this pointer with this size, so it came from
        // `alloc` with the same layout, and removing it under the lock means
        // it is deallocated at most once.
        unsafe { std::alloc::dealloc(block.ptr().addr() as *mut u8, layout) };
    }

    fn name(&self) -> &'static str {
        "system"
    }
}
