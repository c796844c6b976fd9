//! Block identity types and size-class rounding

use core::fmt;

use crate::error::{PoolError, PoolResult};

/// Granularity of every pooled block, in bytes.
///
/// Matches the alignment guarantee of typical device `malloc` primitives, so
/// two requests rounding to the same multiple share a free-list bucket.
pub const ALLOCATION_UNIT: usize = 256;

/// Memory size constants
pub mod size {
    /// 1 Kilobyte
    pub const KB: usize = 1024;

    /// 1 Megabyte
    pub const MB: usize = 1024 * KB;

    /// 1 Gigabyte
    pub const GB: usize = 1024 * MB;
}

/// Identifier of a compute device (ordinal as reported by the driver)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceId(u32);

impl DeviceId {
    /// Create a device id from its ordinal
    #[must_use]
    pub const fn new(ordinal: u32) -> Self {
        Self(ordinal)
    }

    /// Device ordinal
    #[must_use]
    pub const fn ordinal(self) -> u32 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device:{}", self.0)
    }
}

impl From<u32> for DeviceId {
    fn from(ordinal: u32) -> Self {
        Self(ordinal)
    }
}

/// Opaque address of device memory.
///
/// Device addresses are not dereferenceable from the host, so they are kept
/// as plain integers and only ever compared or handed back to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DevicePtr(u64);

impl DevicePtr {
    /// Address carried by zero-size blocks
    pub const NULL: Self = Self(0);

    /// Wrap a raw device address
    #[must_use]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Raw device address
    #[must_use]
    pub const fn addr(self) -> u64 {
        self.0
    }

    /// Whether this is the null address
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for DevicePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// One contiguous raw device allocation tracked by a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Block {
    ptr: DevicePtr,
    size: usize,
    device: DeviceId,
}

impl Block {
    /// Describe a raw allocation of `size` bytes at `ptr` on `device`
    #[must_use]
    pub const fn new(ptr: DevicePtr, size: usize, device: DeviceId) -> Self {
        Self { ptr, size, device }
    }

    /// The distinguished block handed out for zero-byte requests
    #[must_use]
    pub const fn zero_sized(device: DeviceId) -> Self {
        Self::new(DevicePtr::NULL, 0, device)
    }

    /// Device address of the block
    #[must_use]
    pub const fn ptr(&self) -> DevicePtr {
        self.ptr
    }

    /// Size in bytes (a multiple of [`ALLOCATION_UNIT`] for pooled blocks)
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Device the memory lives on
    #[must_use]
    pub const fn device(&self) -> DeviceId {
        self.device
    }

    /// Whether this is a zero-size block
    #[must_use]
    pub const fn is_zero_sized(&self) -> bool {
        self.size == 0
    }
}

/// Round `size` up to the next multiple of [`ALLOCATION_UNIT`].
///
/// Zero stays zero.
#[inline]
pub fn round_up(size: usize) -> PoolResult<usize> {
    size.checked_next_multiple_of(ALLOCATION_UNIT)
        .ok_or_else(|| PoolError::size_overflow(size))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, 0)]
    #[case(1, 256)]
    #[case(100, 256)]
    #[case(200, 256)]
    #[case(256, 256)]
    #[case(257, 512)]
    #[case(1000, 1024)]
    #[case(1024, 1024)]
    fn test_round_up(#[case] requested: usize, #[case] expected: usize) {
        assert_eq!(round_up(requested).unwrap(), expected);
    }

    #[test]
    fn test_round_up_overflow() {
        let err = round_up(usize::MAX).unwrap_err();
        assert_eq!(err, PoolError::SizeOverflow { size: usize::MAX });
    }

    #[test]
    fn test_zero_sized_block() {
        let block = Block::zero_sized(DeviceId::new(3));
        assert!(block.is_zero_sized());
        assert!(block.ptr().is_null());
        assert_eq!(block.device(), DeviceId::new(3));
    }

    #[test]
    fn test_display() {
        assert_eq!(DeviceId::new(2).to_string(), "device:2");
        assert_eq!(DevicePtr::new(0x2a00).to_string(), "0x2a00");
    }
}
