//! Standalone error types for nebula-devpool
//!
//! Uses thiserror for clean, idiomatic Rust error definitions.

use thiserror::Error;
use tracing::{error, warn};

use crate::block::{DeviceId, DevicePtr};

// ============================================================================
// Main Error Types
// ============================================================================

/// Device pool errors
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    // --- Allocation Errors ---
    #[error("Device memory exhausted on {device}: {size} bytes requested after purging free blocks")]
    ResourceExhausted { device: DeviceId, size: usize },

    #[error("Raw allocation of {size} bytes on {device} failed: {reason}")]
    AllocationFailed {
        device: DeviceId,
        size: usize,
        reason: String,
    },

    #[error("Size overflow while rounding {size} bytes to the allocation unit")]
    SizeOverflow { size: usize },

    // --- Ownership Errors ---
    #[error("Release of unowned or already-released block {ptr} on {device}")]
    NotOwned { device: DeviceId, ptr: DevicePtr },

    // --- Configuration Errors ---
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // --- Hook Errors ---
    #[error("No device allocator installed in the allocator hook")]
    NoAllocatorInstalled,
}

impl PoolError {
    /// Check if error is retryable
    ///
    /// Only exhaustion qualifies: releasing blocks elsewhere may free enough
    /// device memory for a later attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ResourceExhausted { .. })
    }

    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ResourceExhausted { .. } => "POOL:ALLOC:EXHAUSTED",
            Self::AllocationFailed { .. } => "POOL:ALLOC:FAILED",
            Self::SizeOverflow { .. } => "POOL:ALLOC:OVERFLOW",
            Self::NotOwned { .. } => "POOL:OWNERSHIP:NOT_OWNED",
            Self::InvalidConfig { .. } => "POOL:CONFIG:INVALID",
            Self::NoAllocatorInstalled => "POOL:HOOK:EMPTY",
        }
    }

    // ============================================================================
    // Convenience Constructors
    // ============================================================================

    /// Create resource exhausted error
    pub fn resource_exhausted(device: DeviceId, size: usize) -> Self {
        error!(%device, size, "device memory exhausted after purge and retry");

        Self::ResourceExhausted { device, size }
    }

    /// Create allocation failed error
    pub fn allocation_failed(device: DeviceId, size: usize, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        error!(%device, size, %reason, "raw device allocation failed");

        Self::AllocationFailed {
            device,
            size,
            reason,
        }
    }

    /// Create size overflow error
    pub fn size_overflow(size: usize) -> Self {
        Self::SizeOverflow { size }
    }

    /// Create not-owned error for a release the pool cannot account for
    pub fn not_owned(device: DeviceId, ptr: DevicePtr) -> Self {
        warn!(%device, %ptr, "release of a block this pool does not own");

        Self::NotOwned { device, ptr }
    }

    /// Create invalid config error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Check if this is an ownership error
    #[must_use]
    pub fn is_not_owned(&self) -> bool {
        matches!(self, Self::NotOwned { .. })
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// Result type for pool operations
pub type PoolResult<T> = core::result::Result<T, PoolError>;

/// Generic result type alias
pub type Result<T> = PoolResult<T>;

// ============================================================================
// Tests
// ============================================================================
