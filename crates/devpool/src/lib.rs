//! # nebula-devpool
//!
//! Size-bucketed free-list pool for device memory.
//!
//! Raw device allocation is expensive. This crate sits between application
//! code and the raw allocator and caches released blocks so repeated
//! allocate/release cycles reuse memory instead of calling the driver:
//! - Requests are rounded up to a 256-byte [`ALLOCATION_UNIT`](block::ALLOCATION_UNIT)
//!   and served from a LIFO free list of that exact size class
//! - Cached bytes per device stay below a retention budget (`max_size`);
//!   releases past the budget go straight back to the raw allocator
//! - On raw exhaustion the pool purges its free lists and retries once
//! - Every device gets its own sub-pool, created on first use
//!
//! ## Quick Start
//!
//! ```rust
//! use nebula_devpool::prelude::*;
//!
//! let pool = MultiDevicePool::new(PoolConfig::from_megabytes(64))?;
//!
//! let handle = pool.allocate(1000)?;
//! assert_eq!(handle.size(), 1024);
//! let ptr = handle.ptr();
//!
//! // handle is released into the pool when dropped
//! drop(handle);
//! assert_eq!(pool.allocate(1024)?.ptr(), ptr);
//! # Ok::<(), nebula_devpool::PoolError>(())
//! ```
//!
//! ## Features
//!
//! - `serde`: `Serialize`/`Deserialize` for [`PoolConfig`] and [`DeviceId`](block::DeviceId)
//!
//! ## Architecture
//!
//! nebula-devpool follows the Nebula ecosystem patterns:
//! - Standalone error handling via [`error`] module
//! - Structured logging via `tracing`
//! - Pluggable backends behind [`RawAllocator`](raw::RawAllocator) and
//!   [`DeviceContext`](device::DeviceContext)

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(clippy::all)]
#![warn(clippy::perf)]
#![warn(clippy::pedantic)]
#![warn(rust_2018_idioms)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
// Device addresses are u64 regardless of host pointer width
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::return_self_not_must_use)]
// SystemAllocator hands out host memory through std::alloc
#![allow(unsafe_code)]

// Error types
pub mod error;

// Core modules
pub mod block;
pub mod config;
pub mod device;
pub mod hook;
pub mod lifecycle;
pub mod pool;
pub mod raw;
pub mod testing;

// Re-export core types for convenience
pub use crate::config::PoolConfig;
pub use crate::error::{PoolError, PoolResult, Result};

// Public API exports
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::block::{ALLOCATION_UNIT, Block, DeviceId, DevicePtr};
    pub use crate::config::PoolConfig;
    pub use crate::device::{DeviceContext, FixedDevice, ThreadDeviceContext};
    pub use crate::error::{PoolError, PoolResult};
    pub use crate::hook::{AllocatorHook, HookId};
    pub use crate::lifecycle::PoolInstallation;
    pub use crate::pool::{DeviceAllocator, Handle, MultiDevicePool, PoolStats, SingleDevicePool};
    pub use crate::raw::{RawAllocError, RawAllocator, SystemAllocator};
}
