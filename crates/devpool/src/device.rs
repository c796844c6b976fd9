//! Current-device resolution
//!
//! Device selection belongs to the calling context, not to the pool. The
//! multi-device pool asks a [`DeviceContext`] on every call and routes to
//! the matching sub-pool.

use std::cell::Cell;

use crate::block::DeviceId;

/// Resolves the device the calling context currently targets
pub trait DeviceContext: Send + Sync {
    /// Active device for the caller
    fn current_device(&self) -> DeviceId;
}

thread_local! {
    static CURRENT_DEVICE: Cell<DeviceId> = const { Cell::new(DeviceId::new(0)) };
}

/// Thread-local device selection, defaulting to device 0.
///
/// Mirrors how device runtimes keep the active device per host thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadDeviceContext;

impl ThreadDeviceContext {
    /// Device selected on this thread
    pub fn get() -> DeviceId {
        CURRENT_DEVICE.with(Cell::get)
    }

    /// Select `device` for this thread, returning the previous selection
    pub fn set(device: DeviceId) -> DeviceId {
        CURRENT_DEVICE.with(|current| current.replace(device))
    }

    /// Run `f` with `device` selected, restoring the previous device afterwards
    pub fn with_device<F, R>(device: DeviceId, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = Self::scoped(device);
        f()
    }

    /// Select `device` until the returned guard is dropped
    #[must_use = "the previous device is restored when the guard is dropped"]
    pub fn scoped(device: DeviceId) -> DeviceGuard {
        DeviceGuard {
            previous: Self::set(device),
        }
    }
}

impl DeviceContext for ThreadDeviceContext {
    fn current_device(&self) -> DeviceId {
        Self::get()
    }
}

/// Restores the previously selected device on drop
#[derive(Debug)]
pub struct DeviceGuard {
    previous: DeviceId,
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        ThreadDeviceContext::set(self.previous);
    }
}

/// Context pinned to a single device
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedDevice(pub DeviceId);

impl DeviceContext for FixedDevice {
    fn current_device(&self) -> DeviceId {
        self.0
    }
}
