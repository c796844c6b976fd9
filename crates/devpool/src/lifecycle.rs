//! Installing a pool as the process allocator and tearing it down

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::PoolConfig;
use crate::error::PoolResult;
use crate::hook::{AllocatorHook, HookId};
use crate::pool::MultiDevicePool;

/// A [`MultiDevicePool`] installed in an [`AllocatorHook`]
///
/// The installation owns the pool. [`teardown`](Self::teardown) purges every
/// device's free list and removes the pool from the hook; dropping the
/// installation does the same if teardown was not called.
///
/// # Example
/// ```
/// use nebula_devpool::prelude::*;
///
/// let hook = AllocatorHook::new();
/// let mut installation =
///     PoolInstallation::install_with(&hook, MultiDevicePool::new(PoolConfig::new(1 << 20))?);
///
/// let handle = hook.allocate(4096)?;
/// drop(handle);
///
/// installation.teardown();
/// assert!(!hook.is_installed());
/// # Ok::<(), nebula_devpool::PoolError>(())
/// ```
#[derive(Debug)]
pub struct PoolInstallation<'h> {
    hook: &'h AllocatorHook,
    id: HookId,
    pool: Option<Arc<MultiDevicePool>>,
}

impl PoolInstallation<'static> {
    /// Build a pool with `max_size` bytes of retention per device and install
    /// it in the process-wide hook.
    ///
    /// Must run after any default allocator installation by other subsystems.
    /// Installing twice is a contract violation; the second installation
    /// replaces the first.
    pub fn install(max_size: usize) -> PoolResult<Self> {
        Self::install_config(PoolConfig::new(max_size))
    }

    /// Like [`install`](Self::install) with a full configuration
    pub fn install_config(config: PoolConfig) -> PoolResult<Self> {
        Ok(Self::install_with(
            AllocatorHook::global(),
            MultiDevicePool::new(config)?,
        ))
    }
}

impl<'h> PoolInstallation<'h> {
    /// Install `pool` in `hook`
    pub fn install_with(hook: &'h AllocatorHook, pool: MultiDevicePool) -> Self {
        let max_size = pool.config().max_size;
        let pool = Arc::new(pool);
        let id = hook.install(pool.clone());
        info!(%id, max_size, "device pool installed");

        Self {
            hook,
            id,
            pool: Some(pool),
        }
    }

    /// The installed pool, until teardown
    pub fn pool(&self) -> Option<&Arc<MultiDevicePool>> {
        self.pool.as_ref()
    }

    /// Whether teardown has not run yet
    pub fn is_active(&self) -> bool {
        self.pool.is_some()
    }

    /// Id the hook assigned to this installation
    pub fn id(&self) -> HookId {
        self.id
    }

    /// Purge every device's free list and remove the pool from the hook.
    ///
    /// Calling it again is a no-op. Handles still alive afterwards release
    /// into nothing once the pool is dropped.
    pub fn teardown(&mut self) {
        let Some(pool) = self.pool.take() else {
            return;
        };

        pool.purge_all();
        if !self.hook.uninstall_if(self.id) {
            debug!(id = %self.id, "hook already taken over, leaving the newer allocator installed");
        }
        info!(id = %self.id, devices = pool.devices().len(), "device pool torn down");
    }
}

impl Drop for PoolInstallation<'_> {
    fn drop(&mut self) {
        self.teardown();
    }
}
