//! Process-wide allocator hook
//!
//! A host runtime sends every device allocation through one hook. This
//! module models that hook as an explicit registry instead of an import-time
//! side effect.
//!
//! # Contract
//!
//! - Install after any other subsystem has put its default allocator in
//!   place, or the later installation silently wins.
//! - Only one owner at a time. A second [`install`](AllocatorHook::install)
//!   is not rejected: it replaces the previous allocator and logs a warning.
//! - The owner uninstalls with the [`HookId`] it received, so a stale owner
//!   cannot remove somebody else's allocator.

use core::fmt;
use core::num::NonZeroUsize;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{PoolError, PoolResult};
use crate::pool::{DeviceAllocator, Handle};

/// Identifies one installation in a hook
///
/// Uses `NonZeroUsize` so `Option<HookId>` stays pointer-sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(NonZeroUsize);

impl HookId {
    fn next() -> Self {
        static COUNTER: AtomicUsize = AtomicUsize::new(1);
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(NonZeroUsize::new(id).unwrap_or(NonZeroUsize::MIN))
    }
}

impl fmt::Display for HookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hook#{}", self.0)
    }
}

struct Installed {
    id: HookId,
    allocator: Arc<dyn DeviceAllocator>,
}

/// Registry holding the allocator every device allocation is routed to
#[derive(Default)]
pub struct AllocatorHook {
    installed: RwLock<Option<Installed>>,
}

static GLOBAL_HOOK: OnceLock<AllocatorHook> = OnceLock::new();

impl AllocatorHook {
    /// Empty hook
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide hook
    pub fn global() -> &'static Self {
        GLOBAL_HOOK.get_or_init(Self::new)
    }

    /// Route subsequent allocations to `allocator`
    pub fn install(&self, allocator: Arc<dyn DeviceAllocator>) -> HookId {
        let id = HookId::next();
        let previous = self.installed.write().replace(Installed { id, allocator });

        match previous {
            Some(previous) => warn!(
                %id,
                replaced = %previous.id,
                "allocator hook already had an owner, replacing it"
            ),
            None => debug!(%id, "allocator installed in hook"),
        }
        id
    }

    /// Remove whatever is installed
    pub fn uninstall(&self) -> Option<Arc<dyn DeviceAllocator>> {
        let removed = self.installed.write().take()?;
        debug!(id = %removed.id, "allocator removed from hook");
        Some(removed.allocator)
    }

    /// Remove the installation `id`, leaving any newer one in place.
    ///
    /// Returns whether something was removed.
    pub fn uninstall_if(&self, id: HookId) -> bool {
        let mut installed = self.installed.write();
        if installed.as_ref().is_some_and(|current| current.id == id) {
            *installed = None;
            debug!(%id, "allocator removed from hook");
            true
        } else {
            false
        }
    }

    /// Whether an allocator is installed
    pub fn is_installed(&self) -> bool {
        self.installed.read().is_some()
    }

    /// Id of the current installation
    pub fn installed_id(&self) -> Option<HookId> {
        self.installed.read().as_ref().map(|current| current.id)
    }

    /// The installed allocator
    pub fn current(&self) -> Option<Arc<dyn DeviceAllocator>> {
        self.installed
            .read()
            .as_ref()
            .map(|current| Arc::clone(&current.allocator))
    }

    /// Allocate through the installed allocator
    pub fn allocate(&self, size: usize) -> PoolResult<Handle> {
        // Clone out so the lock is not held across the allocation.
        let allocator = self.current().ok_or(PoolError::NoAllocatorInstalled)?;
        allocator.allocate(size)
    }
}

impl fmt::Debug for AllocatorHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocatorHook")
            .field("installed", &self.installed_id())
            .finish()
    }
}
