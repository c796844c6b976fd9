//! Device pool configuration

use crate::block::{ALLOCATION_UNIT, size};
use crate::error::{PoolError, PoolResult};

/// Configuration shared by every per-device pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Retention budget per device, in bytes.
    ///
    /// A released block is cached only while the cached total stays strictly
    /// below this value; otherwise it goes straight back to the raw allocator.
    pub max_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 512 * size::MB,
        }
    }
}

impl PoolConfig {
    /// Create a configuration with the given retention budget
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self { max_size }
    }

    /// Set the retention budget
    #[must_use = "builder methods must be chained or built"]
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Retention budget expressed in megabytes
    #[must_use]
    pub fn from_megabytes(megabytes: usize) -> Self {
        Self::new(megabytes.saturating_mul(size::MB))
    }

    /// Every release goes straight back to the raw allocator
    #[must_use]
    pub fn caching_disabled() -> Self {
        Self::new(0)
    }

    /// Whether released blocks can ever be cached.
    ///
    /// The smallest block is one allocation unit, and caching needs
    /// `0 + ALLOCATION_UNIT < max_size`.
    #[must_use]
    pub fn caches_blocks(&self) -> bool {
        self.max_size > ALLOCATION_UNIT
    }

    /// Validate the configuration
    pub fn validate(&self) -> PoolResult<()> {
        if self.max_size != 0 && !self.caches_blocks() {
            return Err(PoolError::invalid_config(format!(
                "max_size ({}) must be 0 or greater than the {ALLOCATION_UNIT}-byte allocation unit",
                self.max_size
            )));
        }
        Ok(())
    }
}
