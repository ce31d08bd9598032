//! Pool configuration.

use serde::{Deserialize, Serialize};

use crate::error::PoolError;

/// Settings a pool is built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Bytes per block.
    pub block_size: usize,
    /// Number of blocks in the first blob.
    pub capacity: usize,
    /// Check on every `dealloc` that the address is a slot of this pool.
    ///
    /// Off by default: the check walks the blob list under the registry lock,
    /// which the unchecked contract avoids.
    #[serde(default)]
    pub verify_returns: bool,
}

impl PoolConfig {
    /// Configuration for `capacity` blocks of `block_size` bytes.
    #[must_use]
    pub fn new(block_size: usize, capacity: usize) -> Self {
        Self {
            block_size,
            capacity,
            verify_returns: false,
        }
    }

    /// Configuration sized for values of type `T`.
    ///
    /// `size_of::<T>()` is already a multiple of `align_of::<T>()`, so blocks
    /// stay aligned for `T` as long as the type's alignment does not exceed
    /// the host's natural alignment.
    #[must_use]
    pub fn for_type<T>(capacity: usize) -> Self {
        Self::new(std::mem::size_of::<T>(), capacity)
    }

    /// Enable or disable return-address verification.
    #[must_use]
    pub fn verify_returns(mut self, enabled: bool) -> Self {
        self.verify_returns = enabled;
        self
    }

    /// Check the settings describe a buildable pool.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.block_size == 0 {
            return Err(PoolError::InvalidArgument(
                "block_size must be greater than zero".into(),
            ));
        }
        if self.capacity == 0 {
            return Err(PoolError::InvalidArgument(
                "capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Bytes of the first blob, `None` if the product overflows.
    #[must_use]
    pub fn blob_bytes(&self) -> Option<usize> {
        self.block_size.checked_mul(self.capacity)
    }
}
