//! Error taxonomy and numeric status codes.

/// Error type returned by every fallible pool operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// A zero block size or capacity, a non-growing `grow`, or (with
    /// verification enabled) a returned address the pool never issued.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The host allocator could not provide the requested memory, or the
    /// request does not fit the address space.
    #[error("allocation failure: host allocator could not provide {blocks} x {block_size} bytes")]
    AllocationFailure {
        /// Bytes per requested element.
        block_size: usize,
        /// Number of requested elements.
        blocks: usize,
    },

    /// No free blocks are left.
    #[error("pool is empty")]
    PoolEmpty,

    /// The ledger detected caller misuse, such as more deallocations than
    /// allocations.
    #[error("pool corrupted: {0}")]
    PoolCorrupt(&'static str),

    /// A list lock could not be acquired.
    ///
    /// `Shared` pools never report it: `parking_lot` locks do not fail. A
    /// `Local` pool reports it on re-entrant access to one of its lists,
    /// which the pool's own operations never do.
    #[error("failed to acquire the {0} list lock")]
    LockFailure(&'static str),
}

impl PoolError {
    /// Stable numeric status for this error, see [`status`].
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) => status::INVALID_ARGUMENT,
            Self::AllocationFailure { .. } => status::ALLOCATION_FAILURE,
            Self::PoolEmpty => status::POOL_EMPTY,
            Self::PoolCorrupt(_) => status::POOL_CORRUPT,
            Self::LockFailure(_) => status::LOCK_FAILURE,
        }
    }

    /// Whether the caller can reasonably act on this error and carry on.
    ///
    /// `PoolEmpty` calls for a `grow` or a retry once blocks come back, and
    /// `InvalidArgument` for a corrected call. Everything else is fatal for
    /// the pool.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::PoolEmpty | Self::InvalidArgument(_))
    }
}

/// Numeric status codes, `SUCCESS` for `Ok` and one per [`PoolError`] variant.
pub mod status {
    /// Operation completed.
    pub const SUCCESS: i32 = 0;
    /// See [`PoolError::InvalidArgument`](super::PoolError::InvalidArgument).
    pub const INVALID_ARGUMENT: i32 = 1;
    /// See [`PoolError::AllocationFailure`](super::PoolError::AllocationFailure).
    pub const ALLOCATION_FAILURE: i32 = 2;
    /// See [`PoolError::PoolEmpty`](super::PoolError::PoolEmpty).
    pub const POOL_EMPTY: i32 = 3;
    /// See [`PoolError::PoolCorrupt`](super::PoolError::PoolCorrupt).
    pub const POOL_CORRUPT: i32 = 4;
    /// See [`PoolError::LockFailure`](super::PoolError::LockFailure).
    pub const LOCK_FAILURE: i32 = 5;
}

/// Status code for any pool result.
#[must_use]
pub fn status_of<T>(result: &Result<T, PoolError>) -> i32 {
    match result {
        Ok(_) => status::SUCCESS,
        Err(e) => e.code(),
    }
}
