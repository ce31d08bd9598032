//! Error handling and exit codes.

use blockpool_core::PoolError;

/// Driver-level failures that are not pool errors.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The same address was handed out more than once.
    #[error("{0} duplicate address(es) handed out by the pool")]
    DuplicateAddresses(usize),
}

/// Process exit codes.
pub mod exit_codes {
    /// Successful execution.
    pub const SUCCESS: i32 = 0;
    /// Any failure without a dedicated code.
    pub const ERROR_GENERIC: i32 = 1;
    /// Bad pool arguments (zero sizes, non-growing `--grow-to`).
    pub const ERROR_INVALID_ARGUMENT: i32 = 2;
    /// The host allocator refused the request.
    pub const ERROR_ALLOCATION: i32 = 3;
    /// The workload needed more blocks than the pool holds.
    pub const ERROR_POOL_EMPTY: i32 = 4;
    /// The ledger detected misuse.
    pub const ERROR_POOL_CORRUPT: i32 = 5;
    /// A list lock could not be acquired.
    pub const ERROR_LOCK: i32 = 6;
    /// The pool handed out an address twice.
    pub const ERROR_DUPLICATE: i32 = 7;
}

/// Map an application error to the process exit code.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(pool_err) = err.downcast_ref::<PoolError>() {
        return pool_exit_code(pool_err);
    }
    match err.downcast_ref::<AppError>() {
        Some(AppError::DuplicateAddresses(_)) => exit_codes::ERROR_DUPLICATE,
        None => exit_codes::ERROR_GENERIC,
    }
}

fn pool_exit_code(err: &PoolError) -> i32 {
    match err {
        PoolError::InvalidArgument(_) => exit_codes::ERROR_INVALID_ARGUMENT,
        PoolError::AllocationFailure { .. } => exit_codes::ERROR_ALLOCATION,
        PoolError::PoolEmpty => exit_codes::ERROR_POOL_EMPTY,
        PoolError::PoolCorrupt(_) => exit_codes::ERROR_POOL_CORRUPT,
        PoolError::LockFailure(_) => exit_codes::ERROR_LOCK,
    }
}
