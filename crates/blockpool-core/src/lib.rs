//! # blockpool-core
//!
//! Fixed-size block pool: a pre-partitioned region of raw memory from which
//! equally sized blocks are checked out and returned in O(1).
//!
//! A pool is made of a region registry (the raw blobs, append-only) and a
//! block ledger (a free list and an in-use list, each behind its own lock).
//! The pool never reads or interprets block contents; it only hands out and
//! takes back addresses.
//!
//! # Example
//! ```
//! use blockpool_core::{Pool, PoolError};
//!
//! let pool: Pool = Pool::new(8, 2).unwrap();
//! let a = pool.alloc().unwrap();
//! let _b = pool.alloc().unwrap();
//! assert_eq!(pool.alloc(), Err(PoolError::PoolEmpty));
//!
//! pool.dealloc(a).unwrap();
//! pool.grow(4).unwrap();
//! assert_eq!(pool.capacity(), 4);
//! assert_eq!(pool.free_count(), 3);
//! pool.destroy();
//! ```
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub(crate) mod ledger;
pub mod lock;
pub mod pool;
pub mod region;
pub mod stats;

// Re-exports
pub use config::PoolConfig;
pub use error::{status, status_of, PoolError};
pub use lock::{Local, LockMode, Shared};
pub use pool::{LocalPool, Pool};
pub use region::{Block, BLOB_ALIGN};
pub use stats::PoolStats;
