//! Lock modes: how the ledger protects its two lists.
//!
//! The choice is made once, by the pool's type parameter:
//!
//! - [`Shared`] guards each list with a `parking_lot::Mutex`. The pool is
//!   `Send + Sync` and can be used from any number of threads.
//! - [`Local`] guards each list with a `RefCell`. No atomics or lock words are
//!   touched on the hot path, and the pool is `!Sync`, so the compiler rejects
//!   sharing it across threads.

use std::cell::RefCell;

use parking_lot::Mutex;

use crate::ledger::BlockList;

/// Construction-time selection of the list locking strategy.
pub trait LockMode: sealed::Sealed + 'static {
    /// Cell type wrapping each list.
    #[doc(hidden)]
    type Cell: sealed::ListCell;

    /// Short name used in logs.
    const NAME: &'static str;
}

/// Thread-safe lock mode backed by `parking_lot::Mutex`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Shared;

/// Single-threaded lock mode backed by `RefCell`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Local;

impl LockMode for Shared {
    type Cell = Mutex<BlockList>;
    const NAME: &'static str = "shared";
}

impl LockMode for Local {
    type Cell = RefCell<BlockList>;
    const NAME: &'static str = "local";
}

pub(crate) mod sealed {
    use super::{BlockList, Local, Mutex, RefCell, Shared};

    pub trait Sealed {}

    impl Sealed for Shared {}
    impl Sealed for Local {}

    /// Exclusive access to one list for the length of a closure.
    pub trait ListCell {
        fn new(list: BlockList) -> Self;

        /// Run `f` with the list locked. `None` when the lock is unavailable.
        fn with<R>(&self, f: impl FnOnce(&mut BlockList) -> R) -> Option<R>;
    }

    impl ListCell for Mutex<BlockList> {
        fn new(list: BlockList) -> Self {
            Mutex::new(list)
        }

        fn with<R>(&self, f: impl FnOnce(&mut BlockList) -> R) -> Option<R> {
            Some(f(&mut self.lock()))
        }
    }

    impl ListCell for RefCell<BlockList> {
        fn new(list: BlockList) -> Self {
            RefCell::new(list)
        }

        fn with<R>(&self, f: impl FnOnce(&mut BlockList) -> R) -> Option<R> {
            let mut list = self.try_borrow_mut().ok()?;
            Some(f(&mut list))
        }
    }
}
