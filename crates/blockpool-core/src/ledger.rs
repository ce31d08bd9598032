//! Block ledger: the free list and the in-use list.
//!
//! Each list is an index-addressed stack over a contiguous descriptor array
//! whose room is reserved ahead of time, so insert and remove are O(1) and
//! never reallocate on the alloc/dealloc path. Each list sits behind its own
//! lock (see [`LockMode`]) and every call path holds at most one of them.
//!
//! Sizes are mirrored into atomics inside the critical sections so counts can
//! be read without locking.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::PoolError;
use crate::lock::sealed::ListCell;
use crate::lock::LockMode;
use crate::region::{Blob, Block};

/// One list of block descriptors.
///
/// `limit` is the pool capacity the list was sized for; a push past it means
/// the ledger no longer matches the blobs.
#[derive(Debug, Default)]
pub struct BlockList {
    slots: Vec<Block>,
    limit: usize,
}

impl BlockList {
    /// Create an empty list with no room.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of descriptors in the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the list holds no descriptors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Make room for `additional` more descriptors beyond the current limit.
    fn reserve(&mut self, additional: usize) -> Result<(), PoolError> {
        let wanted = self.limit.saturating_add(additional);
        self.slots
            .try_reserve_exact(wanted.saturating_sub(self.slots.len()))
            .map_err(|_| PoolError::AllocationFailure {
                block_size: std::mem::size_of::<Block>(),
                blocks: wanted,
            })
    }

    /// Raise the limit by `additional`. Refused, with nothing changed, unless
    /// that much room was reserved beforehand.
    fn raise_limit(&mut self, additional: usize) -> bool {
        match self.limit.checked_add(additional) {
            Some(limit) if limit <= self.slots.capacity() => {
                self.limit = limit;
                true
            }
            _ => false,
        }
    }

    fn lower_limit(&mut self, by: usize) {
        self.limit -= by;
    }

    /// Raise the limit and push every block, or change nothing.
    fn extend(&mut self, blocks: impl ExactSizeIterator<Item = Block>) -> bool {
        if self.slots.len() > self.limit || !self.raise_limit(blocks.len()) {
            return false;
        }
        self.slots.extend(blocks);
        true
    }

    fn push(&mut self, block: Block) -> bool {
        if self.slots.len() >= self.limit {
            return false;
        }
        self.slots.push(block);
        true
    }

    fn pop(&mut self) -> Option<Block> {
        self.slots.pop()
    }
}

/// The two lists plus their lock-free size mirrors.
pub(crate) struct Ledger<M: LockMode> {
    free: M::Cell,
    in_use: M::Cell,
    free_len: AtomicUsize,
    in_use_len: AtomicUsize,
}

impl<M: LockMode> Ledger<M> {
    pub(crate) fn new() -> Self {
        Self {
            free: M::Cell::new(BlockList::new()),
            in_use: M::Cell::new(BlockList::new()),
            free_len: AtomicUsize::new(0),
            in_use_len: AtomicUsize::new(0),
        }
    }

    /// Reserve descriptor room in both lists for `additional` more blocks.
    ///
    /// Does not change what either list accepts; a reservation that is never
    /// followed by `partition` only costs memory.
    pub(crate) fn reserve(&self, additional: usize) -> Result<(), PoolError> {
        self.in_use
            .with(|list| list.reserve(additional))
            .ok_or(PoolError::LockFailure("in-use"))??;
        self.free
            .with(|list| list.reserve(additional))
            .ok_or(PoolError::LockFailure("free"))?
    }

    /// Carve `blob` into `block_size` slots and push them all onto the free
    /// list. Returns the number of blocks added.
    ///
    /// All or nothing: on error neither list nor either count has changed,
    /// so the caller can drop the blob.
    pub(crate) fn partition(&self, blob: &Blob, block_size: usize) -> Result<usize, PoolError> {
        let slots = blob.slots(block_size);
        let count = slots.len();
        let raised = self
            .in_use
            .with(|list| list.raise_limit(count))
            .ok_or(PoolError::LockFailure("in-use"))?;
        if !raised {
            return Err(PoolError::PoolCorrupt("in-use list has no room for new blocks"));
        }

        let added = self.free.with(|list| {
            let added = list.extend(slots);
            if added {
                self.free_len.fetch_add(count, Ordering::Relaxed);
            }
            added
        });
        if added == Some(true) {
            return Ok(count);
        }

        self.in_use
            .with(|list| list.lower_limit(count))
            .ok_or(PoolError::LockFailure("in-use"))?;
        Err(match added {
            None => PoolError::LockFailure("free"),
            Some(_) => PoolError::PoolCorrupt("free list has no room for new blocks"),
        })
    }

    /// Move one descriptor from the free list to the in-use list.
    pub(crate) fn checkout(&self) -> Result<Block, PoolError> {
        let block = self
            .free
            .with(|list| {
                let block = list.pop()?;
                self.free_len.fetch_sub(1, Ordering::Relaxed);
                Some(block)
            })
            .ok_or(PoolError::LockFailure("free"))?
            .ok_or(PoolError::PoolEmpty)?;

        let recorded = self
            .in_use
            .with(|list| {
                let pushed = list.push(block);
                if pushed {
                    self.in_use_len.fetch_add(1, Ordering::Relaxed);
                }
                pushed
            })
            .ok_or(PoolError::LockFailure("in-use"))?;
        if !recorded {
            return Err(PoolError::PoolCorrupt("in-use list exceeds capacity"));
        }
        Ok(block)
    }

    /// Recycle one in-use descriptor for `block` and put it on the free list.
    ///
    /// The address is trusted: nothing checks that it was issued by this
    /// pool or that it is not already free.
    pub(crate) fn checkin(&self, block: Block) -> Result<(), PoolError> {
        let recycled = self
            .in_use
            .with(|list| {
                let stale = list.pop()?;
                self.in_use_len.fetch_sub(1, Ordering::Relaxed);
                Some(stale)
            })
            .ok_or(PoolError::LockFailure("in-use"))?;
        if recycled.is_none() {
            return Err(PoolError::PoolCorrupt(
                "more deallocations than allocations",
            ));
        }

        let returned = self
            .free
            .with(|list| {
                let pushed = list.push(block);
                if pushed {
                    self.free_len.fetch_add(1, Ordering::Relaxed);
                }
                pushed
            })
            .ok_or(PoolError::LockFailure("free"))?;
        if !returned {
            return Err(PoolError::PoolCorrupt("free list exceeds capacity"));
        }
        Ok(())
    }

    pub(crate) fn free_count(&self) -> usize {
        self.free_len.load(Ordering::Relaxed)
    }

    pub(crate) fn in_use_count(&self) -> usize {
        self.in_use_len.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::lock::{Local, Shared};
    use crate::region::RegionRegistry;

    fn ledger_with<M: LockMode>(block_size: usize, blocks: usize) -> (RegionRegistry, Ledger<M>) {
        let registry = RegionRegistry::create(block_size, blocks).unwrap();
        let ledger = Ledger::<M>::new();
        ledger.reserve(blocks).unwrap();
        let added = ledger.partition(&registry.blobs()[0], block_size).unwrap();
        assert_eq!(added, blocks);
        (registry, ledger)
    }

    #[test]
    fn block_list_respects_limit() {
        let mut list = BlockList::new();
        list.reserve(2).unwrap();
        assert!(list.raise_limit(2));
        let registry = RegionRegistry::create(8, 3).unwrap();
        let mut slots = registry.blobs()[0].slots(8);
        assert!(list.push(slots.next().unwrap()));
        assert!(list.push(slots.next().unwrap()));
        assert!(!list.push(slots.next().unwrap()));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn partition_fills_free_list() {
        let (_registry, ledger) = ledger_with::<Shared>(8, 16);
        assert_eq!(ledger.free_count(), 16);
        assert_eq!(ledger.in_use_count(), 0);
    }

    #[test]
    fn checkout_until_empty() {
        let (_registry, ledger) = ledger_with::<Local>(8, 3);
        let mut seen = HashSet::new();
        for _ in 0..3 {
            assert!(seen.insert(ledger.checkout().unwrap()));
        }
        assert_eq!(ledger.checkout(), Err(PoolError::PoolEmpty));
        assert_eq!(ledger.free_count(), 0);
        assert_eq!(ledger.in_use_count(), 3);
    }

    #[test]
    fn checkout_is_lifo() {
        let (_registry, ledger) = ledger_with::<Shared>(8, 4);
        let a = ledger.checkout().unwrap();
        ledger.checkin(a).unwrap();
        assert_eq!(ledger.checkout().unwrap(), a);
    }

    #[test]
    fn checkin_without_checkout_is_corrupt() {
        let (_registry, ledger) = ledger_with::<Shared>(8, 2);
        let block = ledger.checkout().unwrap();
        ledger.checkin(block).unwrap();
        let err = ledger.checkin(block).unwrap_err();
        assert!(matches!(err, PoolError::PoolCorrupt(_)));
        assert_eq!(ledger.free_count(), 2);
        assert_eq!(ledger.in_use_count(), 0);
    }

    #[test]
    fn counts_track_traffic() {
        let (_registry, ledger) = ledger_with::<Local>(16, 10);
        let taken: Vec<Block> = (0..6).map(|_| ledger.checkout().unwrap()).collect();
        assert_eq!(ledger.free_count() + ledger.in_use_count(), 10);
        for block in taken.into_iter().take(4) {
            ledger.checkin(block).unwrap();
        }
        assert_eq!(ledger.free_count(), 8);
        assert_eq!(ledger.in_use_count(), 2);
    }

    #[test]
    fn second_partition_appends() {
        let (mut registry, ledger) = ledger_with::<Shared>(8, 2);
        ledger.reserve(3).unwrap();
        let blob = registry.grow(3).unwrap();
        assert_eq!(ledger.partition(blob, 8).unwrap(), 3);
        assert_eq!(ledger.free_count(), 5);
    }

    #[test]
    fn reserve_alone_does_not_raise_limit() {
        let (_registry, ledger) = ledger_with::<Shared>(8, 1);
        ledger.reserve(10).unwrap();
        let block = ledger.checkout().unwrap();
        ledger.checkin(block).unwrap();
        // A foreign second return still underflows instead of growing the list.
        assert!(ledger.checkin(block).is_err());
        assert_eq!(ledger.free_count(), 1);
    }

    #[test]
    fn block_list_extend_needs_reserved_room() {
        let registry = RegionRegistry::create(8, 4).unwrap();
        let mut list = BlockList::new();
        assert!(!list.extend(registry.blobs()[0].slots(8)));
        assert!(list.is_empty());
        assert_eq!(list.limit, 0);

        list.reserve(4).unwrap();
        assert!(list.extend(registry.blobs()[0].slots(8)));
        assert_eq!(list.len(), 4);
        assert_eq!(list.limit, 4);
    }

    #[test]
    fn failed_partition_changes_nothing() {
        let registry = RegionRegistry::create(8, 4).unwrap();
        let ledger = Ledger::<Local>::new();
        // Room in the in-use list only: the free list refuses the blob.
        ledger
            .in_use
            .with(|list| list.reserve(4))
            .unwrap()
            .unwrap();

        let err = ledger.partition(&registry.blobs()[0], 8).unwrap_err();
        assert!(matches!(err, PoolError::PoolCorrupt(_)));
        assert_eq!(ledger.free_count(), 0);
        assert_eq!(ledger.in_use_count(), 0);
        assert_eq!(ledger.free.with(|list| (list.len(), list.limit)), Some((0, 0)));
        assert_eq!(ledger.in_use.with(|list| list.limit), Some(0));
        assert_eq!(ledger.checkout(), Err(PoolError::PoolEmpty));

        // Once both lists have room the same blob partitions cleanly.
        ledger.reserve(4).unwrap();
        assert_eq!(ledger.partition(&registry.blobs()[0], 8).unwrap(), 4);
        assert_eq!(ledger.free_count(), 4);
    }

    #[test]
    fn partition_without_in_use_room_changes_nothing() {
        let registry = RegionRegistry::create(8, 2).unwrap();
        let ledger = Ledger::<Shared>::new();
        let err = ledger.partition(&registry.blobs()[0], 8).unwrap_err();
        assert!(matches!(err, PoolError::PoolCorrupt(_)));
        assert_eq!(ledger.free_count(), 0);
        assert_eq!(ledger.free.with(|list| list.limit), Some(0));
    }

    #[test]
    fn reentrant_local_access_is_lock_failure() {
        let (_registry, ledger) = ledger_with::<Local>(8, 2);
        let nested = ledger.free.with(|_| ledger.checkout());
        assert_eq!(nested, Some(Err(PoolError::LockFailure("free"))));
        let stray = Block::from_non_null(std::ptr::NonNull::dangling());
        let nested = ledger.in_use.with(|_| ledger.checkin(stray));
        assert_eq!(nested, Some(Err(PoolError::LockFailure("in-use"))));
        assert_eq!(ledger.free_count(), 2);
        assert_eq!(ledger.in_use_count(), 0);
    }
}
