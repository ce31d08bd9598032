//! The pool facade: init, alloc, dealloc, grow, capacity and destroy.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use tracing::debug;

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::ledger::Ledger;
use crate::lock::{Local, LockMode, Shared};
use crate::region::{Block, RegionRegistry};
use crate::stats::{AtomicPoolStats, PoolStats};

/// Fixed-size block pool.
///
/// `M` picks the list locking strategy once, at construction: [`Shared`]
/// (the default) for a `Sync` pool, [`Local`] for a single-threaded one.
///
/// # Caller contract
///
/// `dealloc` trusts its argument. Returning an address that did not come from
/// this pool, or returning the same block twice, is not detected (unless
/// [`PoolConfig::verify_returns`] is set, which catches foreign addresses
/// only) and leads to the same address being handed out twice later. The
/// only misuse the ledger always reports is more deallocations than
/// allocations, as [`PoolError::PoolCorrupt`].
pub struct Pool<M: LockMode = Shared> {
    block_size: usize,
    capacity: AtomicUsize,
    verify_returns: bool,
    registry: RwLock<RegionRegistry>,
    ledger: Ledger<M>,
    stats: AtomicPoolStats,
}

/// Single-threaded pool.
pub type LocalPool = Pool<Local>;

impl<M: LockMode> Pool<M> {
    /// Build a pool of `capacity` blocks of `block_size` bytes.
    pub fn new(block_size: usize, capacity: usize) -> Result<Self, PoolError> {
        Self::with_config(&PoolConfig::new(block_size, capacity))
    }

    /// Build a pool from a [`PoolConfig`].
    pub fn with_config(config: &PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        let registry = RegionRegistry::create(config.block_size, config.capacity)?;
        let ledger = Ledger::<M>::new();
        ledger.reserve(config.capacity)?;
        ledger.partition(&registry.blobs()[0], config.block_size)?;

        debug!(
            block_size = config.block_size,
            capacity = config.capacity,
            mode = M::NAME,
            verify_returns = config.verify_returns,
            "block pool initialized"
        );

        Ok(Self {
            block_size: config.block_size,
            capacity: AtomicUsize::new(config.capacity),
            verify_returns: config.verify_returns,
            registry: RwLock::new(registry),
            ledger,
            stats: AtomicPoolStats::new(),
        })
    }

    /// Check out one block.
    ///
    /// The block lies inside exactly one blob, at a multiple of
    /// `block_size` from that blob's start, and belongs to the caller until
    /// passed to [`Pool::dealloc`]. An empty pool is reported as
    /// [`PoolError::PoolEmpty`]; it is never grown implicitly.
    pub fn alloc(&self) -> Result<Block, PoolError> {
        match self.ledger.checkout() {
            Ok(block) => {
                self.stats.record_allocation();
                Ok(block)
            }
            Err(e) => {
                if e == PoolError::PoolEmpty {
                    self.stats.record_empty_hit();
                }
                Err(e)
            }
        }
    }

    /// Check out one block with every byte set to zero.
    ///
    /// Only slots of this pool's blobs are written. A foreign address that
    /// reached the free list through an unchecked `dealloc` is put back and
    /// reported as [`PoolError::InvalidArgument`], its bytes untouched.
    pub fn alloc_zeroed(&self) -> Result<Block, PoolError> {
        // Held across the write so no blob can be released underneath it.
        let registry = self.registry.read();
        let block = self.alloc()?;
        if !registry.owns(block.addr()) {
            self.ledger.checkin(block)?;
            self.stats.record_deallocation();
            return Err(PoolError::InvalidArgument(format!(
                "{block:?} was not issued by this pool and will not be zeroed"
            )));
        }
        block.zero(self.block_size);
        Ok(block)
    }

    /// Return a block to the pool. See the caller contract on [`Pool`].
    pub fn dealloc(&self, block: Block) -> Result<(), PoolError> {
        if self.verify_returns && !self.owns(block) {
            return Err(PoolError::InvalidArgument(format!(
                "{block:?} was not issued by this pool"
            )));
        }
        self.ledger.checkin(block)?;
        self.stats.record_deallocation();
        Ok(())
    }

    /// Grow the pool to `new_capacity` blocks in total.
    ///
    /// The extra blocks come from a new blob; existing blocks keep their
    /// addresses. On failure the pool is left exactly as it was. Concurrent
    /// `grow` calls are serialized; `alloc` and `dealloc` keep running.
    pub fn grow(&self, new_capacity: usize) -> Result<(), PoolError> {
        let mut registry = self.registry.write();
        let current = self.capacity.load(Ordering::Acquire);
        if new_capacity <= current {
            return Err(PoolError::InvalidArgument(format!(
                "new capacity {new_capacity} must exceed current capacity {current}"
            )));
        }
        let extra = new_capacity - current;

        self.ledger.reserve(extra)?;
        let blob = registry.grow(extra)?;
        if let Err(e) = self.ledger.partition(blob, self.block_size) {
            registry.discard_last();
            return Err(e);
        }
        self.capacity.store(new_capacity, Ordering::Release);
        self.stats.record_grow();

        debug!(
            from = current,
            to = new_capacity,
            blobs = registry.blobs().len(),
            "block pool grown"
        );
        Ok(())
    }

    /// Total number of blocks, free and checked out.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    /// Bytes per block.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Blocks currently on the free list.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.ledger.free_count()
    }

    /// Blocks currently checked out.
    #[must_use]
    pub fn in_use_count(&self) -> usize {
        self.ledger.in_use_count()
    }

    /// Number of blobs backing the pool.
    #[must_use]
    pub fn blob_count(&self) -> usize {
        self.registry.read().blobs().len()
    }

    /// Bytes held from the host allocator for block storage.
    #[must_use]
    pub fn reserved_bytes(&self) -> usize {
        self.registry.read().reserved_bytes()
    }

    /// Whether `block` is a slot of one of this pool's blobs.
    ///
    /// Says nothing about whether the block is currently free.
    #[must_use]
    pub fn owns(&self, block: Block) -> bool {
        self.registry.read().owns(block.addr())
    }

    /// Snapshot of traffic counters and occupancy.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.stats.snapshot(
            self.ledger.free_count(),
            self.ledger.in_use_count(),
            self.capacity(),
        )
    }

    /// Reset the traffic counters. Occupancy is unaffected.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Release every blob and descriptor.
    ///
    /// Consuming the pool makes use-after-destroy and double destroy
    /// compile errors. Dropping the pool does the same work silently.
    pub fn destroy(self) {
        debug!(
            capacity = self.capacity(),
            in_use = self.in_use_count(),
            blobs = self.blob_count(),
            "block pool destroyed"
        );
    }
}

impl<M: LockMode> Drop for Pool<M> {
    fn drop(&mut self) {
        self.registry.get_mut().release_all();
    }
}

impl<M: LockMode> std::fmt::Debug for Pool<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("mode", &M::NAME)
            .field("block_size", &self.block_size)
            .field("capacity", &self.capacity())
            .field("free", &self.free_count())
            .field("in_use", &self.in_use_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::ptr::NonNull;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn pool_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Pool>();
    }

    #[test]
    fn local_pool_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<LocalPool>();
    }

    #[test]
    fn init_rejects_zero_arguments() {
        assert!(matches!(
            Pool::<Shared>::new(0, 10),
            Err(PoolError::InvalidArgument(_))
        ));
        assert!(matches!(
            Pool::<Shared>::new(8, 0),
            Err(PoolError::InvalidArgument(_))
        ));
    }

    #[test]
    fn init_overflow_is_allocation_failure() {
        assert!(matches!(
            Pool::<Shared>::new(usize::MAX, 2),
            Err(PoolError::AllocationFailure { .. })
        ));
    }

    #[test]
    fn partition_is_complete() {
        let pool: Pool = Pool::new(16, 10).unwrap();
        let base = pool.registry.read().blobs()[0].base();
        let mut addrs: Vec<usize> = (0..10).map(|_| pool.alloc().unwrap().addr()).collect();
        assert_eq!(pool.alloc(), Err(PoolError::PoolEmpty));
        addrs.sort_unstable();
        let expected: Vec<usize> = (0..10).map(|i| base + i * 16).collect();
        assert_eq!(addrs, expected);
    }

    #[test]
    fn empty_pool_scenario() {
        let pool = LocalPool::new(8, 1).unwrap();
        assert!(pool.alloc().is_ok());
        assert_eq!(pool.alloc(), Err(PoolError::PoolEmpty));
        assert_eq!(pool.stats().empty_hits, 1);
    }

    #[test]
    fn invalid_growth_keeps_capacity() {
        let pool: Pool = Pool::new(8, 100).unwrap();
        assert!(matches!(pool.grow(50), Err(PoolError::InvalidArgument(_))));
        assert!(matches!(pool.grow(100), Err(PoolError::InvalidArgument(_))));
        assert_eq!(pool.capacity(), 100);
        assert_eq!(pool.blob_count(), 1);
    }

    #[test]
    fn grow_adds_new_blob_and_blocks() {
        let pool: Pool = Pool::new(8, 4).unwrap();
        let before: HashSet<Block> = (0..4).map(|_| pool.alloc().unwrap()).collect();
        pool.grow(10).unwrap();
        assert_eq!(pool.capacity(), 10);
        assert_eq!(pool.blob_count(), 2);
        assert_eq!(pool.reserved_bytes(), 80);

        let after: HashSet<Block> = (0..6).map(|_| pool.alloc().unwrap()).collect();
        assert_eq!(after.len(), 6);
        assert!(before.is_disjoint(&after));
        assert_eq!(pool.alloc(), Err(PoolError::PoolEmpty));
    }

    #[test]
    fn failed_grow_leaves_pool_intact() {
        let pool: Pool = Pool::new(8, 4).unwrap();
        let err = pool.grow(usize::MAX).unwrap_err();
        assert!(matches!(err, PoolError::AllocationFailure { .. }));
        assert_eq!(pool.capacity(), 4);
        assert_eq!(pool.blob_count(), 1);
        assert_eq!(pool.free_count(), 4);
    }

    #[test]
    fn dealloc_then_alloc_reuses_block() {
        let pool: Pool = Pool::new(8, 8).unwrap();
        let a = pool.alloc().unwrap();
        let _b = pool.alloc().unwrap();
        pool.dealloc(a).unwrap();
        assert_eq!(pool.alloc().unwrap(), a);
    }

    #[test]
    fn excess_dealloc_is_corrupt() {
        let pool = LocalPool::new(8, 2).unwrap();
        let a = pool.alloc().unwrap();
        pool.dealloc(a).unwrap();
        assert!(matches!(pool.dealloc(a), Err(PoolError::PoolCorrupt(_))));
        assert_eq!(pool.free_count() + pool.in_use_count(), pool.capacity());
    }

    #[test]
    fn verify_returns_rejects_foreign_address() {
        let pool: Pool = Pool::with_config(&PoolConfig::new(8, 4).verify_returns(true)).unwrap();
        let other: Pool = Pool::new(8, 4).unwrap();
        let foreign = other.alloc().unwrap();
        let _mine = pool.alloc().unwrap();
        assert!(matches!(
            pool.dealloc(foreign),
            Err(PoolError::InvalidArgument(_))
        ));
        assert_eq!(pool.in_use_count(), 1);
    }

    #[test]
    fn owns_reports_slots_of_every_blob() {
        let pool: Pool = Pool::new(8, 2).unwrap();
        let first = pool.alloc().unwrap();
        pool.grow(4).unwrap();
        assert!(pool.owns(first));
        // The free list is LIFO, so the next block comes from the new blob.
        let newest = pool.alloc().unwrap();
        assert!(pool.owns(newest));
        assert!(!pool.registry.read().blobs()[0].holds_slot(newest.addr(), 8));
    }

    #[test]
    #[allow(unsafe_code)]
    fn alloc_zeroed_clears_bytes() {
        let pool: Pool = Pool::new(32, 1).unwrap();
        let block = pool.alloc_zeroed().unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(block.as_ptr(), 32) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn alloc_zeroed_never_writes_foreign_memory() {
        let mut outside = [0xAA_u8; 64];
        let foreign = Block::from_non_null(NonNull::new(outside.as_mut_ptr()).unwrap());

        let pool = LocalPool::new(64, 1).unwrap();
        let _mine = pool.alloc().unwrap();
        pool.dealloc(foreign).unwrap();

        assert!(matches!(
            pool.alloc_zeroed(),
            Err(PoolError::InvalidArgument(_))
        ));
        assert!(outside.iter().all(|&b| b == 0xAA));
        // The refused address went back where it came from.
        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.in_use_count(), 0);
        let stats = pool.stats();
        assert_eq!(stats.allocations, stats.deallocations);
    }

    #[test]
    fn stats_track_operations() {
        let pool: Pool = Pool::new(8, 2).unwrap();
        let a = pool.alloc().unwrap();
        let b = pool.alloc().unwrap();
        let _ = pool.alloc();
        pool.dealloc(a).unwrap();
        pool.grow(3).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.allocations, 2);
        assert_eq!(stats.deallocations, 1);
        assert_eq!(stats.empty_hits, 1);
        assert_eq!(stats.grows, 1);
        assert_eq!((stats.free, stats.in_use, stats.capacity), (2, 1, 3));

        pool.reset_stats();
        assert_eq!(pool.stats().allocations, 0);
        pool.dealloc(b).unwrap();
    }

    #[test]
    fn multithreaded_alloc_dealloc() {
        let pool: Arc<Pool> = Arc::new(Pool::new(8, 64).unwrap());
        let mut handles = vec![];

        for _ in 0..4 {
            let p = Arc::clone(&pool);
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    let block = p.alloc().unwrap();
                    p.dealloc(block).unwrap();
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(pool.free_count(), 64);
        assert_eq!(pool.in_use_count(), 0);
        assert_eq!(pool.stats().allocations, 4000);
    }

    #[test]
    fn destroy_consumes_pool() {
        let pool: Pool = Pool::new(8, 4).unwrap();
        let _ = pool.alloc().unwrap();
        pool.destroy();
    }

    #[test]
    fn debug_output_names_mode() {
        let pool = LocalPool::new(8, 4).unwrap();
        let text = format!("{pool:?}");
        assert!(text.contains("local"));
        assert!(text.contains("capacity: 4"));
    }
}
