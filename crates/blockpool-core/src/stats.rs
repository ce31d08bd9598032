//! Atomic pool statistics for lock-free usage tracking.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time view of a pool's traffic and occupancy.
///
/// Counts read while other threads are mid-operation may be off by the
/// blocks in flight between the two lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Successful allocations.
    pub allocations: u64,
    /// Successful deallocations.
    pub deallocations: u64,
    /// Allocations refused because the pool was empty.
    pub empty_hits: u64,
    /// Successful `grow` calls.
    pub grows: u64,
    /// Blocks on the free list.
    pub free: usize,
    /// Blocks checked out.
    pub in_use: usize,
    /// Total blocks across all blobs.
    pub capacity: usize,
}

/// Atomic pool counters for lock-free updates.
pub(crate) struct AtomicPoolStats {
    allocations: AtomicU64,
    deallocations: AtomicU64,
    empty_hits: AtomicU64,
    grows: AtomicU64,
}

impl AtomicPoolStats {
    /// Create new zeroed counters.
    pub(crate) fn new() -> Self {
        Self {
            allocations: AtomicU64::new(0),
            deallocations: AtomicU64::new(0),
            empty_hits: AtomicU64::new(0),
            grows: AtomicU64::new(0),
        }
    }

    /// Take a snapshot of the counters, filling in the occupancy figures.
    pub(crate) fn snapshot(&self, free: usize, in_use: usize, capacity: usize) -> PoolStats {
        PoolStats {
            allocations: self.allocations.load(Ordering::Relaxed),
            deallocations: self.deallocations.load(Ordering::Relaxed),
            empty_hits: self.empty_hits.load(Ordering::Relaxed),
            grows: self.grows.load(Ordering::Relaxed),
            free,
            in_use,
            capacity,
        }
    }

    /// Reset all counters.
    pub(crate) fn reset(&self) {
        self.allocations.store(0, Ordering::Relaxed);
        self.deallocations.store(0, Ordering::Relaxed);
        self.empty_hits.store(0, Ordering::Relaxed);
        self.grows.store(0, Ordering::Relaxed);
    }

    pub(crate) fn record_allocation(&self) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_deallocation(&self) {
        self.deallocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_empty_hit(&self) {
        self.empty_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_grow(&self) {
        self.grows.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for AtomicPoolStats {
    fn default() -> Self {
        Self::new()
    }
}
