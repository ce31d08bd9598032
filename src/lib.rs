//! Shared helpers for the workspace integration tests.

use std::collections::HashSet;

use blockpool_core::{Block, LockMode, Pool, PoolError};

/// Allocate until the pool reports `PoolEmpty`, returning every block.
///
/// # Panics
///
/// Panics on any error other than `PoolEmpty`.
pub fn drain<M: LockMode>(pool: &Pool<M>) -> Vec<Block> {
    let mut held = Vec::with_capacity(pool.free_count());
    loop {
        match pool.alloc() {
            Ok(block) => held.push(block),
            Err(PoolError::PoolEmpty) => return held,
            Err(e) => panic!("unexpected pool error: {e}"),
        }
    }
}

/// Number of distinct addresses in `blocks`.
pub fn distinct(blocks: &[Block]) -> usize {
    blocks.iter().copied().collect::<HashSet<_>>().len()
}

/// Sorted numeric addresses of `blocks`.
pub fn sorted_addrs(blocks: &[Block]) -> Vec<usize> {
    let mut addrs: Vec<usize> = blocks.iter().map(|b| b.addr()).collect();
    addrs.sort_unstable();
    addrs
}
