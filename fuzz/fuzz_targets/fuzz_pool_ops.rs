#![no_main]

use std::collections::HashSet;

use libfuzzer_sys::fuzz_target;

use blockpool_core::{Block, Pool, PoolError};

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    // First two bytes pick the geometry, capped to keep runs fast
    let block_size = usize::from(data[0] % 64) + 1;
    let capacity = usize::from(data[1] % 128) + 1;
    let pool: Pool = Pool::new(block_size, capacity).unwrap();

    let mut held: Vec<Block> = Vec::new();
    let mut live: HashSet<Block> = HashSet::new();
    let mut last_returned: Option<Block> = None;

    for &byte in &data[2..] {
        match byte % 4 {
            0 | 1 => match pool.alloc() {
                Ok(block) => {
                    assert!(live.insert(block), "block handed out twice");
                    held.push(block);
                }
                Err(e) => assert_eq!(e, PoolError::PoolEmpty),
            },
            2 => {
                if held.is_empty() {
                    // Nothing is checked out, so any return must underflow
                    if let Some(block) = last_returned {
                        assert!(matches!(pool.dealloc(block), Err(PoolError::PoolCorrupt(_))));
                    }
                } else {
                    let block = held.swap_remove(usize::from(byte) % held.len());
                    live.remove(&block);
                    pool.dealloc(block).unwrap();
                    last_returned = Some(block);
                }
            }
            _ => {
                let extra = usize::from(byte >> 2) % 16 + 1;
                pool.grow(pool.capacity() + extra).unwrap();
            }
        }
        assert_eq!(pool.free_count() + pool.in_use_count(), pool.capacity());
        assert_eq!(pool.in_use_count(), held.len());
    }
});
