#![no_main]

use libfuzzer_sys::fuzz_target;

use blockpool_core::{Block, LocalPool, Pool};

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }
    let capacity = usize::from(data[0]) + 1;
    let shared: Pool = Pool::new(16, capacity).unwrap();
    let local = LocalPool::new(16, capacity).unwrap();

    let mut shared_held: Vec<Block> = Vec::new();
    let mut local_held: Vec<Block> = Vec::new();

    // Both lock modes must agree on every outcome and every count
    for &byte in &data[1..] {
        if byte % 2 == 0 {
            let a = shared.alloc();
            let b = local.alloc();
            assert_eq!(a.is_ok(), b.is_ok());
            if let (Ok(a), Ok(b)) = (a, b) {
                shared_held.push(a);
                local_held.push(b);
            }
        } else if let (Some(a), Some(b)) = (shared_held.pop(), local_held.pop()) {
            shared.dealloc(a).unwrap();
            local.dealloc(b).unwrap();
        }
        assert_eq!(shared.free_count(), local.free_count());
        assert_eq!(shared.in_use_count(), local.in_use_count());
    }
});
