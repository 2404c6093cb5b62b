mod util;

use tagalloc::{Allocator, Arena};

/// Assert that no two neighbouring blocks are free.
fn assert_coalesced(alloc: &Allocator<Arena>) {
    let blocks = alloc.bookkeeper().unwrap().blocks();

    for pair in blocks.windows(2) {
        assert!(
            pair[0].allocated || pair[1].allocated,
            "Adjacent free blocks at {:p} and {:p}.",
            pair[0].ptr,
            pair[1].ptr
        );
    }
}

/// Allocate a row of blocks, and release them in the given order.
fn release_in_order(order: &[usize]) {
    let mut alloc = util::allocator();
    let sizes = [8, 100, 24, 3000, 16, 64, 500, 40];

    let ptrs: Vec<_> = sizes.iter().map(|&size| alloc.allocate(size)).collect();

    for &i in order {
        unsafe { alloc.release(ptrs[i]) };

        assert_coalesced(&alloc);
        alloc.verify().unwrap();
    }

    // Everything merged back into one block.
    let blocks = alloc.bookkeeper().unwrap().blocks();
    assert_eq!(blocks.len(), 1);
    assert!(!blocks[0].allocated);
    assert_eq!(blocks[0].size, alloc.heap_size() - 16);
    assert_eq!(alloc.bookkeeper().unwrap().free_blocks(), blocks);
}

#[test]
fn forwards() {
    release_in_order(&[0, 1, 2, 3, 4, 5, 6, 7]);
}

#[test]
fn backwards() {
    release_in_order(&[7, 6, 5, 4, 3, 2, 1, 0]);
}

#[test]
fn interleaved() {
    // Odd ones first, so every even release merges on both sides.
    release_in_order(&[1, 3, 5, 7, 0, 2, 4, 6]);
}

#[test]
fn scattered() {
    release_in_order(&[3, 0, 6, 1, 7, 4, 2, 5]);
}

#[test]
fn merged_block_is_reused() {
    let mut alloc = util::allocator();

    let a = alloc.allocate(40);
    let b = alloc.allocate(40);
    let c = alloc.allocate(40);
    let _guard = alloc.allocate(40);

    unsafe {
        alloc.release(a);
        alloc.release(c);
        alloc.release(b);
    }

    // The three merged into one, which fits a request none of them could.
    let heap = alloc.heap_size();
    let d = alloc.allocate(130);
    assert_eq!(d, a.min(b).min(c));
    assert_eq!(alloc.heap_size(), heap);
}
