//! Test automation.

use tagalloc::{Allocator, Arena, Config};

/// The capacity of the arenas used by the tests.
#[allow(dead_code)]
pub const CAPACITY: usize = 1 << 22;

/// Install the logger (once), so `RUST_LOG=trace` shows the heap maps.
pub fn logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// An initialized allocator over a fresh arena.
#[allow(dead_code)]
pub fn allocator() -> Allocator<Arena> {
    with_capacity(CAPACITY)
}

/// An initialized allocator over a fresh arena of `capacity` bytes.
#[allow(dead_code)]
pub fn with_capacity(capacity: usize) -> Allocator<Arena> {
    logger();

    let mut alloc = Allocator::with_config(Arena::new(capacity).unwrap(), Config::default());
    alloc.init().unwrap();

    alloc
}

/// The address of the heap start.
#[allow(dead_code)]
pub fn base(alloc: &Allocator<Arena>) -> usize {
    alloc.bookkeeper().unwrap().bounds().start
}

/// Fill `len` bytes with a pattern derived from `seed`.
#[allow(dead_code)]
pub unsafe fn fill(ptr: *mut u8, len: usize, seed: u8) {
    for i in 0..len {
        *ptr.add(i) = seed.wrapping_add(i as u8);
    }
}

/// Check a pattern written by `fill`.
#[allow(dead_code)]
pub unsafe fn check(ptr: *const u8, len: usize, seed: u8) {
    for i in 0..len {
        assert_eq!(*ptr.add(i), seed.wrapping_add(i as u8), "Byte {} of {:p} changed.", i, ptr);
    }
}

/// Wrap a block in acid tests.
///
/// This keeps a few allocations alive across the closure, and checks that they are intact and
/// the heap consistent afterwards. If the allocator hands out the same memory twice or writes
/// outside a block, this will likely notice.
#[allow(dead_code)]
pub fn acid<F: FnOnce(&mut Allocator<Arena>)>(alloc: &mut Allocator<Arena>, func: F) {
    let sizes = [3, 24, 100, 700];
    let mut ptrs = Vec::new();

    for (i, &size) in sizes.iter().enumerate() {
        let ptr = alloc.allocate(size);
        assert!(!ptr.is_null());
        unsafe { fill(ptr, size, i as u8) };
        ptrs.push(ptr);
    }

    func(alloc);

    alloc.verify().unwrap();
    for (i, (&size, &ptr)) in sizes.iter().zip(&ptrs).enumerate() {
        unsafe {
            check(ptr, size, i as u8);
            alloc.release(ptr);
        }
    }

    alloc.verify().unwrap();
}
