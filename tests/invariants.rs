mod util;

use proptest::prelude::*;

use tagalloc::{Arena, Checked, Error};

/// An allocator call. Indices pick a live allocation, modulo their number.
#[derive(Debug, Clone)]
enum Op {
    Allocate(usize),
    Release(usize),
    Reallocate(usize, usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1usize..3000).prop_map(Op::Allocate),
        2 => any::<usize>().prop_map(Op::Release),
        2 => (any::<usize>(), 0usize..5000).prop_map(|(i, size)| Op::Reallocate(i, size)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn heap_stays_consistent(ops in prop::collection::vec(op(), 1..200)) {
        let mut alloc = util::with_capacity(1 << 24);
        // Pointer, size and fill seed of every live allocation.
        let mut live: Vec<(*mut u8, usize, u8)> = Vec::new();

        for (n, op) in ops.into_iter().enumerate() {
            let seed = n as u8;

            match op {
                Op::Allocate(size) => {
                    let ptr = alloc.allocate(size);
                    prop_assert!(!ptr.is_null());
                    prop_assert_eq!(ptr as usize % 8, 0);

                    unsafe { util::fill(ptr, size, seed) };
                    live.push((ptr, size, seed));
                }
                Op::Release(i) if !live.is_empty() => {
                    let (ptr, size, seed) = live.swap_remove(i % live.len());

                    unsafe {
                        util::check(ptr, size, seed);
                        alloc.release(ptr);
                    }
                }
                Op::Reallocate(i, new) if !live.is_empty() => {
                    let i = i % live.len();
                    let (ptr, size, old_seed) = live[i];
                    let res = unsafe { alloc.reallocate(ptr, new) };

                    if new == 0 {
                        prop_assert!(res.is_null());
                        live.swap_remove(i);
                    } else {
                        prop_assert!(!res.is_null());

                        unsafe {
                            util::check(res, size.min(new), old_seed);
                            util::fill(res, new, seed);
                        }
                        live[i] = (res, new, seed);
                    }
                }
                _ => {}
            }

            prop_assert_eq!(alloc.verify(), Ok(()));

            // Live allocations never overlap.
            let mut ranges: Vec<_> = live.iter().map(|&(ptr, size, _)| (ptr as usize, size)).collect();
            ranges.sort_unstable();
            for pair in ranges.windows(2) {
                prop_assert!(pair[0].0 + pair[0].1 <= pair[1].0);
            }

            // Every live allocation is an allocated block, and no two free blocks touch.
            let blocks = alloc.bookkeeper().unwrap().blocks();
            for &(ptr, size, _) in &live {
                let block = blocks.iter().find(|block| block.ptr == ptr);
                prop_assert!(block.map_or(false, |block| block.allocated && block.size >= size + 8));
            }
            for pair in blocks.windows(2) {
                prop_assert!(pair[0].allocated || pair[1].allocated);
            }
        }

        for (ptr, size, seed) in live {
            unsafe {
                util::check(ptr, size, seed);
                alloc.release(ptr);
            }
        }

        let blocks = alloc.bookkeeper().unwrap().blocks();
        prop_assert_eq!(blocks.len(), 1);
        prop_assert!(!blocks[0].allocated);
    }

    #[test]
    fn checked_rejects_stale_pointers(
        sizes in prop::collection::vec(1usize..500, 1..50),
        picks in prop::collection::vec(any::<usize>(), 1..100),
    ) {
        util::logger();
        let mut alloc = Checked::new(Arena::new(1 << 20).unwrap());
        alloc.init().unwrap();

        let ptrs: Vec<_> = sizes.iter().map(|&size| alloc.allocate(size).unwrap()).collect();
        let mut released = vec![false; ptrs.len()];

        for pick in picks {
            let i = pick % ptrs.len();
            let res = alloc.release(ptrs[i]);

            if released[i] {
                prop_assert_eq!(res, Err(Error::InvalidPointer(ptrs[i] as usize)));
            } else {
                prop_assert_eq!(res, Ok(()));
                released[i] = true;
            }
            prop_assert_eq!(alloc.verify(), Ok(()));
        }

        prop_assert_eq!(alloc.live(), released.iter().filter(|&&released| !released).count());
    }
}
