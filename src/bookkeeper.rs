//! Memory bookkeeping.
//!
//! The bookkeeper owns a heap and its free list, and implements the allocation policy on top of
//! the boundary tags: first-fit placement with splitting, immediate coalescing, and reallocation
//! that prefers growing in place over copying.

use core::cmp;
use core::ops::Range;

use log::{debug, trace};

use crate::block::{self, Block, Tag};
use crate::brk::Sbrk;
use crate::config::{Config, ALIGNMENT, DOUBLE_WORD, MAX_BLOCK, MIN_BLOCK};
use crate::dump::HeapLogger;
use crate::fail::{self, Error};
use crate::free_list::FreeList;
use crate::heap::Heap;

/// A snapshot of a single block, for introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// The payload pointer.
    pub ptr: *mut u8,
    /// The block size, tags included.
    pub size: usize,
    /// Is the block allocated?
    pub allocated: bool,
}

impl BlockInfo {
    /// Read the tags of a block.
    unsafe fn of(block: Block) -> BlockInfo {
        let header = block.header();

        BlockInfo {
            ptr: block.payload().get(),
            size: header.size(),
            allocated: header.is_allocated(),
        }
    }
}

/// The memory bookkeeper.
///
/// This is the main component of the allocator. Its job is to keep track of the free blocks, such
/// that allocation, reallocation, and deallocation are all efficient.
///
/// Guarantees
/// ==========
///
/// Between any two calls:
///
/// 1. The blocks tile the heap between the prologue and the epilogue.
/// 2. Every block's header equals its footer.
/// 3. No two adjacent blocks are free.
/// 4. The free list holds exactly the free blocks, each once.
/// 5. All sizes are multiples of the alignment.
///
/// These are invariants assuming that only pointers handed out by this bookkeeper are given back,
/// each at most once.
pub struct Bookkeeper<B> {
    /// The heap.
    heap: Heap<B>,
    /// The free blocks.
    free: FreeList,
    /// The tunables.
    config: Config,
}

impl<B: Sbrk> Bookkeeper<B> {
    /// Set up a heap at the break of `brk`, with a single free block of `config.initial_extend`
    /// bytes.
    pub fn new(brk: B, config: Config) -> Result<Bookkeeper<B>, Error> {
        config.validate()?;

        let heap = Heap::new(brk)?;
        let mut bk = Bookkeeper {
            free: FreeList::new(heap.base()),
            heap,
            config,
        };
        bk.extend(config.initial_extend)?;

        // Check consistency.
        bk.check();

        Ok(bk)
    }

    /// Allocate a block with room for `size` bytes.
    ///
    /// # Example
    ///
    /// The free list is searched for the first block large enough. If there is none, the heap is
    /// extended (by at least a chunk) and the fresh space is merged with the free block at the
    /// end of the heap, if any:
    ///
    /// ```notrust
    ///   | x |  _  | x |  _  |epi|
    ///                  \_____________/
    ///                   after extending
    ///   | x |  _  | x |       _       |epi|
    /// ```
    ///
    /// The found block is then split, leaving the rest as free. Small requests are carved from
    /// the front, large ones from the back:
    ///
    /// ```notrust
    ///   | a |    _    |        or        |    _    | a |
    /// ```
    ///
    /// The remainder is not split off if it would be a block of the minimum size or less.
    pub fn alloc(&mut self, size: usize) -> Result<Block, Error> {
        debug_assert!(size != 0, "Zero-sized allocations are served by the caller.");

        let asize = block::adjusted_size(size).ok_or_else(|| fail::oom(size))?;

        trace!("{:?} : Allocating {} bytes (block of {}).", self.dump(None), size, asize);

        let block = match unsafe { self.free.fit(asize) } {
            Some(block) => block,
            // The extension is coalesced, so it is at least as large as requested.
            None => self.extend(self.config.extend_size(asize))?,
        };

        let res = unsafe { self.place(block, asize) };

        // Check consistency.
        self.check();
        debug_assert!(unsafe { res.size() } >= asize, "Requested space does not match with the \
                      returned block.");

        Ok(res)
    }

    /// Free a block.
    ///
    /// The block is marked free, put in the free list and merged with its free neighbours.
    ///
    /// # Safety
    ///
    /// `block` must be allocated by this bookkeeper and not freed since. Freeing an invalid block
    /// will drop all future guarantees about this bookkeeper.
    pub unsafe fn free(&mut self, block: Block) {
        trace!("{:?} : Freeing {:?}.", self.dump(Some(block)), block);
        debug_assert!(block.is_allocated(), "Double free of {:?}.", block);

        #[cfg(feature = "security")]
        block.zero();

        block.set_tags(block.size(), false);
        self.free.insert(block);
        self.coalesce(block);

        // Check consistency.
        self.check();
    }

    /// Reallocate a block to hold `new_size` bytes.
    ///
    /// The following guarantees are made:
    ///
    /// 1. The returned block contains the same data as the old one, up to the smaller of the two
    ///    sizes.
    /// 2. On error, the old block is untouched.
    ///
    /// # Example
    ///
    /// If the block is already large enough, including the slack, nothing happens. Otherwise, if
    /// the block to the right is free, it is absorbed:
    ///
    /// ```notrust
    ///   | x | b |     _     | x |
    ///           \~~~~~~~~~~~/
    ///              needed
    ///   | x |       b       | x |
    /// ```
    ///
    /// When that block is the last one (or `b` is the last block itself), the heap is extended
    /// first if need be. Failing all that, the content is moved to a new block.
    ///
    /// # Safety
    ///
    /// `block` must be allocated by this bookkeeper and not freed since.
    pub unsafe fn realloc(&mut self, block: Block, new_size: usize) -> Result<Block, Error> {
        debug_assert!(new_size != 0, "Zero-sized reallocations are served by the caller.");

        let asize = block::adjusted_size(new_size).ok_or_else(|| fail::oom(new_size))?;
        let need = asize
            .checked_add(self.config.realloc_slack)
            .filter(|&need| need <= MAX_BLOCK)
            .ok_or_else(|| fail::oom(new_size))?;

        trace!("{:?} : Reallocating {:?} to {} bytes.", self.dump(Some(block)), block, new_size);

        if block.size() >= need {
            return Ok(block);
        }

        if self.realloc_inplace(block, need) {
            // Check consistency.
            self.check();

            return Ok(block);
        }

        // The content has to move. It is parked in a temporary block while the old one is freed,
        // so that the new block can reuse the old space.
        let len = cmp::min(block.payload_size(), new_size);
        let temp = self.alloc(len)?;
        block.copy_to(temp, len);

        if let Err(err) = self.reserve(block, asize) {
            self.free(temp);
            return Err(err);
        }

        self.free(block);
        let res = match self.alloc(new_size) {
            Ok(res) => res,
            Err(err) => {
                // Cannot happen after the reservation.
                self.free(temp);
                return Err(err);
            }
        };
        temp.copy_to(res, len);
        self.free(temp);

        Ok(res)
    }

    /// Grow a block in place by absorbing the block to its right.
    ///
    /// Returns `false` without touching the block if that is not possible.
    unsafe fn realloc_inplace(&mut self, block: Block, need: usize) -> bool {
        let next = block.next();
        if next.is_allocated() && !next.is_epilogue() {
            return false;
        }

        let available = block.size() + next.size();
        if available < need {
            // Only the last block of the heap can grow into the extension.
            if !next.is_epilogue() && !next.next().is_epilogue() {
                return false;
            }

            // If `next` is free, the extension merges with it. On failure, moving to a smaller
            // spot may still work.
            if self.extend(self.config.extend_size(need - available)).is_err() {
                return false;
            }
        }

        // Either the old neighbour (maybe grown) or the extension.
        let next = block.next();
        debug_assert!(!next.is_allocated(), "Absorbing an allocated block.");

        self.free.delete(next);
        block.set_tags(block.size() + next.size(), true);

        true
    }

    /// Make sure that a block of `size` bytes can be allocated once `block` is freed, without
    /// growing the heap.
    unsafe fn reserve(&mut self, block: Block, size: usize) -> Result<(), Error> {
        if self.free.fit(size).is_some() {
            return Ok(());
        }

        // Freeing the block merges it with its free neighbours.
        let mut reclaimable = block.size();
        if !block.prev_tag().is_allocated() {
            reclaimable += block.prev_tag().size();
        }
        if !block.next().is_allocated() {
            reclaimable += block.next().size();
        }

        if reclaimable < size {
            self.extend(self.config.extend_size(size))?;
        }

        Ok(())
    }

    /// Extend the heap, and merge the fresh space into the free blocks.
    ///
    /// The returned block is free and in the free list.
    fn extend(&mut self, size: usize) -> Result<Block, Error> {
        let block = self.heap.extend(size)?;

        debug!("Extended the heap to {} bytes.", self.heap.size());

        unsafe {
            self.free.insert(block);
            Ok(self.coalesce(block))
        }
    }
}

impl<B> Bookkeeper<B> {
    /// Carve an allocated block of `asize` bytes out of the free `block`.
    ///
    /// The block leaves the free list; the remainder, if split off, goes back in.
    unsafe fn place(&mut self, block: Block, asize: usize) -> Block {
        self.free.delete(block);

        let size = block.size();
        let rest = size - asize;

        if rest <= MIN_BLOCK {
            // Splitting would leave a useless stub.
            block.set_tags(size, true);

            block
        } else if asize < self.config.split_threshold {
            block.set_tags(asize, true);
            let excessive = block.next();
            excessive.set_tags(rest, false);
            self.free.insert(excessive);

            block
        } else {
            // The free part stays put at the lower address.
            block.set_tags(rest, false);
            self.free.insert(block);
            let res = block.next();
            res.set_tags(asize, true);

            res
        }
    }

    /// Merge a free block with its free neighbours.
    ///
    /// ```notrust
    ///   | x | b | x |   ->   | x | b | x |
    ///   | x | b | _ |   ->   | x |   b   |
    ///   | _ | b | x |   ->   |   b   | x |
    ///   | _ | b | _ |   ->   |     b     |
    /// ```
    ///
    /// Returns the merged block, which starts at the left neighbour if that was free.
    ///
    /// # Safety
    ///
    /// `block` must be free and in the free list.
    unsafe fn coalesce(&mut self, block: Block) -> Block {
        let prev_free = !block.prev_tag().is_allocated();
        let next = block.next();
        let next_free = !next.is_allocated();

        if !prev_free && !next_free {
            return block;
        }

        let mut res = block;
        let mut size = block.size();
        self.free.delete(block);

        if next_free {
            self.free.delete(next);
            size += next.size();
        }
        if prev_free {
            let prev = block.prev();
            self.free.delete(prev);
            size += prev.size();
            res = prev;
        }

        res.set_tags(size, false);
        self.free.insert(res);

        res
    }

    /// The tunables.
    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The size of the heap, in bytes.
    #[inline]
    pub fn heap_size(&self) -> usize {
        self.heap.size()
    }

    /// The address range of the heap.
    #[inline]
    pub fn bounds(&self) -> Range<usize> {
        self.heap.base().addr()..self.heap.end().addr()
    }

    /// Does the block area of the heap contain `addr`?
    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        self.heap.contains(addr)
    }

    /// All blocks, in address order.
    pub fn blocks(&self) -> Vec<BlockInfo> {
        unsafe { self.heap.blocks().map(|block| BlockInfo::of(block)).collect() }
    }

    /// The free blocks, in free list order.
    pub fn free_blocks(&self) -> Vec<BlockInfo> {
        unsafe { self.free.iter().map(|block| BlockInfo::of(block)).collect() }
    }

    /// Walk the whole heap and the free list, checking every invariant.
    ///
    /// This is the only way to detect a corrupted heap (e.g. after a double free).
    pub fn verify(&self) -> Result<(), Error> {
        unsafe {
            let prologue = self.heap.prologue();
            if prologue.header() != Tag::new(DOUBLE_WORD, true) || prologue.footer() != prologue.header() {
                return Err(self.corrupted(prologue, "bad prologue"));
            }
            if self.heap.size() % ALIGNMENT != 0 {
                return Err(self.corrupted(self.heap.epilogue(), "unaligned heap size"));
            }

            // Walk the blocks. Free blocks come out in address order.
            let end = self.heap.end().addr();
            let mut free = Vec::new();
            let mut prev_free = false;
            let mut block = self.heap.first();
            while block.addr() != end {
                let header = block.header();
                if header.size() < MIN_BLOCK {
                    return Err(self.corrupted(block, "block smaller than the minimum"));
                }
                if header.size() > end - block.addr() {
                    return Err(self.corrupted(block, "block overruns the heap"));
                }
                if block.footer() != header {
                    return Err(self.corrupted(block, "header and footer disagree"));
                }
                if !header.is_allocated() {
                    if prev_free {
                        return Err(self.corrupted(block, "adjacent free blocks"));
                    }
                    free.push(block);
                }

                prev_free = !header.is_allocated();
                block = block.next();
            }
            if !block.is_epilogue() {
                return Err(self.corrupted(block, "bad epilogue"));
            }

            // Walk the free list.
            let mut count = 0;
            let mut prev = None;
            let mut cur = self.free.head();
            while let Some(node) = cur {
                count += 1;
                if count > free.len() || free.binary_search(&node).is_err() {
                    return Err(self.corrupted(node, "free list node is not a free block"));
                }
                if self.free.prev_of(node) != prev {
                    return Err(self.corrupted(node, "broken back link"));
                }

                prev = cur;
                cur = self.free.next_of(node);
            }
            if count != free.len() || count != self.free.len() {
                return Err(self.corrupted(self.heap.first(), "free block missing from the free list"));
            }
        }

        Ok(())
    }

    /// A corruption error at `block`.
    fn corrupted(&self, block: Block, reason: &'static str) -> Error {
        Error::Corrupted {
            offset: self.heap.offset_of(block.payload()),
            reason,
        }
    }

    /// Perform consistency checks.
    ///
    /// See [`verify`](#method.verify).
    #[cfg(debug_assertions)]
    fn check(&self) {
        if let Err(err) = self.verify() {
            panic!("{}", err);
        }
    }

    /// No-op in release mode.
    #[cfg(not(debug_assertions))]
    #[inline]
    fn check(&self) {}

    /// A heap logger for trace output.
    #[inline]
    fn dump(&self, cur: Option<Block>) -> HeapLogger<B> {
        // Only called at points where the heap is consistent.
        unsafe { HeapLogger::new(&self.heap, cur) }
    }
}
