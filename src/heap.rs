//! The heap region.
//!
//! This keeps track of the bounds of the heap and grows it through the [`Sbrk`] it owns. The heap
//! looks like this:
//!
//! ```notrust
//!   base                                                          end
//!   | pad | prologue hdr | prologue ftr | block | block | ... | epilogue hdr |
//! ```
//!
//! The prologue and the epilogue are allocated sentinels, so neighbour lookups never have to check
//! for the edges.

use core::ptr;

use log::{debug, warn};

use crate::block::{self, Block};
use crate::brk::Sbrk;
use crate::config::{DOUBLE_WORD, MAX_BLOCK, MIN_BLOCK};
use crate::fail::{self, Error};
use crate::ptr::Pointer;

/// The heap region.
pub struct Heap<B> {
    /// The growth primitive.
    brk: B,
    /// The start of the heap (the alignment pad).
    ///
    /// Always aligned. Free-list links are offsets from here.
    base: Pointer<u8>,
    /// The end of the heap, one past the epilogue header.
    end: Pointer<u8>,
}

impl<B: Sbrk> Heap<B> {
    /// Create an empty heap at the current break.
    ///
    /// This writes the pad, the prologue and the epilogue, but creates no free block.
    pub fn new(mut brk: B) -> Result<Heap<B>, Error> {
        let cur = brk.sbrk(0)?;
        let pad = block::align(cur.addr()).ok_or_else(|| fail::oom(0))? - cur.addr();

        // Reserve the four sentinel words, prefixed by whatever it takes to align them.
        let start = brk.sbrk(pad + 2 * DOUBLE_WORD)?;
        if start != cur {
            warn!("The break moved from {:?} to {:?} while setting up the heap.", cur, start);
            return Err(Error::Discontiguous);
        }

        let heap = unsafe {
            let base = start.add(pad);
            Heap {
                brk,
                base,
                end: base.add(2 * DOUBLE_WORD),
            }
        };

        unsafe {
            // The four words were just reserved.
            ptr::write(heap.base.cast::<u32>().get(), 0);
            heap.prologue().set_tags(DOUBLE_WORD, true);
            heap.epilogue().set_epilogue();
        }

        debug!("Created a heap at {:?}.", heap.base);

        Ok(heap)
    }

    /// Extend the heap by `size` bytes, rounded up to the alignment.
    ///
    /// The new space is formatted as a single free block, whose header replaces the old epilogue,
    /// followed by a new epilogue. The block is returned, not yet in any free list nor coalesced.
    pub fn extend(&mut self, size: usize) -> Result<Block, Error> {
        debug_assert!(size >= MIN_BLOCK, "Extending the heap by less than a block.");

        let size = block::align(size)
            .filter(|&size| self.size().checked_add(size).map_or(false, |total| total <= MAX_BLOCK))
            .ok_or_else(|| fail::oom(size))?;

        debug!("Extending the heap at {:?} by {} bytes.", self.end, size);

        let old = self.brk.sbrk(size)?;
        if old != self.end {
            // The memory is lost to us, but the heap is still intact.
            warn!("The break is at {:?}, but the heap ends at {:?}.", old, self.end);
            return Err(Error::Discontiguous);
        }

        unsafe {
            // The old epilogue header becomes the header of the new block.
            let block = Block::from_payload(old);
            self.end = old.add(size);
            block.set_tags(size, false);
            block.next().set_epilogue();

            Ok(block)
        }
    }
}

impl<B> Heap<B> {
    /// The start of the heap.
    #[inline]
    pub fn base(&self) -> Pointer<u8> {
        self.base
    }

    /// The end of the heap.
    #[inline]
    pub fn end(&self) -> Pointer<u8> {
        self.end
    }

    /// The size of the heap, sentinels included.
    #[inline]
    pub fn size(&self) -> usize {
        self.end.addr() - self.base.addr()
    }

    /// The offset of `ptr` from the heap base.
    #[inline]
    pub fn offset_of(&self, ptr: Pointer<u8>) -> usize {
        ptr.addr() - self.base.addr()
    }

    /// Is `addr` within the block area of the heap?
    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.first().addr() && addr < self.end.addr()
    }

    /// The prologue block.
    #[inline]
    pub fn prologue(&self) -> Block {
        unsafe { Block::from_payload(self.base.add(DOUBLE_WORD)) }
    }

    /// The first block after the prologue.
    ///
    /// This is the epilogue if the heap has no blocks.
    #[inline]
    pub fn first(&self) -> Block {
        unsafe { Block::from_payload(self.base.add(2 * DOUBLE_WORD)) }
    }

    /// The epilogue.
    #[inline]
    pub fn epilogue(&self) -> Block {
        unsafe { Block::from_payload(self.end) }
    }

    /// Walk the blocks in address order, sentinels excluded.
    ///
    /// # Safety
    ///
    /// The tags must be well-formed. The walk stops at the end of the heap or at a zero size,
    /// but it trusts every size it reads.
    #[inline]
    pub unsafe fn blocks(&self) -> Blocks {
        Blocks {
            cur: self.first(),
            end: self.end,
        }
    }
}

/// An iterator over the blocks of a heap.
pub struct Blocks {
    /// The next block to yield.
    cur: Block,
    /// The end of the heap.
    end: Pointer<u8>,
}

impl Iterator for Blocks {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        let block = self.cur;

        unsafe {
            if block.addr() >= self.end.addr() || block.size() == 0 {
                return None;
            }

            self.cur = block.next();
        }

        Some(block)
    }
}
