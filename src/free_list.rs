//! The free list.
//!
//! An intrusive, doubly linked list of the free blocks. The list owns no memory: its nodes are the
//! free blocks themselves, whose first two payload words hold the links. A link is the offset of
//! the linked block's payload from the heap base, zero meaning none. Offsets keep the links a
//! word wide (so a free block fits in the minimum block size) and independent of where the heap
//! happens to be mapped.
//!
//! The list is kept loosely ordered by size: insertion places a block before the first node at
//! least as large. Nothing restores the order afterwards, so it is a hint for the first-fit scan,
//! not an invariant.

use crate::block::{Block, Link};
use crate::ptr::Pointer;

/// A free list.
pub struct FreeList {
    /// The heap base, which links are relative to.
    base: Pointer<u8>,
    /// The first node.
    head: Option<Block>,
    /// The number of nodes.
    len: usize,
}

impl FreeList {
    /// Create an empty list for the heap at `base`.
    pub fn new(base: Pointer<u8>) -> FreeList {
        FreeList {
            base,
            head: None,
            len: 0,
        }
    }

    /// The first node.
    #[inline]
    pub fn head(&self) -> Option<Block> {
        self.head
    }

    /// The number of nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Is the list empty?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Insert a free block.
    ///
    /// The block is placed before the first node whose size is at least its own, or at the tail.
    ///
    /// # Safety
    ///
    /// `block` must be a free block of this heap which is not in the list.
    pub unsafe fn insert(&mut self, block: Block) {
        let size = block.size();

        // Find the neighbours.
        let mut prev = None;
        let mut cur = self.head;
        while let Some(node) = cur {
            if node.size() >= size {
                break;
            }

            prev = cur;
            cur = self.next_of(node);
        }

        self.set(block, Link::Prev, prev);
        self.set(block, Link::Next, cur);

        match prev {
            Some(prev) => self.set(prev, Link::Next, Some(block)),
            None => self.head = Some(block),
        }
        if let Some(cur) = cur {
            self.set(cur, Link::Prev, Some(block));
        }

        self.len += 1;
    }

    /// Unlink a block.
    ///
    /// # Safety
    ///
    /// `block` must be in the list. This is not checked, and violating it corrupts the list.
    pub unsafe fn delete(&mut self, block: Block) {
        let prev = self.prev_of(block);
        let next = self.next_of(block);

        match prev {
            Some(prev) => self.set(prev, Link::Next, next),
            None => {
                debug_assert!(self.head == Some(block), "Deleting {:?}, which is not in the list.", block);
                self.head = next;
            }
        }
        if let Some(next) = next {
            self.set(next, Link::Prev, prev);
        }

        self.len -= 1;
    }

    /// Find the first block of at least `size` bytes.
    ///
    /// # Safety
    ///
    /// The list must be intact.
    pub unsafe fn fit(&self, size: usize) -> Option<Block> {
        let mut cur = self.head;
        while let Some(node) = cur {
            if node.size() >= size {
                return Some(node);
            }

            cur = self.next_of(node);
        }

        None
    }

    /// Iterate over the nodes, from the head.
    ///
    /// # Safety
    ///
    /// The list must be intact for as long as the iterator is used.
    #[inline]
    pub unsafe fn iter(&self) -> Iter {
        Iter {
            list: self,
            cur: self.head,
        }
    }

    /// The node after `block`.
    #[inline]
    pub unsafe fn next_of(&self, block: Block) -> Option<Block> {
        self.resolve(block.link(Link::Next))
    }

    /// The node before `block`.
    #[inline]
    pub unsafe fn prev_of(&self, block: Block) -> Option<Block> {
        self.resolve(block.link(Link::Prev))
    }

    /// Point a link of `block` at `to`.
    #[inline]
    unsafe fn set(&self, block: Block, link: Link, to: Option<Block>) {
        let offset = to.map_or(0, |to| (to.addr() - self.base.addr()) as u32);
        block.set_link(link, offset);
    }

    /// Turn a link into a block.
    #[inline]
    unsafe fn resolve(&self, offset: u32) -> Option<Block> {
        if offset == 0 {
            None
        } else {
            Some(Block::from_payload(self.base.add(offset as usize)))
        }
    }
}

/// An iterator over the nodes of a free list.
pub struct Iter<'a> {
    /// The list.
    list: &'a FreeList,
    /// The next node.
    cur: Option<Block>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        let block = self.cur?;
        self.cur = unsafe { self.list.next_of(block) };

        Some(block)
    }
}
