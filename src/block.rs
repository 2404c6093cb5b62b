//! Memory blocks.
//!
//! Blocks are the main unit of the heap. A block is a run of bytes flanked by two boundary tags,
//! each one word encoding the block size and whether it is allocated:
//!
//! ```notrust
//!           header          payload (8-aligned)                footer
//!   ... | size | a |  .................................  | size | a | ...
//!                  ^
//!                  block pointer
//! ```
//!
//! A free block reuses the first two payload words as the links of the free list. The block size
//! counts both tags, so the minimum block is four words.
//!
//! Everything in here reads or writes raw heap memory. The functions are only sound on a block
//! pointer inside a well-formed heap; this module is the only place that knows the offsets.

use core::{cmp, fmt, ptr};

use crate::config::{ALIGNMENT, DOUBLE_WORD, MAX_BLOCK, MIN_BLOCK, OVERHEAD, WORD};
use crate::ptr::Pointer;

/// A boundary tag.
///
/// The size is a multiple of 8, so the low three bits are free. The lowest holds the allocated
/// flag.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Tag(u32);

impl Tag {
    /// The tag of the epilogue: zero-sized and allocated.
    pub const EPILOGUE: Tag = Tag(1);

    /// Pack a size and an allocated flag.
    #[inline]
    pub fn new(size: usize, allocated: bool) -> Tag {
        debug_assert!(size % ALIGNMENT == 0, "Unaligned block size {}.", size);
        debug_assert!(size <= MAX_BLOCK, "Block size {} does not fit in a tag.", size);

        Tag(size as u32 | allocated as u32)
    }

    /// The block size.
    #[inline]
    pub fn size(self) -> usize {
        (self.0 & !(ALIGNMENT as u32 - 1)) as usize
    }

    /// Is the block allocated?
    #[inline]
    pub fn is_allocated(self) -> bool {
        self.0 & 1 != 0
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.size(), if self.is_allocated() { 'a' } else { 'f' })
    }
}

/// Round `size` up to the alignment, or `None` on overflow.
#[inline]
pub fn align(size: usize) -> Option<usize> {
    Some(size.checked_add(ALIGNMENT - 1)? & !(ALIGNMENT - 1))
}

/// The block size needed to serve a request of `request` payload bytes.
///
/// This adds the tags, rounds up to the alignment and clamps to the minimum block. `None` if the
/// result does not fit in a tag.
#[inline]
pub fn adjusted_size(request: usize) -> Option<usize> {
    let size = cmp::max(align(request.checked_add(OVERHEAD)?)?, MIN_BLOCK);

    if size > MAX_BLOCK {
        None
    } else {
        Some(size)
    }
}

/// One of the two free-list links stored in a free block's payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Link {
    /// The next free block.
    Next = 0,
    /// The previous free block.
    Prev = 1,
}

/// A block, identified by its payload pointer.
///
/// This is merely a view: copying a `Block` copies the pointer, never the memory.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Block {
    /// The pointer to the start of the payload.
    ptr: Pointer<u8>,
}

impl Block {
    /// Construct a block from its payload pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must be the payload of a block in a well-formed heap (or the block about to be
    /// formatted there), for every other method to be sound.
    #[inline]
    pub unsafe fn from_payload(ptr: Pointer<u8>) -> Block {
        debug_assert!(ptr.aligned_to(ALIGNMENT), "Unaligned payload {:?}.", ptr);

        Block { ptr }
    }

    /// The payload pointer.
    #[inline]
    pub fn payload(self) -> Pointer<u8> {
        self.ptr
    }

    /// The payload address.
    #[inline]
    pub fn addr(self) -> usize {
        self.ptr.addr()
    }

    /// Read the header.
    #[inline]
    pub unsafe fn header(self) -> Tag {
        Tag(ptr::read(self.ptr.sub(WORD).cast::<u32>().get()))
    }

    /// Read the footer.
    ///
    /// The footer is located through the size in the header.
    #[inline]
    pub unsafe fn footer(self) -> Tag {
        Tag(ptr::read(self.footer_at(self.size())))
    }

    /// The block size, tags included.
    #[inline]
    pub unsafe fn size(self) -> usize {
        self.header().size()
    }

    /// The number of usable payload bytes.
    #[inline]
    pub unsafe fn payload_size(self) -> usize {
        self.size() - OVERHEAD
    }

    /// Is this block allocated?
    #[inline]
    pub unsafe fn is_allocated(self) -> bool {
        self.header().is_allocated()
    }

    /// Is this the epilogue?
    #[inline]
    pub unsafe fn is_epilogue(self) -> bool {
        self.header() == Tag::EPILOGUE
    }

    /// Write both tags.
    ///
    /// The footer goes where the new size puts it, so this also resizes the block.
    #[inline]
    pub unsafe fn set_tags(self, size: usize, allocated: bool) {
        let tag = Tag::new(size, allocated);

        ptr::write(self.ptr.sub(WORD).cast::<u32>().get(), tag.0);
        ptr::write(self.footer_at(size), tag.0);
    }

    /// Turn this block into the epilogue.
    ///
    /// Only the header is written, there is no footer.
    #[inline]
    pub unsafe fn set_epilogue(self) {
        ptr::write(self.ptr.sub(WORD).cast::<u32>().get(), Tag::EPILOGUE.0);
    }

    /// The physically following block.
    #[inline]
    pub unsafe fn next(self) -> Block {
        Block {
            ptr: self.ptr.add(self.size()),
        }
    }

    /// The footer of the physically preceding block.
    #[inline]
    pub unsafe fn prev_tag(self) -> Tag {
        Tag(ptr::read(self.ptr.sub(DOUBLE_WORD).cast::<u32>().get()))
    }

    /// The physically preceding block.
    ///
    /// The footer is the only way to find it, which is why allocated blocks keep theirs.
    #[inline]
    pub unsafe fn prev(self) -> Block {
        Block {
            ptr: self.ptr.sub(self.prev_tag().size()),
        }
    }

    /// Read a free-list link.
    #[inline]
    pub unsafe fn link(self, link: Link) -> u32 {
        ptr::read(self.ptr.cast::<u32>().get().add(link as usize))
    }

    /// Write a free-list link.
    #[inline]
    pub unsafe fn set_link(self, link: Link, value: u32) {
        ptr::write(self.ptr.cast::<u32>().get().add(link as usize), value);
    }

    /// memcpy `len` payload bytes to another block.
    #[inline]
    pub unsafe fn copy_to(self, block: Block, len: usize) {
        debug_assert!(len <= self.payload_size(), "Copy reads past the source payload.");
        debug_assert!(len <= block.payload_size(), "Copy writes past the target payload.");

        ptr::copy_nonoverlapping(self.ptr.get(), block.ptr.get(), len);
    }

    /// Zero the payload.
    #[cfg(feature = "security")]
    pub unsafe fn zero(self) {
        ptr::write_bytes(self.ptr.get(), 0, self.payload_size());
    }

    /// The footer location for a block of `size` bytes.
    #[inline]
    unsafe fn footer_at(self, size: usize) -> *mut u32 {
        self.ptr.add(size).sub(DOUBLE_WORD).cast::<u32>().get()
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.ptr)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Lay out `[24 | 32 | epilogue]` in an 8-aligned buffer.
    unsafe fn layout(buf: &mut [u64; 16]) -> (Block, Block) {
        let base = Pointer::new(buf.as_mut_ptr() as *mut u8);
        let a = Block::from_payload(base.add(8));
        a.set_tags(24, true);
        let b = a.next();
        b.set_tags(32, false);
        b.next().set_epilogue();

        (a, b)
    }

    #[test]
    fn test_tag() {
        let tag = Tag::new(4096, true);
        assert_eq!(tag.size(), 4096);
        assert!(tag.is_allocated());

        let tag = Tag::new(24, false);
        assert_eq!(tag.size(), 24);
        assert!(!tag.is_allocated());

        assert_eq!(Tag::EPILOGUE.size(), 0);
        assert!(Tag::EPILOGUE.is_allocated());
        assert_eq!(Tag::new(MAX_BLOCK, false).size(), MAX_BLOCK);
    }

    #[test]
    fn test_adjusted_size() {
        assert_eq!(adjusted_size(1), Some(16));
        assert_eq!(adjusted_size(8), Some(16));
        assert_eq!(adjusted_size(9), Some(24));
        assert_eq!(adjusted_size(16), Some(24));
        assert_eq!(adjusted_size(100), Some(112));
        assert_eq!(adjusted_size(MAX_BLOCK - OVERHEAD), Some(MAX_BLOCK));
        assert_eq!(adjusted_size(MAX_BLOCK), None);
        assert_eq!(adjusted_size(usize::MAX), None);
        assert_eq!(align(usize::MAX), None);
    }

    #[test]
    fn test_neighbours() {
        let mut buf = [0u64; 16];

        unsafe {
            let (a, b) = layout(&mut buf);

            assert_eq!(a.header(), a.footer());
            assert_eq!(b.header(), b.footer());
            assert_eq!(a.size(), 24);
            assert_eq!(a.payload_size(), 16);
            assert_eq!(b.addr() - a.addr(), 24);

            assert_eq!(b.prev(), a);
            assert!(b.prev_tag().is_allocated());
            assert!(!b.is_allocated());

            let end = b.next();
            assert!(end.is_epilogue());
            assert!(end.is_allocated());
            assert_eq!(end.size(), 0);
            assert!(!end.prev_tag().is_allocated());
        }
    }

    #[test]
    fn test_links() {
        let mut buf = [0u64; 16];

        unsafe {
            let (a, b) = layout(&mut buf);

            b.set_link(Link::Next, 40);
            b.set_link(Link::Prev, 0);
            assert_eq!(b.link(Link::Next), 40);
            assert_eq!(b.link(Link::Prev), 0);

            // The links live in the payload, the tags stay intact.
            assert_eq!(b.header(), Tag::new(32, false));
            assert_eq!(b.footer(), Tag::new(32, false));
            assert_eq!(a.footer(), Tag::new(24, true));
        }
    }

    #[test]
    fn test_resize() {
        let mut buf = [0u64; 16];

        unsafe {
            let (a, b) = layout(&mut buf);

            // Absorb `b` into `a`.
            a.set_tags(a.size() + b.size(), false);
            assert_eq!(a.size(), 56);
            assert_eq!(a.footer(), Tag::new(56, false));
            assert!(a.next().is_epilogue());
        }
    }

    #[test]
    fn test_copy() {
        let mut buf = [0u64; 16];

        unsafe {
            let (a, b) = layout(&mut buf);

            ptr::write_bytes(a.payload().get(), 0xAB, a.payload_size());
            a.copy_to(b, 16);

            assert_eq!(*b.payload().get(), 0xAB);
            assert_eq!(*b.payload().add(15).get(), 0xAB);
            assert_eq!(*b.payload().add(16).get(), 0);
        }
    }
}
