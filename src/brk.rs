//! BRK abstractions.
//!
//! The heap lives in a region that can only grow at its end. Where that region comes from is up to
//! an implementation of [`Sbrk`]: the real program break of the process, or an [`Arena`] of fixed
//! capacity carved out of the host allocator.

use std::alloc::{self, Layout};

use log::trace;

use crate::config::ALIGNMENT;
use crate::fail::{self, Error};
use crate::ptr::Pointer;

/// A growable, contiguous memory region.
pub trait Sbrk {
    /// Extend the region by `size` bytes, and return the old end.
    ///
    /// `sbrk(0)` queries the current end. The returned memory stays valid for as long as the
    /// implementor lives. On failure the region is unchanged.
    fn sbrk(&mut self, size: usize) -> Result<Pointer<u8>, Error>;
}

impl<B: Sbrk + ?Sized> Sbrk for &mut B {
    fn sbrk(&mut self, size: usize) -> Result<Pointer<u8>, Error> {
        (**self).sbrk(size)
    }
}

/// The program break of the process.
///
/// Nothing else may move the break while an allocator uses this. If something does, the heap
/// extension notices and fails rather than creating a gap.
#[cfg(unix)]
#[derive(Debug, Default)]
pub struct System;

#[cfg(unix)]
impl Sbrk for System {
    fn sbrk(&mut self, size: usize) -> Result<Pointer<u8>, Error> {
        trace!("Incrementing the program break by {} bytes.", size);

        // Important! The conversion is failable to avoid arithmetic overflow-based attacks.
        let incr = libc::intptr_t::try_from(size).map_err(|_| fail::oom(size))?;

        // Break it to me, babe!
        let old = unsafe { libc::sbrk(incr) };

        // Whenever it fails, it returns `(void *) -1` and leaves the break alone.
        if old as usize == usize::MAX {
            return Err(fail::oom(size));
        }

        Pointer::try_new(old as *mut u8).ok_or_else(|| fail::oom(size))
    }
}

/// A fixed-capacity region.
///
/// The whole capacity is reserved from the host allocator up front, and handed out by moving a
/// break through it. Every arena is independent, so allocators built on them can live side by
/// side (which the tests make heavy use of).
#[derive(Debug)]
pub struct Arena {
    /// The start of the reserved memory.
    start: Pointer<u8>,
    /// The break, as an offset from `start`.
    brk: usize,
    /// The layout the memory was reserved with.
    layout: Layout,
}

impl Arena {
    /// The alignment of the reserved memory.
    const ALIGN: usize = 2 * ALIGNMENT;

    /// Reserve an arena of `capacity` bytes.
    pub fn new(capacity: usize) -> Result<Arena, Error> {
        let layout = Layout::from_size_align(capacity.max(Arena::ALIGN), Arena::ALIGN)
            .map_err(|_| fail::oom(capacity))?;

        // The layout is never zero-sized.
        let start = Pointer::try_new(unsafe { alloc::alloc(layout) }).ok_or_else(|| fail::oom(capacity))?;

        Ok(Arena { start, brk: 0, layout })
    }

    /// The number of bytes that can still be handed out.
    pub fn remaining(&self) -> usize {
        self.layout.size() - self.brk
    }
}

impl Sbrk for Arena {
    fn sbrk(&mut self, size: usize) -> Result<Pointer<u8>, Error> {
        trace!("Moving the arena break by {} bytes ({} remaining).", size, self.remaining());

        if size > self.remaining() {
            return Err(fail::oom(size));
        }

        // The old break is within (or one past) the reservation.
        let old = unsafe { self.start.add(self.brk) };
        self.brk += size;

        Ok(old)
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.start.get(), self.layout) }
    }
}
