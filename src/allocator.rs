//! The allocator.
//!
//! This is the malloc-style surface over a bookkeeper: raw pointers in and out, with the null
//! pointer standing for both "nothing" and "failed".

use core::{mem, ptr};

use log::{debug, error};

use crate::block::Block;
use crate::bookkeeper::Bookkeeper;
use crate::brk::Sbrk;
use crate::config::Config;
use crate::fail::Error;
use crate::ptr::Pointer;

/// The initialization state.
enum State<B> {
    /// The heap is not set up yet.
    ///
    /// This holds what it will be set up from.
    Uninitialized(B, Config),
    /// The heap is ready for use.
    Initialized(Bookkeeper<B>),
    /// Initialization failed, taking the growth primitive with it.
    Failed,
}

/// A memory allocator.
///
/// The allocator goes through `init` once, then serves any number of calls. Memory is handed back
/// to the growth primitive only when the allocator (and thus the primitive) is dropped, if at all.
pub struct Allocator<B> {
    /// The internal state.
    state: State<B>,
}

impl<B: Sbrk> Allocator<B> {
    /// Create an allocator growing through `brk`, with the default tunables.
    ///
    /// Nothing happens until `init` is called.
    #[inline]
    pub fn new(brk: B) -> Allocator<B> {
        Allocator::with_config(brk, Config::default())
    }

    /// Create an allocator with custom tunables.
    #[inline]
    pub fn with_config(brk: B, config: Config) -> Allocator<B> {
        Allocator {
            state: State::Uninitialized(brk, config),
        }
    }

    /// Set up the heap.
    ///
    /// This lays out the sentinels and a first free block. It happens at most once: any later call
    /// fails with `AlreadyInitialized`, including after a failed initialization.
    pub fn init(&mut self) -> Result<(), Error> {
        match mem::replace(&mut self.state, State::Failed) {
            State::Uninitialized(brk, config) => {
                let bk = Bookkeeper::new(brk, config).map_err(|err| {
                    error!("Failed to set up the heap: {}", err);
                    err
                })?;

                debug!("Heap ready at {:#x}.", bk.bounds().start);
                self.state = State::Initialized(bk);

                Ok(())
            }
            state => {
                self.state = state;

                Err(Error::AlreadyInitialized)
            }
        }
    }

    /// Allocate `size` bytes.
    ///
    /// The returned pointer is 8-aligned. Null is returned for zero bytes, before initialization,
    /// and when the heap cannot grow enough.
    pub fn allocate(&mut self, size: usize) -> *mut u8 {
        if size == 0 {
            return ptr::null_mut();
        }

        match self.bookkeeper_mut() {
            Ok(bk) => bk.alloc(size).map_or(ptr::null_mut(), |block| block.payload().get()),
            Err(_) => ptr::null_mut(),
        }
    }

    /// Release an allocation.
    ///
    /// Releasing null does nothing.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or returned by this allocator, and not released since. Nothing checks
    /// this (see `Checked` for a layer that does).
    pub unsafe fn release(&mut self, ptr: *mut u8) {
        let ptr = match Pointer::try_new(ptr) {
            Some(ptr) => ptr,
            None => return,
        };

        if let Ok(bk) = self.bookkeeper_mut() {
            bk.free(Block::from_payload(ptr));
        }
    }

    /// Resize an allocation, moving it if need be.
    ///
    /// The content is kept up to the smaller of the old and new sizes. A null `ptr` makes this an
    /// allocation, and a zero `size` a release (returning null). On failure, null is returned and
    /// the old allocation is left untouched.
    ///
    /// # Safety
    ///
    /// As for `release`.
    pub unsafe fn reallocate(&mut self, ptr: *mut u8, size: usize) -> *mut u8 {
        let old = match Pointer::try_new(ptr) {
            Some(old) => old,
            None => return self.allocate(size),
        };

        if size == 0 {
            self.release(ptr);
            return ptr::null_mut();
        }

        match self.bookkeeper_mut() {
            Ok(bk) => bk
                .realloc(Block::from_payload(old), size)
                .map_or(ptr::null_mut(), |block| block.payload().get()),
            Err(_) => ptr::null_mut(),
        }
    }
}

impl<B> Allocator<B> {
    /// Is the heap set up?
    #[inline]
    pub fn is_initialized(&self) -> bool {
        matches!(self.state, State::Initialized(_))
    }

    /// The bookkeeper, for introspection.
    pub fn bookkeeper(&self) -> Result<&Bookkeeper<B>, Error> {
        match self.state {
            State::Initialized(ref bk) => Ok(bk),
            _ => Err(Error::Uninitialized),
        }
    }

    /// Check the heap for consistency.
    ///
    /// See `Bookkeeper::verify`.
    pub fn verify(&self) -> Result<(), Error> {
        self.bookkeeper()?.verify()
    }

    /// The size of the heap, zero before initialization.
    pub fn heap_size(&self) -> usize {
        self.bookkeeper().map_or(0, |bk| bk.heap_size())
    }

    /// The bookkeeper, mutably.
    pub(crate) fn bookkeeper_mut(&mut self) -> Result<&mut Bookkeeper<B>, Error> {
        match self.state {
            State::Initialized(ref mut bk) => Ok(bk),
            _ => Err(Error::Uninitialized),
        }
    }
}
