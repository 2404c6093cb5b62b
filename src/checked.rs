//! Checked allocation.
//!
//! The plain allocator trusts every pointer it is given back. `Checked` keeps a record of the live
//! allocations instead, and turns double releases and foreign pointers into errors, at the cost of
//! a hash set lookup per call.

use std::collections::HashSet;
use std::ptr;

use log::warn;

use crate::allocator::Allocator;
use crate::block::Block;
use crate::brk::Sbrk;
use crate::config::Config;
use crate::fail::Error;
use crate::ptr::Pointer;

/// An allocator which validates the pointers given back to it.
pub struct Checked<B> {
    /// The inner allocator.
    inner: Allocator<B>,
    /// The payload addresses of the live allocations.
    live: HashSet<usize>,
}

impl<B: Sbrk> Checked<B> {
    /// Create a checked allocator growing through `brk`.
    pub fn new(brk: B) -> Checked<B> {
        Checked::with_config(brk, Config::default())
    }

    /// Create a checked allocator with custom tunables.
    pub fn with_config(brk: B, config: Config) -> Checked<B> {
        Checked {
            inner: Allocator::with_config(brk, config),
            live: HashSet::new(),
        }
    }

    /// Set up the heap.
    ///
    /// See `Allocator::init`.
    #[inline]
    pub fn init(&mut self) -> Result<(), Error> {
        self.inner.init()
    }

    /// Allocate `size` bytes.
    ///
    /// Zero bytes give a null pointer, which is not an allocation.
    pub fn allocate(&mut self, size: usize) -> Result<*mut u8, Error> {
        if size == 0 {
            return Ok(ptr::null_mut());
        }

        let ptr = self.inner.bookkeeper_mut()?.alloc(size)?.payload().get();
        self.live.insert(ptr as usize);

        Ok(ptr)
    }

    /// Release an allocation.
    ///
    /// Releasing null does nothing. Anything else must be live, or `InvalidPointer` is returned
    /// and the heap is left alone.
    pub fn release(&mut self, ptr: *mut u8) -> Result<(), Error> {
        if ptr.is_null() {
            return Ok(());
        }

        let block = self.claim(ptr)?;
        self.live.remove(&(ptr as usize));
        // The pointer is live, so it came from this bookkeeper and was not freed since.
        unsafe { self.inner.bookkeeper_mut()?.free(block) };

        Ok(())
    }

    /// Resize an allocation.
    ///
    /// See `Allocator::reallocate`, except that errors are reported, and that `ptr` must be null
    /// or live. On error, `ptr` stays live and its content is unchanged.
    pub fn reallocate(&mut self, ptr: *mut u8, size: usize) -> Result<*mut u8, Error> {
        if ptr.is_null() {
            return self.allocate(size);
        }
        if size == 0 {
            self.release(ptr)?;
            return Ok(ptr::null_mut());
        }

        let block = self.claim(ptr)?;
        let res = unsafe { self.inner.bookkeeper_mut()?.realloc(block, size)? }.payload().get();
        self.live.remove(&(ptr as usize));
        self.live.insert(res as usize);

        Ok(res)
    }
}

impl<B> Checked<B> {
    /// Is `ptr` a live allocation?
    #[inline]
    pub fn is_live(&self, ptr: *const u8) -> bool {
        self.live.contains(&(ptr as usize))
    }

    /// The number of live allocations.
    #[inline]
    pub fn live(&self) -> usize {
        self.live.len()
    }

    /// The inner allocator, for introspection.
    #[inline]
    pub fn inner(&self) -> &Allocator<B> {
        &self.inner
    }

    /// Check the heap for consistency.
    #[inline]
    pub fn verify(&self) -> Result<(), Error> {
        self.inner.verify()
    }

    /// Get the block of a live pointer.
    fn claim(&self, ptr: *mut u8) -> Result<Block, Error> {
        match Pointer::try_new(ptr) {
            Some(ptr) if self.live.contains(&ptr.addr()) => Ok(unsafe { Block::from_payload(ptr) }),
            _ => {
                warn!("Rejecting {:p}, which is not a live allocation.", ptr);

                Err(Error::InvalidPointer(ptr as usize))
            }
        }
    }
}
