//! General error handling.
//!
//! Note that most of these never reach the caller of the plain allocator: the facade surfaces
//! failures as null pointers, the way `malloc` does. They are reported as values by the lower
//! layers and by the checked allocator.

use thiserror::Error;

/// An allocator error.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The growth primitive could not extend the heap (or the heap would outgrow the 32-bit
    /// offsets used by the free list).
    #[error("Out of address space ({requested} bytes requested)")]
    OutOfAddressSpace {
        /// The number of bytes the heap was asked to grow by.
        requested: usize,
    },
    /// The break moved behind our back, so the new region is not adjacent to the heap.
    #[error("The program break was moved by someone else")]
    Discontiguous,
    /// `init` was called twice.
    #[error("Allocator is already initialized")]
    AlreadyInitialized,
    /// An operation was attempted before `init` (or after a failed one).
    #[error("Allocator is not initialized")]
    Uninitialized,
    /// The pointer is not a live allocation (double release or foreign pointer).
    #[error("Pointer {0:#x} is not a live allocation")]
    InvalidPointer(usize),
    /// The consistency walk found a broken invariant.
    #[error("Heap corrupted at offset {offset:#x}: {reason}")]
    Corrupted {
        /// The heap offset of the offending block.
        offset: usize,
        /// What is wrong with it.
        reason: &'static str,
    },
    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Shorthand for the out-of-address-space error.
#[cold]
pub fn oom(requested: usize) -> Error {
    log::warn!("Out of address space while requesting {} bytes.", requested);

    Error::OutOfAddressSpace { requested }
}
