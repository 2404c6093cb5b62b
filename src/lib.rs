//! **tagalloc:** A boundary-tag allocator.
//!
//! This crate implements `malloc`-style allocation over a heap that only grows at its end. Blocks
//! carry a size tag at both ends, so neighbours can be found (and merged) in constant time, and
//! the free blocks are chained into an explicit list living inside the blocks themselves.
//!
//! Where the heap comes from is abstracted by the [`Sbrk`] trait: the program break of the process
//! ([`System`], on unix) or a fixed-capacity [`Arena`].
//!
//! The allocator is single-threaded, and every operation takes `&mut self`.
//!
//! ```
//! use tagalloc::{Allocator, Arena};
//!
//! let mut alloc = Allocator::new(Arena::new(1 << 16).unwrap());
//! alloc.init().unwrap();
//!
//! let ptr = alloc.allocate(100);
//! assert!(!ptr.is_null());
//! unsafe { alloc.release(ptr) };
//! ```

#![warn(missing_docs)]

pub mod allocator;
pub mod block;
pub mod bookkeeper;
pub mod brk;
pub mod checked;
pub mod config;
pub mod dump;
pub mod fail;
pub mod free_list;
pub mod heap;
pub mod ptr;

pub use crate::allocator::Allocator;
pub use crate::bookkeeper::BlockInfo;
#[cfg(unix)]
pub use crate::brk::System;
pub use crate::brk::{Arena, Sbrk};
pub use crate::checked::Checked;
pub use crate::config::Config;
pub use crate::fail::Error;
