//! Heap dumps for the log.
//!
//! This renders the block structure of a heap in a single line, like:
//!
//! ```notrust
//! xx_x|_x
//! ```
//!
//! where `x` denotes an allocated block and `_` a free block, with `|` marking the cursor: the
//! block an operation revolves around.

use core::fmt;

use crate::block::Block;
use crate::heap::Heap;

/// A "heap logger".
///
/// Formatting walks the heap, so this is cheap to build and only costs when actually logged.
pub struct HeapLogger<'a, B> {
    /// The heap.
    heap: &'a Heap<B>,
    /// The cursor.
    ///
    /// This is where the `|` will be printed.
    cur: Option<Block>,
}

impl<'a, B> HeapLogger<'a, B> {
    /// Create a logger.
    ///
    /// # Safety
    ///
    /// The heap must be well-formed whenever the logger is formatted.
    pub unsafe fn new(heap: &'a Heap<B>, cur: Option<Block>) -> HeapLogger<'a, B> {
        HeapLogger { heap, cur }
    }
}

impl<'a, B> fmt::Debug for HeapLogger<'a, B> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut is_printed = false;

        for block in unsafe { self.heap.blocks() } {
            if self.cur == Some(block) {
                is_printed = true;
                write!(f, "|")?;
            }

            if unsafe { block.is_allocated() } {
                write!(f, "x")?;
            } else {
                write!(f, "_")?;
            }
        }

        // The cursor is out of range (e.g. at the epilogue).
        if self.cur.is_some() && !is_printed {
            write!(f, "…|")?;
        }

        Ok(())
    }
}
