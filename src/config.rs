//! Configuration.
//!
//! This module contains anything which can be tweaked and customized to the users preferences, as
//! well as the layout constants everything else is built on.

use core::cmp;

use crate::fail::Error;

/// The size of a boundary tag (and of a free-list link), in bytes.
pub const WORD: usize = 4;
/// Two words.
pub const DOUBLE_WORD: usize = 2 * WORD;
/// The alignment of every payload and every block size.
pub const ALIGNMENT: usize = 8;
/// The per-block overhead: one header and one footer.
pub const OVERHEAD: usize = DOUBLE_WORD;
/// The smallest block: two tags and two free-list links.
pub const MIN_BLOCK: usize = OVERHEAD + 2 * WORD;
/// The largest block (and heap) size representable in a tag.
pub const MAX_BLOCK: usize = u32::MAX as usize & !(ALIGNMENT - 1);

/// The default amount of bytes the heap is extended by when nothing fits.
///
/// Larger requests extend by exactly what they need.
pub const CHUNK_SIZE: usize = 1 << 12;
/// The default split threshold.
///
/// Requests below this are carved from the front of a free block, requests at or above it from
/// the back, which keeps the big free remainder at a stable address.
pub const SPLIT_THRESHOLD: usize = ALIGNMENT << 3;
/// The default reallocation slack.
///
/// Growing reallocations reserve this much extra room, so that a series of small growths does not
/// copy every time.
pub const REALLOC_SLACK: usize = 1 << 7;
/// The default size of the free block created by `init`.
pub const INITIAL_EXTEND: usize = 1 << 6;

/// Tunables of a single allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// The minimum heap extension.
    pub chunk_size: usize,
    /// See [`SPLIT_THRESHOLD`].
    pub split_threshold: usize,
    /// See [`REALLOC_SLACK`].
    pub realloc_slack: usize,
    /// The size of the free block created by `init`.
    pub initial_extend: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            chunk_size: CHUNK_SIZE,
            split_threshold: SPLIT_THRESHOLD,
            realloc_slack: REALLOC_SLACK,
            initial_extend: INITIAL_EXTEND,
        }
    }
}

impl Config {
    /// Check that the values can be used.
    pub fn validate(&self) -> Result<(), Error> {
        if self.chunk_size < MIN_BLOCK || self.chunk_size > MAX_BLOCK {
            return Err(Error::InvalidConfig("chunk size must lie within block size bounds"));
        }
        if self.initial_extend < MIN_BLOCK || self.initial_extend > MAX_BLOCK {
            return Err(Error::InvalidConfig("initial extension must lie within block size bounds"));
        }
        if self.realloc_slack > MAX_BLOCK {
            return Err(Error::InvalidConfig("reallocation slack exceeds the block size bound"));
        }

        Ok(())
    }

    /// Canonicalize a heap extension.
    ///
    /// Growing the heap can be expensive, which is why we would rather acquire more memory than
    /// necessary. The return value is always greater than or equal to the argument.
    #[inline]
    pub fn extend_size(&self, min: usize) -> usize {
        cmp::max(min, self.chunk_size)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_reference_values() {
        assert_eq!(MIN_BLOCK, 16);
        assert_eq!(CHUNK_SIZE, 4096);
        assert_eq!(SPLIT_THRESHOLD, 64);
        assert_eq!(REALLOC_SLACK, 128);
        assert_eq!(MAX_BLOCK % ALIGNMENT, 0);
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate() {
        let config = Config { chunk_size: 8, ..Config::default() };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = Config { initial_extend: 0, ..Config::default() };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = Config { split_threshold: 0, realloc_slack: 0, ..Config::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_extend_size() {
        let config = Config::default();
        assert_eq!(config.extend_size(24), CHUNK_SIZE);
        assert_eq!(config.extend_size(10000), 10000);
    }
}
