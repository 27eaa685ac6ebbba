//! Delimited byte ranges produced by calculators.

use crate::error::{Error, Result};
use std::fmt;
use std::ops::Range;

/// A half-open byte range `[start_offset, end_offset)` believed to contain
/// one complete instance of a known format.
///
/// Construction through [`ValidChunk::new`] guarantees
/// `start_offset < end_offset <= source length`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValidChunk {
    start_offset: u64,
    end_offset: u64,
}

impl ValidChunk {
    /// Creates a chunk, checking it against the length of its source
    pub fn new(start_offset: u64, end_offset: u64, source_len: u64) -> Result<Self> {
        if end_offset <= start_offset || end_offset > source_len {
            return Err(Error::InvalidChunk {
                start: start_offset,
                end: end_offset,
                length: source_len,
            });
        }
        Ok(Self {
            start_offset,
            end_offset,
        })
    }

    /// First byte of the chunk
    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    /// One past the last byte of the chunk
    pub fn end_offset(&self) -> u64 {
        self.end_offset
    }

    /// Chunk size in bytes
    pub fn len(&self) -> u64 {
        self.end_offset - self.start_offset
    }

    /// Always false; a valid chunk spans at least one byte
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The chunk as a `usize` range for slicing an in-memory blob
    pub fn range(&self) -> Range<usize> {
        self.start_offset as usize..self.end_offset as usize
    }
}

impl fmt::Display for ValidChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}-0x{:x}", self.start_offset, self.end_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_chunk() {
        let chunk = ValidChunk::new(4, 10, 10).unwrap();
        assert_eq!(chunk.len(), 6);
        assert_eq!(chunk.range(), 4..10);
        assert_eq!(chunk.to_string(), "0x4-0xa");
    }

    #[test]
    fn test_invalid_chunks() {
        assert!(ValidChunk::new(4, 4, 10).is_err());
        assert!(ValidChunk::new(5, 4, 10).is_err());
        assert!(ValidChunk::new(4, 11, 10).is_err());
    }
}
