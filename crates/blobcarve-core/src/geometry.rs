//! Statistical inference of unknown block geometry.
//!
//! Some formats repeat a fixed header at every block boundary without
//! recording the block size anywhere we can read cheaply. Given every offset
//! at which that header occurs, the most common gap between consecutive
//! occurrences is taken as the block stride.
//!
//! This is a heuristic. A blob holding several images with different block
//! sizes yields whichever size dominates.

use crate::error::{Error, Result};
use crate::source::{find_all, ByteSource};
use std::collections::HashMap;

/// Gaps between each offset and the next one.
///
/// Offsets are expected in ascending order.
pub fn intervals(offsets: &[u64]) -> Vec<u64> {
    offsets.windows(2).map(|pair| pair[1] - pair[0]).collect()
}

/// Most frequent value; ties go to the value seen first
pub fn mode(values: &[u64]) -> Option<u64> {
    let mut counts: HashMap<u64, usize> = HashMap::new();
    for &value in values {
        *counts.entry(value).or_default() += 1;
    }

    let mut best: Option<(u64, usize)> = None;
    for &value in values {
        let count = counts[&value];
        match best {
            Some((_, best_count)) if best_count >= count => {}
            _ => best = Some((value, count)),
        }
    }
    best.map(|(value, _)| value)
}

/// Infer the repeat stride of `marker` across the whole source.
///
/// Fails with [`Error::PebSizeNotFound`] when fewer than two occurrences
/// exist.
pub fn infer_stride(source: &mut dyn ByteSource, marker: &[u8]) -> Result<u64> {
    let offsets = find_all(source, marker)?;
    mode(&intervals(&offsets)).ok_or(Error::PebSizeNotFound)
}
