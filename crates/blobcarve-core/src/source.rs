//! Random-access byte sources and the search primitives built on them.
//!
//! Calculators operate on `&mut dyn ByteSource`. Any `Read + Seek` type is a
//! byte source, so an in-memory `Cursor<&[u8]>` and a `File` are equally
//! valid inputs. Each calculator invocation owns the cursor position for its
//! duration and leaves it unspecified on return.

use crate::error::Result;
use std::io::{ErrorKind, Read, Seek, SeekFrom};

/// Size of the reads issued by the scanning helpers
const SEARCH_CHUNK: usize = 64 * 1024;

/// A seekable, byte-addressable view over an input blob
pub trait ByteSource: Read + Seek {
    /// Current absolute read position
    fn tell(&mut self) -> Result<u64> {
        Ok(self.stream_position()?)
    }

    /// Total length of the source in bytes.
    ///
    /// The read position is restored before returning.
    fn length(&mut self) -> Result<u64> {
        let position = self.stream_position()?;
        let end = self.seek(SeekFrom::End(0))?;
        if position != end {
            self.seek(SeekFrom::Start(position))?;
        }
        Ok(end)
    }
}

impl<T: Read + Seek> ByteSource for T {}

/// Read until `buf` is full or the source is exhausted.
///
/// Returns the number of bytes actually placed in `buf`.
pub fn read_full(source: &mut dyn ByteSource, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Skip forward over a run of `byte`, starting at the current position.
///
/// Leaves the source positioned on the first byte that differs and returns
/// that offset. If the run extends to the end of the source, the source
/// length is returned.
pub fn read_until_past(source: &mut dyn ByteSource, byte: u8) -> Result<u64> {
    let mut buf = vec![0u8; SEARCH_CHUNK];
    loop {
        let start = source.tell()?;
        let n = read_full(source, &mut buf)?;
        if n == 0 {
            return Ok(start);
        }

        if let Some(index) = buf[..n].iter().position(|&b| b != byte) {
            let end = start + index as u64;
            source.seek(SeekFrom::Start(end))?;
            return Ok(end);
        }
    }
}

/// Find every offset at which `pattern` occurs in the source.
///
/// Occurrences may overlap. The scan always covers the whole source,
/// regardless of the current position, and leaves the position unspecified.
pub fn find_all(source: &mut dyn ByteSource, pattern: &[u8]) -> Result<Vec<u64>> {
    let mut offsets = Vec::new();
    if pattern.is_empty() {
        return Ok(offsets);
    }

    source.seek(SeekFrom::Start(0))?;

    let mut buf = vec![0u8; SEARCH_CHUNK];
    let mut window: Vec<u8> = Vec::with_capacity(SEARCH_CHUNK + pattern.len());
    let mut window_start = 0u64;

    loop {
        let n = read_full(source, &mut buf)?;
        if n == 0 {
            break;
        }
        window.extend_from_slice(&buf[..n]);

        let mut from = 0;
        while let Some(index) = find_subsequence(&window[from..], pattern) {
            offsets.push(window_start + (from + index) as u64);
            from += index + 1;
        }

        // The retained tail is too short to hold a full match, so nothing
        // is reported twice.
        let keep = (pattern.len() - 1).min(window.len());
        let drained = window.len() - keep;
        window.drain(..drained);
        window_start += drained as u64;
    }

    Ok(offsets)
}

/// Find a subsequence within a byte slice
pub(crate) fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
