//! UBI image calculator.
//!
//! UBI images do not record their physical erase block size in a place that
//! is cheap to read, so it is inferred from the spacing of erase-counter
//! headers across the whole source (see [`crate::geometry`]). The chunk then
//! extends block by block from the candidate for as long as each block
//! starts with an erase-counter header. Header CRCs and volume ids are not
//! checked.

use super::{ubireader_command, Handler, Signature};
use crate::chunk::ValidChunk;
use crate::error::{Error, Result};
use crate::geometry::infer_stride;
use crate::source::{read_full, ByteSource};
use std::ffi::OsString;
use std::io::SeekFrom;
use std::path::Path;
use tracing::{debug, Span};

const NAME: &str = "ubi";

/// Erase-counter header magic at the start of every PEB
pub const UBI_EC_HEADER: [u8; 4] = *b"UBI#";

static SIGNATURE: Signature = Signature {
    patterns: &[b"UBI#\x01"],
    match_offset: 0,
    constraint: "erase-counter header magic followed by version 1",
};

/// Calculator for UBI images
#[derive(Debug, Clone, Copy, Default)]
pub struct UbiHandler;

/// Walk PEB-sized strides from `start` while each block begins with the
/// erase-counter magic. Returns the first offset that does not.
pub fn walk_blocks(source: &mut dyn ByteSource, start: u64, peb_size: u64) -> Result<u64> {
    let mut offset = start;
    let mut window = [0u8; UBI_EC_HEADER.len()];
    loop {
        source.seek(SeekFrom::Start(offset))?;
        let got = read_full(source, &mut window)?;
        if got < window.len() || window != UBI_EC_HEADER {
            return Ok(offset);
        }
        offset += peb_size;
    }
}

impl Handler for UbiHandler {
    fn name(&self) -> &'static str {
        NAME
    }

    fn signature(&self) -> &'static Signature {
        &SIGNATURE
    }

    fn calculate_chunk(
        &self,
        source: &mut dyn ByteSource,
        start_offset: u64,
        log: &Span,
    ) -> Result<Option<ValidChunk>> {
        let peb_size = match infer_stride(source, &UBI_EC_HEADER) {
            Ok(size) => size,
            Err(Error::PebSizeNotFound) => {
                debug!(parent: log, "too few UBI erase blocks to infer the PEB size");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        debug!(parent: log, "guessed UBI PEB size: {} bytes", peb_size);

        let length = source.length()?;
        let end_offset = walk_blocks(source, start_offset, peb_size)?.min(length);
        if end_offset <= start_offset {
            return Ok(None);
        }

        ValidChunk::new(start_offset, end_offset, length).map(Some)
    }

    fn extraction_command(&self, input: &Path, output_dir: &Path) -> Vec<OsString> {
        ubireader_command("ubireader_extract_images", input, output_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const PEB: usize = 4096;

    fn image(blocks: usize) -> Vec<u8> {
        let mut data = vec![0xFF; blocks * PEB];
        for block in 0..blocks {
            let at = block * PEB;
            data[at..at + 4].copy_from_slice(&UBI_EC_HEADER);
            data[at + 4] = 1;
        }
        data
    }

    fn calculate(data: &[u8], start: u64) -> Result<Option<ValidChunk>> {
        UbiHandler.calculate_chunk(&mut Cursor::new(data), start, &Span::none())
    }

    #[test]
    fn test_blocks_followed_by_other_data() {
        let mut data = vec![0x00; 512];
        data.extend_from_slice(&image(6));
        data.extend_from_slice(&[0x5A; 3 * PEB]);

        let chunk = calculate(&data, 512).unwrap().unwrap();
        assert_eq!(chunk.end_offset(), 512 + 6 * PEB as u64);
    }

    #[test]
    fn test_image_runs_to_end_of_source() {
        let data = image(3);
        let chunk = calculate(&data, 0).unwrap().unwrap();
        assert_eq!(chunk.end_offset(), data.len() as u64);
    }

    #[test]
    fn test_last_block_truncated() {
        let mut data = image(3);
        data.truncate(2 * PEB + 100);
        let chunk = calculate(&data, 0).unwrap().unwrap();
        assert_eq!(chunk.end_offset(), data.len() as u64);
    }

    #[test]
    fn test_too_few_markers() {
        let data = image(1);
        assert!(calculate(&data, 0).unwrap().is_none());

        let data = vec![0u8; PEB];
        assert!(calculate(&data, 0).unwrap().is_none());
    }

    #[test]
    fn test_candidate_not_on_marker() {
        let data = image(4);
        assert!(calculate(&data, 10).unwrap().is_none());
    }
}
