//! LHA/LZH archive calculator.
//!
//! Only the first header is read; the chunk is the header plus the declared
//! compressed payload. Level 0 and 1 headers carry a one-byte size and a
//! checksum, level 2 headers a two-byte size in the same position. The
//! level 0/1 layout is decoded and reinterpreted for level 2.

use super::{seven_zip_command, Handler, Signature};
use crate::chunk::ValidChunk;
use crate::error::{Error, Result};
use crate::layout::{Endian, Field, FieldKind, Layout};
use crate::source::ByteSource;
use std::ffi::OsString;
use std::io::SeekFrom;
use std::path::Path;
use tracing::{trace, Span};

const NAME: &str = "lzh";

/// Bytes that follow the declared header region of level 0/1 headers
const PADDING_LEN: u64 = 2;

/// Level 0/1 header
pub const LZH_DEFAULT_HEADER: Layout = Layout::new(
    "lzh_default_header",
    &[
        Field::new("header_size", FieldKind::U8),
        Field::new("header_checksum", FieldKind::U8),
        Field::new("method_id", FieldKind::Chars(5)),
        Field::new("compressed_size", FieldKind::U32),
        Field::new("uncompressed_size", FieldKind::U32),
        Field::new("timestamp", FieldKind::U32),
        Field::new("fd_attribute", FieldKind::U8),
        Field::new("level_identifier", FieldKind::U8),
    ],
);

static SIGNATURE: Signature = Signature {
    patterns: &[
        b"-lh0-", b"-lzs-", b"-lz4-", b"-lh1-", b"-lh2-", b"-lh3-", b"-lh4-", b"-lh5-",
        b"-lh6-", b"-lh7-", b"-lh8-", b"-lhd-",
    ],
    match_offset: -2,
    constraint: "level identifier 18 bytes after the method id is <= 0x02",
};

/// Calculator for LZH archives
#[derive(Debug, Clone, Copy, Default)]
pub struct LzhHandler;

/// Total header length implied by the two leading header bytes
pub fn real_header_size(header_size: u8, header_checksum: u8, level: u8) -> u64 {
    if level == 2 {
        u64::from(header_size) | (u64::from(header_checksum) << 8)
    } else {
        u64::from(header_size) + PADDING_LEN
    }
}

impl Handler for LzhHandler {
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
        source.seek(SeekFrom::Start(start_offset))?;
        let header = LZH_DEFAULT_HEADER.parse(source, Endian::Little)?;

        let level = header.uint("level_identifier")? as u8;
        if level > 2 {
            return Err(Error::format_invalid(
                NAME,
                format!("unsupported header level {level}"),
            ));
        }

        let header_size = real_header_size(
            header.uint("header_size")? as u8,
            header.uint("header_checksum")? as u8,
            level,
        );
        let mut end_offset = start_offset + header_size + header.uint("compressed_size")?;

        // Archives end with a single NUL byte; absorb it when this is the
        // last entry in the blob.
        let length = source.length()?;
        if length.checked_sub(end_offset) == Some(1) {
            trace!(parent: log, "absorbing trailing LZH terminator at 0x{:x}", end_offset);
            end_offset = length;
        }

        ValidChunk::new(start_offset, end_offset, length).map(Some)
    }

    fn extraction_command(&self, input: &Path, output_dir: &Path) -> Vec<OsString> {
        seven_zip_command(input, output_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn header(size_lo: u8, size_hi: u8, compressed: u32, level: u8) -> Vec<u8> {
        let mut h = vec![size_lo, size_hi];
        h.extend_from_slice(b"-lh5-");
        h.extend_from_slice(&compressed.to_le_bytes());
        h.extend_from_slice(&1000u32.to_le_bytes());
        h.extend_from_slice(&0x5A5A_5A5Au32.to_le_bytes());
        h.push(0x20);
        h.push(level);
        h
    }

    fn calculate(data: &[u8], start: u64) -> Result<Option<ValidChunk>> {
        LzhHandler.calculate_chunk(&mut Cursor::new(data), start, &Span::none())
    }

    #[test]
    fn test_layout_size() {
        assert_eq!(LZH_DEFAULT_HEADER.size(), 21);
    }

    #[test]
    fn test_level_two_header_size_overlay() {
        assert_eq!(real_header_size(0x05, 0x01, 2), 0x0105);
        assert_eq!(real_header_size(0x05, 0x01, 1), 0x07);
        assert_eq!(real_header_size(0x16, 0xAB, 0), 0x18);
    }

    #[test]
    fn test_level_zero_chunk() {
        let mut data = vec![0xFF; 4];
        let start = data.len() as u64;
        data.extend_from_slice(&header(0x16, 0x00, 100, 0));
        data.resize(data.len() + 200, 0xEE);

        let chunk = calculate(&data, start).unwrap().unwrap();
        assert_eq!(chunk.end_offset(), start + 0x18 + 100);
    }

    #[test]
    fn test_level_two_chunk() {
        let mut data = header(0x05, 0x01, 0x40, 2);
        data.resize(0x0105 + 0x40 + 16, 0x11);

        let chunk = calculate(&data, 0).unwrap().unwrap();
        assert_eq!(chunk.end_offset(), 0x0105 + 0x40);
    }

    #[test]
    fn test_trailing_terminator_is_absorbed() {
        let mut data = header(0x16, 0x00, 10, 1);
        data.resize(0x18 + 10 + 1, 0x00);

        let chunk = calculate(&data, 0).unwrap().unwrap();
        assert_eq!(chunk.end_offset(), data.len() as u64);

        // Two spare bytes are not a terminator
        data.push(0x00);
        let chunk = calculate(&data, 0).unwrap().unwrap();
        assert_eq!(chunk.end_offset(), 0x18 + 10);
    }

    #[test]
    fn test_bad_level_and_truncation() {
        let mut data = header(0x16, 0x00, 10, 3);
        data.resize(64, 0);
        assert!(calculate(&data, 0).unwrap_err().is_format_invalid());

        let data = header(0x16, 0x00, 10, 0);
        assert!(calculate(&data[..12], 0).unwrap_err().is_format_invalid());

        // Declared payload runs past the end of the blob
        let data = header(0x16, 0x00, 5000, 0);
        assert!(calculate(&data, 0).unwrap_err().is_format_invalid());
    }
}
