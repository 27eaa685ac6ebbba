//! gzip member calculator (RFC 1952).
//!
//! Each member of a concatenated gzip stream is its own candidate and its
//! own chunk; members are never merged. A member may be followed by zero
//! padding, which is absorbed into the chunk.

mod member;

pub use member::{MemberReader, GZIP_MAGIC, TRAILER_LEN};

use super::{seven_zip_command, Handler, Signature};
use crate::chunk::ValidChunk;
use crate::error::Result;
use crate::source::{read_until_past, ByteSource};
use std::ffi::OsString;
use std::io::SeekFrom;
use std::path::Path;
use tracing::{trace, Span};

pub(crate) const NAME: &str = "gzip";

static SIGNATURE: Signature = Signature {
    patterns: &[&[0x1F, 0x8B, 0x08]],
    match_offset: 0,
    constraint: "flags byte <= 0x1F, XFL in {2, 4}, OS in 0..=13 or 0xFF",
};

/// Calculator for single gzip members
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipHandler;

impl Handler for GzipHandler {
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

        {
            let mut member = MemberReader::new(source, log);
            if !member.read_header()? {
                return Ok(None);
            }
            member.read_until_member_end()?;
            member.verify_trailer()?;
        }

        let member_end = source.tell()?;
        let end_offset = read_until_past(source, 0x00)?;
        if end_offset > member_end {
            trace!(parent: log, "absorbed {} bytes of zero padding after gzip member", end_offset - member_end);
        }

        let length = source.length()?;
        ValidChunk::new(start_offset, end_offset, length).map(Some)
    }

    fn extraction_command(&self, input: &Path, output_dir: &Path) -> Vec<OsString> {
        seven_zip_command(input, output_dir)
    }
}
