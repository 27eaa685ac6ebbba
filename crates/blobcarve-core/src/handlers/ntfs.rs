//! NTFS volume calculator.
//!
//! The volume size comes from the boot sector: total sector count times
//! bytes per sector. The chunk spans the boot sector plus that many bytes.

use super::{seven_zip_command, Handler, Signature};
use crate::chunk::ValidChunk;
use crate::error::Result;
use crate::layout::{Endian, Field, FieldKind, Layout};
use crate::source::ByteSource;
use std::ffi::OsString;
use std::io::SeekFrom;
use std::path::Path;
use tracing::{debug, Span};

const NAME: &str = "ntfs";

/// Boot sector with BIOS Parameter Block and Extended BPB
pub const NTFS_BOOT: Layout = Layout::new(
    "ntfs_boot",
    &[
        Field::new("jmp_ins", FieldKind::Bytes(3)),
        Field::new("oem_id", FieldKind::Chars(8)),
        // BPB
        Field::new("bytes_per_sector", FieldKind::U16),
        Field::new("sectors_per_cluster", FieldKind::U8),
        Field::new("unused1", FieldKind::Bytes(7)),
        Field::new("media_descriptor", FieldKind::U8),
        Field::new("unused2", FieldKind::Bytes(2)),
        Field::new("sectors_per_track", FieldKind::U16),
        Field::new("heads", FieldKind::U16),
        Field::new("hidden_sectors", FieldKind::U32),
        Field::new("unused3", FieldKind::Bytes(4)),
        // EBPB
        Field::new("unused4", FieldKind::Bytes(4)),
        Field::new("total_sectors", FieldKind::U64),
        Field::new("mft_cluster_number", FieldKind::U64),
        Field::new("mft_mirror_cluster_number", FieldKind::U64),
        Field::new("record_size", FieldKind::U8),
        Field::new("unused5", FieldKind::Bytes(3)),
        Field::new("index_size", FieldKind::U8),
        Field::new("unused6", FieldKind::Bytes(3)),
        Field::new("serial_num", FieldKind::U64),
        Field::new("checksum", FieldKind::U32),
        Field::new("bootstrap_code", FieldKind::Bytes(426)),
        Field::new("boot_magic", FieldKind::U16),
    ],
);

static SIGNATURE: Signature = Signature {
    patterns: &[b"\xEB\x52\x90NTFS    "],
    match_offset: 0,
    constraint: "bytes per sector high byte non-zero, 55 AA at offset 510",
};

/// Calculator for NTFS volumes
#[derive(Debug, Clone, Copy, Default)]
pub struct NtfsHandler;

impl Handler for NtfsHandler {
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
        let header = NTFS_BOOT.parse(source, Endian::Little)?;

        let volume_size = header
            .uint("total_sectors")?
            .saturating_mul(header.uint("bytes_per_sector")?);
        if volume_size == 0 {
            debug!(parent: log, "zero-sized NTFS volume at 0x{:x}", start_offset);
            return Ok(None);
        }

        let end_offset = start_offset
            .saturating_add(header.len() as u64)
            .saturating_add(volume_size);
        ValidChunk::new(start_offset, end_offset, source.length()?).map(Some)
    }

    fn extraction_command(&self, input: &Path, output_dir: &Path) -> Vec<OsString> {
        seven_zip_command(input, output_dir)
    }
}
