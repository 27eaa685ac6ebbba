//! UBIFS image calculator.
//!
//! Only the superblock node is inspected. Its LEB size and LEB count give
//! the image size; no other node is validated.

use super::{ubireader_command, Handler, Signature};
use crate::chunk::ValidChunk;
use crate::error::Result;
use crate::layout::{Endian, Field, FieldKind, Layout};
use crate::source::{read_full, ByteSource};
use std::ffi::OsString;
use std::io::SeekFrom;
use std::path::Path;
use tracing::{debug, Span};

const NAME: &str = "ubifs";

/// Superblock magic as read in the image's own byte order
pub const UBIFS_NODE_MAGIC: u32 = 0x0610_1831;

/// Common node header followed by the superblock node body
pub const UBIFS_SB_NODE: Layout = Layout::new(
    "ubifs_sb_node",
    &[
        // ubifs_ch
        Field::new("magic", FieldKind::U32),
        Field::new("crc", FieldKind::U32),
        Field::new("sqnum", FieldKind::U64),
        Field::new("len", FieldKind::U32),
        Field::new("node_type", FieldKind::U8),
        Field::new("group_type", FieldKind::U8),
        Field::new("ch_padding", FieldKind::Bytes(2)),
        // superblock
        Field::new("padding", FieldKind::Bytes(2)),
        Field::new("key_hash", FieldKind::U8),
        Field::new("key_fmt", FieldKind::U8),
        Field::new("flags", FieldKind::U32),
        Field::new("min_io_size", FieldKind::U32),
        Field::new("leb_size", FieldKind::U32),
        Field::new("leb_cnt", FieldKind::U32),
        Field::new("max_leb_cnt", FieldKind::U32),
        Field::new("max_bud_bytes", FieldKind::U64),
        Field::new("log_lebs", FieldKind::U32),
        Field::new("lpt_lebs", FieldKind::U32),
        Field::new("orph_lebs", FieldKind::U32),
        Field::new("jhead_cnt", FieldKind::U32),
        Field::new("fanout", FieldKind::U32),
        Field::new("lsave_cnt", FieldKind::U32),
        Field::new("fmt_version", FieldKind::U32),
        Field::new("default_compr", FieldKind::U16),
        Field::new("padding1", FieldKind::Bytes(2)),
        Field::new("rp_uid", FieldKind::U32),
        Field::new("rp_gid", FieldKind::U32),
        Field::new("rp_size", FieldKind::U64),
        Field::new("time_gran", FieldKind::U32),
        Field::new("uuid", FieldKind::Bytes(16)),
        Field::new("ro_compat_version", FieldKind::U32),
        Field::new("hmac", FieldKind::Bytes(64)),
        Field::new("hmac_wkm", FieldKind::Bytes(64)),
        Field::new("hash_algo", FieldKind::U16),
        Field::new("hash_mst", FieldKind::Bytes(64)),
        Field::new("padding2", FieldKind::Bytes(3774)),
    ],
);

static SIGNATURE: Signature = Signature {
    patterns: &[&[0x31, 0x18, 0x10, 0x06], &[0x06, 0x10, 0x18, 0x31]],
    match_offset: 0,
    constraint: "node type 0x06 at offset 20, group type <= 2, then two NUL bytes",
};

/// Calculator for UBIFS images
#[derive(Debug, Clone, Copy, Default)]
pub struct UbifsHandler;

/// Byte order whose interpretation of `magic` yields the superblock magic
pub fn detect_endian(magic: [u8; 4]) -> Option<Endian> {
    if u32::from_be_bytes(magic) == UBIFS_NODE_MAGIC {
        Some(Endian::Big)
    } else if u32::from_le_bytes(magic) == UBIFS_NODE_MAGIC {
        Some(Endian::Little)
    } else {
        None
    }
}

impl Handler for UbifsHandler {
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
        let mut magic = [0u8; 4];
        if read_full(source, &mut magic)? < magic.len() {
            return Ok(None);
        }
        let Some(endian) = detect_endian(magic) else {
            return Ok(None);
        };

        source.seek(SeekFrom::Start(start_offset))?;
        let superblock = UBIFS_SB_NODE.parse(source, endian)?;

        let leb_size = superblock.uint("leb_size")?;
        let leb_cnt = superblock.uint("leb_cnt")?;
        debug!(
            parent: log,
            "UBIFS superblock ({:?} endian): {} LEBs of {} bytes", endian, leb_cnt, leb_size
        );

        let image_size = leb_size * leb_cnt;
        if image_size == 0 {
            return Ok(None);
        }

        ValidChunk::new(start_offset, start_offset + image_size, source.length()?).map(Some)
    }

    fn extraction_command(&self, input: &Path, output_dir: &Path) -> Vec<OsString> {
        ubireader_command("ubireader_extract_files", input, output_dir)
    }
}
