//! Single-member gzip decoding.
//!
//! [`MemberReader`] decodes exactly one RFC 1952 member and stops on the
//! final deflate block of that member. It never looks for a following
//! member, so trailing garbage, padding, or an unrelated stream after the
//! trailer cannot cause a decode error.
//!
//! Compressed input is pulled from the source in fixed-size reads, so the
//! reader usually holds more bytes than the member needs when it finishes.
//! [`MemberReader::unused_len`] reports how many of those buffered bytes
//! were not consumed by the inflater; the trailer starts exactly that many
//! bytes before the source position.

use crate::error::{Error, Result};
use crate::source::{read_full, ByteSource};
use byteorder::{ByteOrder, LittleEndian};
use flate2::{Decompress, FlushDecompress, Status};
use std::io::SeekFrom;
use tracing::{trace, Span};

use super::NAME;

/// gzip magic bytes (RFC 1952)
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// CRC32 followed by ISIZE
pub const TRAILER_LEN: usize = 8;

const METHOD_DEFLATE: u8 = 8;

const FLAG_FHCRC: u8 = 0x02;
const FLAG_FEXTRA: u8 = 0x04;
const FLAG_FNAME: u8 = 0x08;
const FLAG_FCOMMENT: u8 = 0x10;
const FLAG_RESERVED: u8 = 0xE0;

/// Fixed part of the member header: magic, method, flags, mtime, xfl, os
const FIXED_HEADER_LEN: usize = 10;

const INPUT_CHUNK: usize = 8 * 1024;
const OUTPUT_CHUNK: usize = 32 * 1024;

/// Decoder for one gzip member read directly off a byte source
pub struct MemberReader<'a> {
    source: &'a mut dyn ByteSource,
    inflate: Decompress,
    input: Vec<u8>,
    input_pos: usize,
    input_len: usize,
    output: Vec<u8>,
    crc: crc32fast::Hasher,
    size: u64,
    log: Span,
}

impl<'a> MemberReader<'a> {
    /// Creates a reader positioned wherever `source` currently is.
    ///
    /// Decoder events are recorded under `log`.
    pub fn new(source: &'a mut dyn ByteSource, log: &Span) -> Self {
        Self {
            source,
            inflate: Decompress::new(false),
            input: vec![0u8; INPUT_CHUNK],
            input_pos: 0,
            input_len: 0,
            output: vec![0u8; OUTPUT_CHUNK],
            crc: crc32fast::Hasher::new(),
            size: 0,
            log: log.clone(),
        }
    }

    /// Parse the member header.
    ///
    /// Returns `Ok(false)` when the magic bytes are absent, meaning this is
    /// not a gzip member at all. A header that starts correctly but is
    /// malformed or truncated is a format error.
    pub fn read_header(&mut self) -> Result<bool> {
        let mut fixed = [0u8; FIXED_HEADER_LEN];
        let got = read_full(self.source, &mut fixed)?;
        if got < GZIP_MAGIC.len() || fixed[..2] != GZIP_MAGIC {
            return Ok(false);
        }
        if got < FIXED_HEADER_LEN {
            return Err(Error::format_invalid(NAME, "truncated member header"));
        }

        let method = fixed[2];
        if method != METHOD_DEFLATE {
            return Err(Error::format_invalid(
                NAME,
                format!("unknown compression method {method}"),
            ));
        }

        let flags = fixed[3];
        if flags & FLAG_RESERVED != 0 {
            return Err(Error::format_invalid(
                NAME,
                format!("reserved header flags set: 0x{flags:02x}"),
            ));
        }

        if flags & FLAG_FEXTRA != 0 {
            let mut xlen = [0u8; 2];
            self.read_header_bytes(&mut xlen)?;
            let mut extra = vec![0u8; usize::from(LittleEndian::read_u16(&xlen))];
            self.read_header_bytes(&mut extra)?;
        }
        if flags & FLAG_FNAME != 0 {
            self.skip_zero_terminated()?;
        }
        if flags & FLAG_FCOMMENT != 0 {
            self.skip_zero_terminated()?;
        }
        if flags & FLAG_FHCRC != 0 {
            let mut header_crc = [0u8; 2];
            self.read_header_bytes(&mut header_crc)?;
        }

        Ok(true)
    }

    /// Inflate the member payload up to and including its final block.
    ///
    /// Fails with a format error if the deflate data is malformed or the
    /// source ends before the final block.
    pub fn read_until_member_end(&mut self) -> Result<()> {
        loop {
            if self.input_pos == self.input_len {
                self.input_len = read_full(self.source, &mut self.input)?;
                self.input_pos = 0;
                if self.input_len == 0 {
                    return Err(Error::format_invalid(
                        NAME,
                        "compressed data ended before the end-of-stream marker",
                    ));
                }
            }

            let before_in = self.inflate.total_in();
            let before_out = self.inflate.total_out();

            let status = self
                .inflate
                .decompress(
                    &self.input[self.input_pos..self.input_len],
                    &mut self.output,
                    FlushDecompress::None,
                )
                .map_err(|e| Error::format_invalid(NAME, format!("corrupt deflate data: {e}")))?;

            let consumed = (self.inflate.total_in() - before_in) as usize;
            let produced = (self.inflate.total_out() - before_out) as usize;
            self.input_pos += consumed;
            self.crc.update(&self.output[..produced]);
            self.size += produced as u64;

            match status {
                Status::StreamEnd => {
                    trace!(
                        parent: &self.log,
                        "gzip member inflated: {} compressed bytes, {} bytes out, {} unused",
                        self.inflate.total_in(),
                        self.size,
                        self.unused_len()
                    );
                    return Ok(());
                }
                Status::Ok | Status::BufError => {
                    if consumed == 0 && produced == 0 && self.input_pos < self.input_len {
                        return Err(Error::format_invalid(NAME, "inflate made no progress"));
                    }
                }
            }
        }
    }

    /// Buffered input bytes the inflater did not consume
    pub fn unused_len(&self) -> usize {
        self.input_len - self.input_pos
    }

    /// CRC32 of the decompressed data so far
    pub fn crc32(&self) -> u32 {
        self.crc.clone().finalize()
    }

    /// Decompressed size modulo 2^32, as stored in the trailer
    pub fn uncompressed_size(&self) -> u32 {
        (self.size & 0xFFFF_FFFF) as u32
    }

    /// Read and check the member trailer.
    ///
    /// Must be called after [`read_until_member_end`](Self::read_until_member_end).
    /// The source is rewound over the unused buffered bytes first, so on
    /// success it is positioned on the first byte after the member.
    pub fn verify_trailer(&mut self) -> Result<()> {
        let unused = self.unused_len() as i64;
        self.source.seek(SeekFrom::Current(-unused))?;
        self.input_pos = self.input_len;

        let mut trailer = [0u8; TRAILER_LEN];
        if read_full(self.source, &mut trailer)? < TRAILER_LEN {
            return Err(Error::format_invalid(NAME, "truncated member trailer"));
        }

        let stored_crc = LittleEndian::read_u32(&trailer[..4]);
        let stored_size = LittleEndian::read_u32(&trailer[4..]);
        if stored_crc != self.crc32() {
            return Err(Error::format_invalid(
                NAME,
                format!(
                    "CRC mismatch: stored 0x{stored_crc:08x}, computed 0x{:08x}",
                    self.crc32()
                ),
            ));
        }
        if stored_size != self.uncompressed_size() {
            return Err(Error::format_invalid(
                NAME,
                format!(
                    "size mismatch: stored {stored_size}, decoded {}",
                    self.uncompressed_size()
                ),
            ));
        }
        Ok(())
    }

    fn read_header_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        if read_full(self.source, buf)? < buf.len() {
            return Err(Error::format_invalid(NAME, "truncated member header"));
        }
        Ok(())
    }

    fn skip_zero_terminated(&mut self) -> Result<()> {
        let mut byte = [0u8; 1];
        loop {
            self.read_header_bytes(&mut byte)?;
            if byte[0] == 0 {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::{Compression, GzBuilder};
    use std::io::{Cursor, Seek, Write};
    use std::sync::{Arc, Mutex};
    use tracing::{span, Event, Metadata, Subscriber};

    fn gzip(payload: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_not_gzip() {
        let data = b"PK\x03\x04 not gzip";
        let mut cursor = Cursor::new(&data[..]);
        assert!(!MemberReader::new(&mut cursor, &Span::none()).read_header().unwrap());

        let empty: [u8; 0] = [];
        let mut cursor = Cursor::new(&empty[..]);
        assert!(!MemberReader::new(&mut cursor, &Span::none()).read_header().unwrap());
    }

    #[test]
    fn test_bad_method() {
        let data = [0x1f, 0x8b, 0x07, 0, 0, 0, 0, 0, 0, 3];
        let mut cursor = Cursor::new(&data[..]);
        let err = MemberReader::new(&mut cursor, &Span::none()).read_header().unwrap_err();
        assert!(err.is_format_invalid());
    }

    #[test]
    fn test_optional_header_fields() {
        let mut encoder = GzBuilder::new()
            .filename("firmware.bin")
            .comment("built nightly")
            .extra(vec![1, 2, 3, 4])
            .write(Vec::new(), Compression::best());
        encoder.write_all(b"payload payload payload").unwrap();
        let member = encoder.finish().unwrap();

        let mut cursor = Cursor::new(&member[..]);
        let mut reader = MemberReader::new(&mut cursor, &Span::none());
        assert!(reader.read_header().unwrap());
        reader.read_until_member_end().unwrap();
        reader.verify_trailer().unwrap();
        assert_eq!(reader.uncompressed_size(), 23);
        assert_eq!(cursor.stream_position().unwrap(), member.len() as u64);
    }

    #[test]
    fn test_stops_before_concatenated_member() {
        let first = gzip(b"first member");
        let second = gzip(b"second member, longer than the first");
        let mut data = first.clone();
        data.extend_from_slice(&second);

        let mut cursor = Cursor::new(&data[..]);
        let mut reader = MemberReader::new(&mut cursor, &Span::none());
        assert!(reader.read_header().unwrap());
        reader.read_until_member_end().unwrap();
        assert_eq!(reader.unused_len(), data.len() - (first.len() - TRAILER_LEN));
        reader.verify_trailer().unwrap();
        assert_eq!(cursor.stream_position().unwrap(), first.len() as u64);
    }

    fn noise(len: usize) -> Vec<u8> {
        let mut state = 0x2545_F491u32;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect()
    }

    #[test]
    fn test_truncated_payload() {
        let member = gzip(&noise(4096));
        let truncated = &member[..member.len() / 2];
        let mut cursor = Cursor::new(truncated);
        let mut reader = MemberReader::new(&mut cursor, &Span::none());
        assert!(reader.read_header().unwrap());
        let err = reader.read_until_member_end().unwrap_err();
        assert!(err.is_format_invalid());
    }

    #[test]
    fn test_crc_mismatch() {
        let mut member = gzip(b"checksummed payload");
        let crc_at = member.len() - TRAILER_LEN;
        member[crc_at] ^= 0xFF;

        let mut cursor = Cursor::new(&member[..]);
        let mut reader = MemberReader::new(&mut cursor, &Span::none());
        assert!(reader.read_header().unwrap());
        reader.read_until_member_end().unwrap();
        let err = reader.verify_trailer().unwrap_err();
        assert!(err.to_string().contains("CRC mismatch"));
    }

    /// Source offset where the last input read of a member decoded from
    /// `start` ends
    fn last_read_end(start: usize, member_len: usize, data_len: usize) -> usize {
        let deflate_len = member_len - FIXED_HEADER_LEN - TRAILER_LEN;
        let reads = deflate_len.div_ceil(INPUT_CHUNK);
        (start + FIXED_HEADER_LEN + reads * INPUT_CHUNK).min(data_len)
    }

    fn decode_member_at(data: &[u8], start: usize, member_len: usize) {
        let mut cursor = Cursor::new(data);
        cursor.set_position(start as u64);

        let mut reader = MemberReader::new(&mut cursor, &Span::none());
        assert!(reader.read_header().unwrap());
        reader.read_until_member_end().unwrap();

        let deflate_end = start + member_len - TRAILER_LEN;
        assert_eq!(
            reader.unused_len(),
            last_read_end(start, member_len, data.len()) - deflate_end
        );
        reader.verify_trailer().unwrap();
        assert_eq!(cursor.position(), (start + member_len) as u64);
    }

    #[test]
    fn test_member_spanning_several_reads() {
        let member = gzip(&noise(40 * 1024));
        assert!(member.len() > 4 * INPUT_CHUNK);

        let mut data = member.clone();
        data.extend_from_slice(&gzip(b"next member"));
        decode_member_at(&data, 0, member.len());

        let mut data = member.clone();
        data.extend_from_slice(&[0xA5; 20_000]);
        decode_member_at(&data, 0, member.len());
    }

    #[test]
    fn test_trailer_straddles_read_boundary() {
        let deflate_len = |m: &[u8]| m.len() - FIXED_HEADER_LEN - TRAILER_LEN;
        // Aim for 3 bytes of the trailer in the last read, then search nearby
        // payload sizes since the compressed length only tracks the input
        // length approximately.
        let base = 40 * 1024;
        let rem = deflate_len(&gzip(&noise(base))) % INPUT_CHUNK;
        let grow = (2 * INPUT_CHUNK - 3 - rem) % INPUT_CHUNK;
        let member = (base + grow - 64..base + grow + 64)
            .map(|len| gzip(&noise(len)))
            .find(|m| deflate_len(m) % INPUT_CHUNK > INPUT_CHUNK - TRAILER_LEN)
            .unwrap();

        let start = 5;
        let mut data = vec![0x5A; start];
        data.extend_from_slice(&member);
        data.extend_from_slice(&gzip(b"next member"));

        let deflate_end = start + member.len() - TRAILER_LEN;
        assert!(last_read_end(start, member.len(), data.len()) - deflate_end < TRAILER_LEN);
        decode_member_at(&data, start, member.len());
    }

    /// Records the explicit parent span id of every event
    struct ParentRecorder(Arc<Mutex<Vec<Option<u64>>>>);

    impl Subscriber for ParentRecorder {
        fn enabled(&self, _: &Metadata<'_>) -> bool {
            true
        }
        fn new_span(&self, _: &span::Attributes<'_>) -> span::Id {
            span::Id::from_u64(7)
        }
        fn record(&self, _: &span::Id, _: &span::Record<'_>) {}
        fn record_follows_from(&self, _: &span::Id, _: &span::Id) {}
        fn event(&self, event: &Event<'_>) {
            let parent = event.parent().map(|id| id.into_u64());
            self.0.lock().unwrap().push(parent);
        }
        fn enter(&self, _: &span::Id) {}
        fn exit(&self, _: &span::Id) {}
    }

    #[test]
    fn test_events_go_to_caller_span() {
        let member = gzip(b"logged member");
        let parents = Arc::new(Mutex::new(Vec::new()));

        tracing::subscriber::with_default(ParentRecorder(parents.clone()), || {
            let log = tracing::info_span!("carve");
            let mut cursor = Cursor::new(&member[..]);
            let mut reader = MemberReader::new(&mut cursor, &log);
            assert!(reader.read_header().unwrap());
            reader.read_until_member_end().unwrap();
        });

        let parents = parents.lock().unwrap();
        assert!(!parents.is_empty());
        assert!(parents.iter().all(|p| *p == Some(7)));
    }
}
