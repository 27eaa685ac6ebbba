//! Per-format chunk-boundary calculators.
//!
//! Every supported format implements [`Handler`]. The set of formats is
//! closed and enumerated by [`Format`]; there is no runtime registration.
//!
//! ```
//! use blobcarve_core::handlers::Format;
//! use std::io::Cursor;
//!
//! let blob = vec![0u8; 64];
//! let handler = Format::Ubi.handler();
//! let outcome = handler.calculate_chunk(&mut Cursor::new(&blob[..]), 0, &tracing::Span::none())?;
//! assert!(outcome.is_none());
//! # Ok::<(), blobcarve_core::Error>(())
//! ```

pub mod gzip;
pub mod lzh;
pub mod ntfs;
pub mod ubi;
pub mod ubifs;

use crate::chunk::ValidChunk;
use crate::error::{Error, Result};
use crate::source::{find_subsequence, ByteSource};
use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::Span;

pub use gzip::GzipHandler;
pub use lzh::LzhHandler;
pub use ntfs::NtfsHandler;
pub use ubi::UbiHandler;
pub use ubifs::UbifsHandler;

/// Common interface of every format calculator
pub trait Handler: Send + Sync {
    /// Stable format identifier
    fn name(&self) -> &'static str;

    /// Byte patterns the candidate scanner looks for
    fn signature(&self) -> &'static Signature;

    /// Turn a candidate start offset into a chunk.
    ///
    /// Returns `Ok(None)` when the candidate is benignly rejected. Heuristic
    /// decisions are reported as events under `log`.
    fn calculate_chunk(
        &self,
        source: &mut dyn ByteSource,
        start_offset: u64,
        log: &Span,
    ) -> Result<Option<ValidChunk>>;

    /// Argument list for the external tool that extracts a carved chunk
    fn extraction_command(&self, input: &Path, output_dir: &Path) -> Vec<OsString>;
}

/// Description of what a candidate for a format looks like
#[derive(Debug, Clone, Copy)]
pub struct Signature {
    /// Literal byte patterns, any of which marks a candidate
    pub patterns: &'static [&'static [u8]],
    /// Distance from a pattern hit to the chunk start
    pub match_offset: i64,
    /// Structural constraints a full mask scanner should also enforce
    pub constraint: &'static str,
}

impl Signature {
    /// Candidate start offsets for every literal pattern hit in `data`.
    ///
    /// This is a naive literal search that ignores [`Signature::constraint`];
    /// the calculators reject what it over-reports. Offsets are sorted and
    /// deduplicated.
    pub fn candidates(&self, data: &[u8]) -> Vec<u64> {
        let mut offsets = Vec::new();
        for pattern in self.patterns {
            let mut from = 0;
            while let Some(index) = find_subsequence(&data[from..], pattern) {
                let hit = (from + index) as i64;
                let start = hit + self.match_offset;
                if start >= 0 {
                    offsets.push(start as u64);
                }
                from += index + 1;
            }
        }
        offsets.sort_unstable();
        offsets.dedup();
        offsets
    }
}

/// The closed set of supported formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// RFC 1952 gzip member
    Gzip,
    /// LHA/LZH archive
    Lzh,
    /// NTFS volume
    Ntfs,
    /// UBIFS filesystem image
    Ubifs,
    /// UBI flash image
    Ubi,
}

impl Format {
    /// Every format, in registry order
    pub const ALL: [Format; 5] = [
        Format::Gzip,
        Format::Lzh,
        Format::Ntfs,
        Format::Ubifs,
        Format::Ubi,
    ];

    /// The calculator for this format
    pub fn handler(self) -> &'static dyn Handler {
        match self {
            Format::Gzip => &GzipHandler,
            Format::Lzh => &LzhHandler,
            Format::Ntfs => &NtfsHandler,
            Format::Ubifs => &UbifsHandler,
            Format::Ubi => &UbiHandler,
        }
    }

    /// Stable format identifier
    pub fn name(self) -> &'static str {
        self.handler().name()
    }

    /// Looks up a format by its identifier
    pub fn from_name(name: &str) -> Option<Format> {
        Self::ALL
            .into_iter()
            .find(|format| format.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Format::from_name(s).ok_or_else(|| Error::UnknownFormat(s.to_string()))
    }
}

/// `7z x -y <input> -o<output_dir>`
pub(crate) fn seven_zip_command(input: &Path, output_dir: &Path) -> Vec<OsString> {
    let mut out = OsString::from("-o");
    out.push(output_dir);
    vec!["7z".into(), "x".into(), "-y".into(), input.into(), out]
}

/// `<tool> <input> -o <output_dir>`
pub(crate) fn ubireader_command(tool: &str, input: &Path, output_dir: &Path) -> Vec<OsString> {
    vec![tool.into(), input.into(), "-o".into(), output_dir.into()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_names() {
        let names: Vec<_> = Format::ALL.iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["gzip", "lzh", "ntfs", "ubifs", "ubi"]);
        for format in Format::ALL {
            assert_eq!(Format::from_name(format.name()), Some(format));
        }
        assert_eq!("GZIP".parse::<Format>().unwrap(), Format::Gzip);
        assert!("zip".parse::<Format>().is_err());
    }

    #[test]
    fn test_signature_candidates() {
        let signature = Signature {
            patterns: &[b"-lh5-", b"-lh0-"],
            match_offset: -2,
            constraint: "",
        };
        let data = b"-lh5-xx..-lh0-..-lh5-";
        // The hit at 0 would start before the blob and is dropped
        assert_eq!(signature.candidates(data), vec![7, 14]);
    }

    #[test]
    fn test_extraction_commands() {
        let input = Path::new("/tmp/in.bin");
        let out = Path::new("/tmp/out");

        let cmd = Format::Gzip.handler().extraction_command(input, out);
        assert_eq!(cmd, vec!["7z", "x", "-y", "/tmp/in.bin", "-o/tmp/out"]);

        let cmd = Format::Ubi.handler().extraction_command(input, out);
        assert_eq!(
            cmd,
            vec!["ubireader_extract_images", "/tmp/in.bin", "-o", "/tmp/out"]
        );

        let cmd = Format::Ubifs.handler().extraction_command(input, out);
        assert_eq!(cmd[0], "ubireader_extract_files");
    }
}
