//! Single-pass chunk discovery over an in-memory blob.
//!
//! For each configured format, every literal signature hit becomes a
//! candidate and is handed to that format's calculator on its own cursor.
//! Accepted chunks are collected and sorted by start offset.
//!
//! Overlapping chunks from different formats are reported as-is, and
//! carved chunks are not scanned again. Both belong to the caller.
//!
//! ```
//! use blobcarve_core::{Scanner, ScanStrategy};
//!
//! let results = Scanner::new().scan(b"nothing embedded here")?;
//! assert!(results.is_empty());
//! # Ok::<(), blobcarve_core::Error>(())
//! ```

use crate::chunk::ValidChunk;
use crate::error::{Error, Result};
use crate::handlers::Format;
use std::io::Cursor;
use tracing::{debug, debug_span, trace};

/// A chunk found during a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanResult {
    /// Format whose calculator produced the chunk
    pub format: Format,
    /// The delimited byte range
    pub chunk: ValidChunk,
}

impl ScanResult {
    /// Creates a new scan result
    pub fn new(format: Format, chunk: ValidChunk) -> Self {
        Self { format, chunk }
    }

    /// The chunk bytes within the scanned blob
    pub fn slice<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.chunk.range()]
    }
}

/// Configuration for the scanner
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Formats to look for, in the order they are tried
    pub formats: Vec<Format>,
    /// Maximum number of chunks to report (0 = unlimited)
    pub max_chunks: usize,
    /// Minimum chunk size to report
    pub min_chunk_size: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            formats: Format::ALL.to_vec(),
            max_chunks: 0,
            min_chunk_size: 1,
        }
    }
}

impl ScannerConfig {
    /// Creates a new scanner config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the scan to the given formats
    pub fn formats(mut self, formats: impl IntoIterator<Item = Format>) -> Self {
        self.formats = formats.into_iter().collect();
        self
    }

    /// Sets the maximum number of chunks to return
    pub fn max_chunks(mut self, max: usize) -> Self {
        self.max_chunks = max;
        self
    }

    /// Sets the minimum chunk size filter
    pub fn min_chunk_size(mut self, size: u64) -> Self {
        self.min_chunk_size = size;
        self
    }
}

/// Trait for implementing custom scanning strategies
pub trait ScanStrategy: Send + Sync {
    /// Scan the provided data for embedded chunks
    fn scan(&self, data: &[u8]) -> Result<Vec<ScanResult>>;

    /// Scan the data and return an iterator
    fn scan_iter<'a>(&'a self, data: &'a [u8]) -> Box<dyn Iterator<Item = Result<ScanResult>> + 'a> {
        match self.scan(data) {
            Ok(results) => Box::new(results.into_iter().map(Ok)),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }
}

/// Signature-driven scanner running every configured calculator
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    config: ScannerConfig,
}

impl Scanner {
    /// Creates a new scanner with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new scanner with custom configuration
    pub fn with_config(config: ScannerConfig) -> Self {
        Self { config }
    }

    /// Run one format's calculator over each of its candidates
    fn scan_format(&self, data: &[u8], format: Format, results: &mut Vec<ScanResult>) -> Result<()> {
        let handler = format.handler();
        let candidates = handler.signature().candidates(data);
        trace!("{} candidate(s) for {}", candidates.len(), format);

        for start in candidates {
            let span = debug_span!("calculate_chunk", format = handler.name(), start);
            // Each candidate gets its own cursor over the shared bytes
            let mut cursor = Cursor::new(data);
            match handler.calculate_chunk(&mut cursor, start, &span) {
                Ok(Some(chunk)) => {
                    if chunk.len() < self.config.min_chunk_size {
                        trace!("Dropping {} chunk {}: below size filter", format, chunk);
                        continue;
                    }
                    debug!("Found {} chunk at {} ({} bytes)", format, chunk, chunk.len());
                    results.push(ScanResult::new(format, chunk));
                }
                Ok(None) => trace!("No {} chunk at 0x{:x}", format, start),
                Err(e) if e.is_format_invalid() => {
                    debug!("Rejected {} candidate at 0x{:x}: {}", format, start, e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl ScanStrategy for Scanner {
    fn scan(&self, data: &[u8]) -> Result<Vec<ScanResult>> {
        debug!("Starting scan of {} bytes", data.len());

        let mut results = Vec::new();
        for &format in &self.config.formats {
            self.scan_format(data, format, &mut results)?;
        }

        results.sort_by_key(|r| (r.chunk.start_offset(), r.chunk.end_offset()));
        if self.config.max_chunks > 0 {
            results.truncate(self.config.max_chunks);
        }

        debug!("Scan complete: found {} chunks", results.len());
        Ok(results)
    }
}

/// Scan a file for embedded chunks
///
/// This is a convenience function that reads the file and scans it.
pub fn scan_file(path: impl AsRef<std::path::Path>) -> Result<Vec<ScanResult>> {
    scan_file_with_config(path, ScannerConfig::default())
}

/// Scan a file with custom configuration
pub fn scan_file_with_config(
    path: impl AsRef<std::path::Path>,
    config: ScannerConfig,
) -> Result<Vec<ScanResult>> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| Error::file_read(path, e))?;
    Scanner::with_config(config).scan(&data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scanner_config_builder() {
        let config = ScannerConfig::new()
            .formats([Format::Ubi, Format::Gzip])
            .max_chunks(10)
            .min_chunk_size(20);

        assert_eq!(config.formats, vec![Format::Ubi, Format::Gzip]);
        assert_eq!(config.max_chunks, 10);
        assert_eq!(config.min_chunk_size, 20);
    }

    #[test]
    fn test_empty_input() {
        let scanner = Scanner::new();
        let results = scanner.scan(&[]).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_false_positive_signatures_are_skipped() {
        // gzip magic with garbage after it, and a lone UBI marker
        let mut data = vec![0u8; 64];
        data[4..7].copy_from_slice(&[0x1F, 0x8B, 0x08]);
        data[7] = 0xFF;
        data[32..37].copy_from_slice(b"UBI#\x01");

        let results = Scanner::new().scan(&data).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_scan_iter_matches_scan() {
        let scanner = Scanner::new();
        let data = b"no chunks";
        assert_eq!(scanner.scan_iter(data).count(), 0);
    }

    #[test]
    fn test_scan_file() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"compressed on disk").unwrap();
        let member = encoder.finish().unwrap();

        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("blob.bin");
        let mut data = vec![0xEE; 40];
        data.extend_from_slice(&member);
        std::fs::write(&path, &data).unwrap();

        let results = scan_file(&path).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].format, Format::Gzip);
        assert_eq!(results[0].chunk.range(), 40..data.len());

        let config = ScannerConfig::new().formats([Format::Ubi]);
        assert!(scan_file_with_config(&path, config).unwrap().is_empty());
    }

    #[test]
    fn test_scan_file_missing() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.bin");

        let err = scan_file(&path).unwrap_err();
        assert!(matches!(&err, Error::FileRead { path: p, .. } if *p == path));
        assert!(!err.is_format_invalid());
    }
}
