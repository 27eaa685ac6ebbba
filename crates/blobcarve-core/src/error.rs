//! Error types for the blobcarve-core library.
//!
//! Calculator outcomes are expressed as `Result<Option<ValidChunk>>`:
//! `Ok(None)` is a benign rejection, `Ok(Some(_))` a delimited chunk, and
//! `Err(_)` either a format-invalid candidate or an infrastructure failure.
//! Use [`Error::is_format_invalid`] to tell the two failure kinds apart.
//!
//! [`ValidChunk`]: crate::ValidChunk

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for blobcarve operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all blobcarve operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// I/O failure while reading or seeking the byte source
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to read input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Fewer bytes were available than a fixed layout requires
    #[error("truncated {layout} header at offset {offset}: need {needed} bytes, have {available}")]
    TruncatedHeader {
        /// Name of the layout being decoded
        layout: &'static str,
        /// Absolute offset where decoding started
        offset: u64,
        /// Bytes the layout requires
        needed: usize,
        /// Bytes actually available
        available: usize,
    },

    /// Candidate matched the format but is internally inconsistent
    #[error("invalid {format} data: {reason}")]
    FormatInvalid {
        /// Format identifier
        format: &'static str,
        /// Description of the inconsistency
        reason: String,
    },

    /// Not enough erase-block markers to infer the UBI PEB size
    #[error("could not infer UBI physical erase block size")]
    PebSizeNotFound,

    /// A calculator produced a range that violates the chunk invariant
    #[error("invalid chunk {start}..{end} for source of {length} bytes")]
    InvalidChunk {
        /// Proposed start offset
        start: u64,
        /// Proposed end offset
        end: u64,
        /// Length of the byte source
        length: u64,
    },

    /// No handler is registered under this name
    #[error("unknown format '{0}'")]
    UnknownFormat(String),

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new format-invalid error
    pub fn format_invalid(format: &'static str, reason: impl Into<String>) -> Self {
        Self::FormatInvalid {
            format,
            reason: reason.into(),
        }
    }

    /// Creates a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true if the error only invalidates the current candidate.
    ///
    /// Everything else is an infrastructure failure (I/O) that the caller
    /// should surface.
    pub fn is_format_invalid(&self) -> bool {
        matches!(
            self,
            Self::FormatInvalid { .. }
                | Self::TruncatedHeader { .. }
                | Self::PebSizeNotFound
                | Self::InvalidChunk { .. }
        )
    }
}
