//! # blobcarve-core
//!
//! A library for delimiting embedded compressed streams and filesystem
//! images inside arbitrary binary blobs.
//!
//! An external scanner proposes candidate start offsets; for each supported
//! format a chunk-boundary calculator turns a candidate into either a
//! rejection or an exact half-open byte range that an extraction tool can
//! be pointed at. Calculators read only as much of the format as is needed
//! to bound the object.
//!
//! ## Architecture
//!
//! - [`source`]: seekable byte sources and search primitives
//! - [`layout`]: static fixed-layout record decoding
//! - [`geometry`]: block stride inference
//! - [`handlers`]: per-format calculators and the format registry
//! - [`scanner`]: a simple single-pass driver over all calculators
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use blobcarve_core::{Format, Scanner, ScanStrategy};
//! use std::fs;
//!
//! let data = fs::read("./firmware.bin")?;
//!
//! for result in Scanner::new().scan(&data)? {
//!     let handler = result.format.handler();
//!     println!("{} at {}", handler.name(), result.chunk);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Calculators can also be driven directly for candidates found elsewhere:
//!
//! ```no_run
//! use blobcarve_core::Format;
//! use std::fs::File;
//!
//! let mut file = File::open("./firmware.bin")?;
//! let span = tracing::info_span!("carve");
//! match Format::Gzip.handler().calculate_chunk(&mut file, 0x4000, &span) {
//!     Ok(Some(chunk)) => println!("gzip member {chunk}"),
//!     Ok(None) => println!("not gzip"),
//!     Err(e) if e.is_format_invalid() => println!("corrupt gzip: {e}"),
//!     Err(e) => return Err(e.into()),
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod chunk;
pub mod error;
pub mod geometry;
pub mod handlers;
pub mod layout;
pub mod scanner;
pub mod source;

// Re-export primary types for convenience
pub use chunk::ValidChunk;
pub use error::{Error, Result};
pub use handlers::{Format, Handler, Signature};
pub use layout::{Endian, HeaderRecord, Layout};
pub use scanner::{ScanResult, ScanStrategy, Scanner, ScannerConfig};
pub use source::ByteSource;

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
