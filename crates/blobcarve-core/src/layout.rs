//! Fixed-layout binary record decoding.
//!
//! Every on-disk header a calculator needs is declared as a static
//! [`Layout`]: an ordered list of fixed-width fields. Decoding reads exactly
//! [`Layout::size`] bytes and yields a [`HeaderRecord`] keyed by field name.
//! No semantic validation happens here.
//!
//! ```
//! use blobcarve_core::layout::{Endian, Field, FieldKind, Layout};
//!
//! static PAIR: Layout = Layout::new(
//!     "pair",
//!     &[
//!         Field::new("tag", FieldKind::Chars(2)),
//!         Field::new("count", FieldKind::U16),
//!     ],
//! );
//!
//! let record = PAIR.decode(b"OK\x01\x02", Endian::Big)?;
//! assert_eq!(record.uint("count")?, 0x0102);
//! assert_eq!(record.bytes("tag")?, b"OK");
//! # Ok::<(), blobcarve_core::Error>(())
//! ```

use crate::error::{Error, Result};
use crate::source::{read_full, ByteSource};
use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Byte order of multi-byte integer fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    /// Least significant byte first
    Little,
    /// Most significant byte first
    Big,
}

/// Kind and width of a single field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Unsigned 8-bit integer
    U8,
    /// Unsigned 16-bit integer
    U16,
    /// Unsigned 32-bit integer
    U32,
    /// Unsigned 64-bit integer
    U64,
    /// Opaque byte array of the given length
    Bytes(usize),
    /// Character array of the given length, returned verbatim
    Chars(usize),
}

impl FieldKind {
    /// Width of the field in bytes
    pub const fn width(self) -> usize {
        match self {
            FieldKind::U8 => 1,
            FieldKind::U16 => 2,
            FieldKind::U32 => 4,
            FieldKind::U64 => 8,
            FieldKind::Bytes(n) | FieldKind::Chars(n) => n,
        }
    }
}

/// A named field within a layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Field name used for lookups
    pub name: &'static str,
    /// Field kind and width
    pub kind: FieldKind,
}

impl Field {
    /// Declares a field
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

/// Static description of a fixed-layout binary record
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    /// Layout name, used in error messages
    pub name: &'static str,
    /// Fields in on-disk order
    pub fields: &'static [Field],
}

impl Layout {
    /// Declares a layout
    pub const fn new(name: &'static str, fields: &'static [Field]) -> Self {
        Self { name, fields }
    }

    /// Total size of the record in bytes
    pub const fn size(&self) -> usize {
        let mut total = 0;
        let mut i = 0;
        while i < self.fields.len() {
            total += self.fields[i].kind.width();
            i += 1;
        }
        total
    }

    /// Decode a record starting at the current source position.
    ///
    /// On success the source is left immediately after the record.
    pub fn parse(&self, source: &mut dyn ByteSource, endian: Endian) -> Result<HeaderRecord> {
        let offset = source.tell()?;
        let mut buf = vec![0u8; self.size()];
        let available = read_full(source, &mut buf)?;
        if available < buf.len() {
            return Err(Error::TruncatedHeader {
                layout: self.name,
                offset,
                needed: buf.len(),
                available,
            });
        }
        self.decode(&buf, endian)
    }

    /// Decode a record from the front of an in-memory buffer
    pub fn decode(&self, bytes: &[u8], endian: Endian) -> Result<HeaderRecord> {
        let size = self.size();
        if bytes.len() < size {
            return Err(Error::TruncatedHeader {
                layout: self.name,
                offset: 0,
                needed: size,
                available: bytes.len(),
            });
        }

        let mut values = Vec::with_capacity(self.fields.len());
        let mut position = 0;
        for field in self.fields {
            let width = field.kind.width();
            let raw = &bytes[position..position + width];
            let value = match field.kind {
                FieldKind::U8 => Value::Uint(u64::from(raw[0])),
                FieldKind::U16 => Value::Uint(u64::from(match endian {
                    Endian::Little => LittleEndian::read_u16(raw),
                    Endian::Big => BigEndian::read_u16(raw),
                })),
                FieldKind::U32 => Value::Uint(u64::from(match endian {
                    Endian::Little => LittleEndian::read_u32(raw),
                    Endian::Big => BigEndian::read_u32(raw),
                })),
                FieldKind::U64 => Value::Uint(match endian {
                    Endian::Little => LittleEndian::read_u64(raw),
                    Endian::Big => BigEndian::read_u64(raw),
                }),
                FieldKind::Bytes(_) => Value::Bytes(raw.to_vec()),
                FieldKind::Chars(_) => Value::Chars(raw.to_vec()),
            };
            values.push((field.name, value));
            position += width;
        }

        Ok(HeaderRecord {
            layout: self.name,
            size,
            values,
        })
    }
}

/// A decoded field value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Any unsigned integer field, widened to 64 bits
    Uint(u64),
    /// Byte array field
    Bytes(Vec<u8>),
    /// Character array field
    Chars(Vec<u8>),
}

/// A decoded fixed-layout record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRecord {
    layout: &'static str,
    size: usize,
    values: Vec<(&'static str, Value)>,
}

impl HeaderRecord {
    /// Size in bytes of the record as laid out on disk
    pub fn len(&self) -> usize {
        self.size
    }

    /// Returns true if the layout has no fields
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Looks up a field value by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value)
    }

    /// Returns an integer field
    pub fn uint(&self, name: &str) -> Result<u64> {
        match self.get(name) {
            Some(Value::Uint(v)) => Ok(*v),
            _ => Err(self.missing(name, "integer")),
        }
    }

    /// Returns a byte or character array field
    pub fn bytes(&self, name: &str) -> Result<&[u8]> {
        match self.get(name) {
            Some(Value::Bytes(v)) | Some(Value::Chars(v)) => Ok(v.as_slice()),
            _ => Err(self.missing(name, "array")),
        }
    }

    fn missing(&self, name: &str, kind: &str) -> Error {
        Error::internal(format!("{} has no {kind} field '{name}'", self.layout))
    }
}
