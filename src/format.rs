//! Defines the physical binary layout of graphstream streams.
//!
//! # Layout
//!
//! ```text
//! [Magic "GSTM" (4)] [Version u16 BE (2)] [Flags u16 BE (2)] [Root value ...]
//! ```
//!
//! When [`FLAG_DEFLATE`] is set, everything after the 8-byte header is a raw deflate stream.
//!
//! ## Value encoding
//!
//! ```text
//! object      := varint id [class announcement]? body      (id 0 = null, back-references stop here)
//! class       := varint class_id [utf name, flag byte]?    (name and flags on first use only)
//! record body := [owner object]? varint count (varint field_id [name object, class]? value)*
//! collection  := varint size element*                      (multisets: element varint count)
//! map         := varint size (key value)*
//! utf         := u16 BE byte length, UTF-8 bytes
//! ```
//!
//! All fixed-width integers are big-endian. Lengths, counts and ids are varints
//! (see [`crate::varint`]).

use crate::error::{GraphError, Result};
use std::fmt;
use std::io::{Read, Write};

/// Magic bytes identifying the format.
pub const MAGIC_BYTES: [u8; 4] = *b"GSTM";

/// The format version written by this crate.
pub const FORMAT_VERSION: u16 = 1;

/// Size of the stream header in bytes: Magic(4) + Version(2) + Flags(2).
pub const HEADER_SIZE: usize = 8;

/// Header flag: the body after the header is deflate-compressed.
pub const FLAG_DEFLATE: u16 = 0x1000;

/// All header flag bits understood by this version.
pub const KNOWN_FLAGS: u16 = FLAG_DEFLATE;

/// Largest UTF-8 payload of a length-prefixed string.
pub const MAX_UTF_BYTES: usize = u16::MAX as usize;

/// The fixed-size header at the start of every stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    /// Always [`MAGIC_BYTES`] for a valid stream.
    pub magic: [u8; 4],
    /// Format version of the writer.
    pub version: u16,
    /// Header flags; see [`FLAG_DEFLATE`].
    pub flags: u16,
}

impl StreamHeader {
    /// Creates a header for the current version.
    pub fn new(compressed: bool) -> Self {
        Self::with_flags(if compressed { FLAG_DEFLATE } else { 0 })
    }

    /// Creates a header for the current version carrying `flags`.
    pub fn with_flags(flags: u16) -> Self {
        Self {
            magic: MAGIC_BYTES,
            version: FORMAT_VERSION,
            flags,
        }
    }

    /// Returns true if the body is deflate-compressed.
    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_DEFLATE != 0
    }

    /// Serializes the header to bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic);
        buf[4..6].copy_from_slice(&self.version.to_be_bytes());
        buf[6..8].copy_from_slice(&self.flags.to_be_bytes());
        buf
    }

    /// Parses and validates a header.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let Some(bytes) = bytes.get(..HEADER_SIZE) else {
            return Err(GraphError::corrupt("stream shorter than its header"));
        };
        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if magic != MAGIC_BYTES {
            return Err(GraphError::corrupt(format!("invalid magic bytes {magic:02X?}")));
        }
        let version = u16::from_be_bytes([bytes[4], bytes[5]]);
        if version == 0 || version > FORMAT_VERSION {
            return Err(GraphError::corrupt(format!("unsupported version {version}")));
        }
        let flags = u16::from_be_bytes([bytes[6], bytes[7]]);
        if flags & !KNOWN_FLAGS != 0 {
            return Err(GraphError::corrupt(format!("unknown header flags {flags:#06x}")));
        }
        Ok(Self {
            magic,
            version,
            flags,
        })
    }

    /// Writes the header to `out`.
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> Result<()> {
        out.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Reads and validates a header from `input`.
    pub fn read_from<R: Read + ?Sized>(input: &mut R) -> Result<Self> {
        let buf: [u8; HEADER_SIZE] = read_array(input)?;
        Self::from_bytes(&buf)
    }
}

/// The flag byte sent with every class announcement.
///
/// For array classes the flags describe the innermost component type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ClassFlags(u8);

impl ClassFlags {
    /// No flag set.
    pub const NONE: Self = Self(0);
    /// No subclass is possible: fields declared with this class omit the announcement.
    pub const FINAL: Self = Self(0b0000_0001);
    /// An owner (outer instance) reference precedes the record's fields.
    pub const INNER: Self = Self(0b0000_0010);
    /// Encoded as a generic element sequence.
    pub const COLLECTION: Self = Self(0b0000_0100);
    /// Encoded as generic key/value pairs.
    pub const MAP: Self = Self(0b0000_1000);
    /// Elements carry a multiplicity (multisets) or keys repeat (multimaps).
    pub const MULTI: Self = Self(0b0001_0000);

    const KNOWN: u8 = 0b0001_1111;

    /// Decodes a flag byte, rejecting unknown bits.
    pub fn from_byte(byte: u8) -> Result<Self> {
        if byte & !Self::KNOWN != 0 {
            return Err(GraphError::corrupt(format!("unknown class flags {byte:#04x}")));
        }
        Ok(Self(byte))
    }

    /// Returns the raw byte representation.
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// Returns the union of both flag sets.
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns true if every bit of `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Shorthand for `contains(FINAL)`.
    pub const fn is_final(self) -> bool {
        self.contains(Self::FINAL)
    }
}

impl fmt::Debug for ClassFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::FINAL, "FINAL"),
            (Self::INNER, "INNER"),
            (Self::COLLECTION, "COLLECTION"),
            (Self::MAP, "MAP"),
            (Self::MULTI, "MULTI"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if set.is_empty() {
            write!(f, "ClassFlags(NONE)")
        } else {
            write!(f, "ClassFlags({})", set.join("|"))
        }
    }
}

// --- Primitive helpers ---

/// Reads exactly `N` bytes.
pub fn read_array<const N: usize, R: Read + ?Sized>(input: &mut R) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    input.read_exact(&mut buf)?;
    Ok(buf)
}

/// Writes a string with a 16-bit big-endian length prefix.
pub fn write_utf<W: Write + ?Sized>(out: &mut W, value: &str) -> Result<()> {
    let len = u16::try_from(value.len()).map_err(|_| {
        GraphError::unsupported(
            "str",
            format!("{} UTF-8 bytes exceed the {MAX_UTF_BYTES} byte limit", value.len()),
        )
    })?;
    out.write_all(&len.to_be_bytes())?;
    out.write_all(value.as_bytes())?;
    Ok(())
}

/// Reads a string with a 16-bit big-endian length prefix.
pub fn read_utf<R: Read + ?Sized>(input: &mut R) -> Result<String> {
    let len = u16::from_be_bytes(read_array(input)?) as usize;
    let mut buf = vec![0u8; len];
    input.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| GraphError::corrupt(format!("invalid UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let header = StreamHeader::new(true);
        let parsed = StreamHeader::from_bytes(&header.to_bytes()).expect("valid header");
        assert_eq!(parsed, header);
        assert!(parsed.is_compressed());
        assert_eq!(&header.to_bytes()[6..8], &[0x10, 0x00]);
    }

    #[test]
    fn header_rejects_bad_magic_and_flags() {
        let mut bytes = StreamHeader::new(false).to_bytes();
        bytes[0] = b'X';
        assert!(StreamHeader::from_bytes(&bytes).is_err());

        let mut bytes = StreamHeader::new(false).to_bytes();
        bytes[7] = 0x01;
        assert!(StreamHeader::from_bytes(&bytes).is_err());

        assert!(StreamHeader::from_bytes(&MAGIC_BYTES).is_err());
    }

    #[test]
    fn utf_is_length_prefixed() {
        let mut out = Vec::new();
        write_utf(&mut out, "héllo").expect("write");
        assert_eq!(&out[..2], &[0x00, 0x06]);
        assert_eq!(read_utf(&mut out.as_slice()).expect("read"), "héllo");
    }

    #[test]
    fn utf_rejects_oversized_strings() {
        let long = "x".repeat(MAX_UTF_BYTES + 1);
        let mut out = Vec::new();
        assert!(write_utf(&mut out, &long).is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn class_flags_compose() {
        let flags = ClassFlags::COLLECTION.with(ClassFlags::MULTI);
        assert!(flags.contains(ClassFlags::MULTI));
        assert!(!flags.is_final());
        assert_eq!(ClassFlags::from_byte(flags.as_u8()).expect("known"), flags);
        assert!(ClassFlags::from_byte(0x80).is_err());
    }
}
