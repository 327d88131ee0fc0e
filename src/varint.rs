//! Variable-length integer encoding for lengths, counts and identifiers.
//!
//! Each byte carries 7 data bits and a continuation bit (`0x80`); groups are written least
//! significant first. At most [`MAX_BYTES`] bytes are used, so the largest encodable value is
//! [`MAX_VALUE`] (`2^63 - 1`). Every value has exactly one encoding: a terminal byte whose data
//! bits are zero is only legal as the very first byte.

use crate::error::{GraphError, Result};
use std::io::{self, Read, Write};

/// Maximum number of bytes of one encoded varint.
pub const MAX_BYTES: usize = 9;

/// Largest value that fits in [`MAX_BYTES`] groups of seven bits.
pub const MAX_VALUE: u64 = (1 << 63) - 1;

const CONTINUATION: u8 = 0x80;
const DATA_MASK: u8 = 0x7f;

/// Returns the number of bytes `value` occupies once encoded.
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Encodes `value` into `buf` and returns the number of bytes used.
pub fn encode(value: u64, buf: &mut [u8; MAX_BYTES]) -> Result<usize> {
    if value > MAX_VALUE {
        return Err(GraphError::unsupported(
            "varint",
            format!("{value} exceeds the 63-bit varint range"),
        ));
    }
    let mut rest = value;
    let mut len = 0;
    loop {
        let group = (rest & u64::from(DATA_MASK)) as u8;
        rest >>= 7;
        if rest == 0 {
            buf[len] = group;
            return Ok(len + 1);
        }
        buf[len] = group | CONTINUATION;
        len += 1;
    }
}

/// Writes `value` as a varint and returns the number of bytes written.
pub fn write_u64<W: Write + ?Sized>(out: &mut W, value: u64) -> Result<usize> {
    let mut buf = [0u8; MAX_BYTES];
    let len = encode(value, &mut buf)?;
    out.write_all(&buf[..len])?;
    Ok(len)
}

/// Writes a 32-bit `value` as a varint.
pub fn write_u32<W: Write + ?Sized>(out: &mut W, value: u32) -> Result<usize> {
    write_u64(out, u64::from(value))
}

/// Writes a `usize` length or count as a varint.
pub fn write_len<W: Write + ?Sized>(out: &mut W, value: usize) -> Result<usize> {
    let value = u64::try_from(value)
        .map_err(|_| GraphError::unsupported("varint", format!("length {value} too large")))?;
    write_u64(out, value)
}

/// Decodes one varint from the front of `buf`.
///
/// Returns `Ok(None)` when `buf` is empty, otherwise the value and the number of bytes it used.
pub fn decode(buf: &[u8]) -> Result<Option<(u64, usize)>> {
    let mut bytes = buf.iter().copied();
    let mut next = || Ok::<_, io::Error>(bytes.next());
    decode_with(&mut next)
}

/// Reads one varint from `input`.
///
/// End of input before the first byte is the distinguished "no more data" signal and yields
/// `Ok(None)`. End of input in the middle of a varint is a [`GraphError::Corrupt`].
pub fn read_u64<R: Read + ?Sized>(input: &mut R) -> Result<Option<u64>> {
    let mut next = || read_byte(input);
    Ok(decode_with(&mut next)?.map(|(value, _)| value))
}

/// Reads one varint that must fit in 32 bits.
pub fn read_u32<R: Read + ?Sized>(input: &mut R) -> Result<Option<u32>> {
    match read_u64(input)? {
        None => Ok(None),
        Some(value) => u32::try_from(value)
            .map(Some)
            .map_err(|_| GraphError::corrupt(format!("varint {value} overflows 32 bits"))),
    }
}

/// Reads one varint where end of input is an error rather than a sentinel.
pub fn read_required<R: Read + ?Sized>(input: &mut R) -> Result<u64> {
    read_u64(input)?.ok_or_else(|| GraphError::corrupt("unexpected end of stream in varint"))
}

fn decode_with(next: &mut impl FnMut() -> io::Result<Option<u8>>) -> Result<Option<(u64, usize)>> {
    let mut value = 0u64;
    let mut shift = 0u32;
    for index in 0..MAX_BYTES {
        let byte = match next()? {
            Some(byte) => byte,
            None if index == 0 => return Ok(None),
            None => return Err(GraphError::corrupt("end of stream inside a varint")),
        };
        let data = byte & DATA_MASK;
        value |= u64::from(data) << shift;
        if byte & CONTINUATION == 0 {
            if data == 0 && shift > 0 {
                return Err(GraphError::corrupt("non-canonical varint (zero padding)"));
            }
            return Ok(Some((value, index + 1)));
        }
        shift += 7;
    }
    Err(GraphError::corrupt(format!(
        "varint not terminated within {MAX_BYTES} bytes"
    )))
}

fn read_byte<R: Read + ?Sized>(input: &mut R) -> io::Result<Option<u8>> {
    let mut byte = [0u8; 1];
    loop {
        match input.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: u64) -> u64 {
        let mut out = Vec::new();
        let written = write_u64(&mut out, value).expect("encode");
        assert_eq!(written, out.len());
        assert_eq!(encoded_len(value), out.len());
        read_u64(&mut out.as_slice()).expect("decode").expect("value")
    }

    #[test]
    fn boundary_values_round_trip() {
        for value in [0, 1, 127, 128, 16_383, 16_384, u64::from(u32::MAX), MAX_VALUE] {
            assert_eq!(round_trip(value), value);
        }
    }

    #[test]
    fn known_encodings() {
        let mut out = Vec::new();
        write_u64(&mut out, 0).expect("encode");
        write_u64(&mut out, 127).expect("encode");
        write_u64(&mut out, 128).expect("encode");
        assert_eq!(out, vec![0x00, 0x7f, 0x80, 0x01]);

        let mut max = Vec::new();
        write_u64(&mut max, MAX_VALUE).expect("encode");
        assert_eq!(max.len(), MAX_BYTES);
        assert_eq!(max[MAX_BYTES - 1], 0x7f);
    }

    #[test]
    fn rejects_values_beyond_63_bits() {
        let mut out = Vec::new();
        assert!(write_u64(&mut out, MAX_VALUE + 1).is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn rejects_zero_padding() {
        // 1 encoded with a redundant trailing group.
        let err = decode(&[0x81, 0x00]).expect_err("must be rejected");
        assert!(matches!(err, GraphError::Corrupt(_)));
    }

    #[test]
    fn rejects_unterminated() {
        let err = decode(&[0xff; 10]).expect_err("must be rejected");
        assert!(matches!(err, GraphError::Corrupt(_)));
    }

    #[test]
    fn empty_input_is_a_sentinel() {
        assert!(read_u64(&mut io::empty()).expect("sentinel").is_none());
        assert!(decode(&[]).expect("sentinel").is_none());
    }

    #[test]
    fn truncated_input_is_an_error() {
        let err = read_u64(&mut [0x80u8].as_slice()).expect_err("truncated");
        assert!(matches!(err, GraphError::Corrupt(_)));
    }

    #[test]
    fn u32_overflow_is_corrupt() {
        let mut out = Vec::new();
        write_u64(&mut out, u64::from(u32::MAX) + 1).expect("encode");
        assert!(read_u32(&mut out.as_slice()).is_err());
    }
}
