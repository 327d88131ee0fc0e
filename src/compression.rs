//! Body compression.
//!
//! Everything after the stream header may be wrapped in a raw deflate stream, signalled by
//! [`FLAG_DEFLATE`]. The codec itself never sees compressed bytes: the writer and reader work
//! on the plain body and this module adapts the sink or source around them.

use crate::error::{GraphError, Result};
use crate::format::FLAG_DEFLATE;
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use std::io::{self, Read, Write};

/// Default deflate level (0 = store, 9 = smallest).
pub const DEFAULT_LEVEL: u32 = 6;

/// How the body of a stream is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Plain bytes.
    None,
    /// Raw deflate at the given level.
    Deflate {
        /// Compression level, clamped to `0..=9`.
        level: u32,
    },
}

impl Codec {
    /// The header flags announcing this codec.
    pub fn header_flags(self) -> u16 {
        match self {
            Self::None => 0,
            Self::Deflate { .. } => FLAG_DEFLATE,
        }
    }

    /// The codec announced by header flags (the level is not recorded).
    pub fn from_header_flags(flags: u16) -> Self {
        if flags & FLAG_DEFLATE != 0 {
            Self::Deflate {
                level: DEFAULT_LEVEL,
            }
        } else {
            Self::None
        }
    }

    /// Wraps a sink so that body bytes written to it are encoded.
    pub fn writer<W: Write>(self, sink: W) -> BodyWriter<W> {
        match self {
            Self::None => BodyWriter::Plain(sink),
            Self::Deflate { level } => {
                BodyWriter::Deflate(DeflateEncoder::new(sink, Compression::new(level.min(9))))
            }
        }
    }

    /// Wraps a source so that body bytes read from it are decoded.
    pub fn reader<R: Read>(self, source: R) -> BodyReader<R> {
        match self {
            Self::None => BodyReader::Plain(source),
            Self::Deflate { .. } => BodyReader::Deflate(DeflateDecoder::new(source)),
        }
    }
}

/// A sink that encodes the stream body.
#[derive(Debug)]
pub enum BodyWriter<W: Write> {
    /// Pass-through.
    Plain(W),
    /// Deflate encoder.
    Deflate(DeflateEncoder<W>),
}

impl<W: Write> BodyWriter<W> {
    /// Flushes any buffered compressed data and returns the underlying sink.
    pub fn finish(self) -> Result<W> {
        match self {
            Self::Plain(mut sink) => {
                sink.flush()?;
                Ok(sink)
            }
            Self::Deflate(encoder) => encoder
                .finish()
                .map_err(|e| GraphError::Compression(e.to_string())),
        }
    }
}

impl<W: Write> Write for BodyWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(sink) => sink.write(buf),
            Self::Deflate(encoder) => encoder.write(buf),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Self::Plain(sink) => sink.write_all(buf),
            Self::Deflate(encoder) => encoder.write_all(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(sink) => sink.flush(),
            Self::Deflate(encoder) => encoder.flush(),
        }
    }
}

/// A source that decodes the stream body.
#[derive(Debug)]
pub enum BodyReader<R: Read> {
    /// Pass-through.
    Plain(R),
    /// Deflate decoder.
    Deflate(DeflateDecoder<R>),
}

impl<R: Read> Read for BodyReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(source) => source.read(buf),
            Self::Deflate(decoder) => decoder.read(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deflate_round_trip() {
        let payload = b"graph graph graph graph graph graph".repeat(20);
        let mut writer = Codec::Deflate { level: 9 }.writer(Vec::new());
        writer.write_all(&payload).expect("write");
        let compressed = writer.finish().expect("finish");
        assert!(compressed.len() < payload.len());

        let mut reader = Codec::from_header_flags(FLAG_DEFLATE).reader(compressed.as_slice());
        let mut decoded = Vec::new();
        reader.read_to_end(&mut decoded).expect("read");
        assert_eq!(decoded, payload);
    }

    #[test]
    fn plain_is_pass_through() {
        let mut writer = Codec::None.writer(Vec::new());
        writer.write_all(b"abc").expect("write");
        assert_eq!(writer.finish().expect("finish"), b"abc");
        assert_eq!(Codec::None.header_flags(), 0);
    }
}
