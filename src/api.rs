//! High-level entry points.
//!
//! [`GraphStream`] covers the common cases with default options; [`StreamBuilder`] carries
//! the configurable ones. Both frame the body with the stream header and, when enabled, the
//! deflate layer.

use crate::compression::{BodyReader, BodyWriter, Codec, DEFAULT_LEVEL};
use crate::error::{GraphError, Result};
use crate::format::{HEADER_SIZE, StreamHeader};
use crate::reader::{GraphReader, ReadOptions};
use crate::value::Value;
use crate::writer::GraphWriter;
use log::debug;
use memmap2::Mmap;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

/// Options applied when writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Deflate the body.
    pub compression: bool,
    /// Deflate level, `0..=9`.
    pub compression_level: u32,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            compression: false,
            compression_level: DEFAULT_LEVEL,
        }
    }
}

impl WriteOptions {
    fn codec(&self) -> Codec {
        if self.compression {
            Codec::Deflate {
                level: self.compression_level,
            }
        } else {
            Codec::None
        }
    }
}

/// Configures how streams are written and read.
///
/// ```rust
/// use graphstream::{GraphStream, Obj, Value};
///
/// let stream = GraphStream::builder().compression(true).max_depth(64);
/// let list = Value::from(Obj::list(vec![Value::from(1), Value::from("two")]));
/// let bytes = stream.serialize(&list)?;
/// assert_eq!(stream.deserialize(&bytes)?, list);
/// # Ok::<(), graphstream::GraphError>(())
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamBuilder {
    write: WriteOptions,
    read: ReadOptions,
}

impl StreamBuilder {
    /// A builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables deflate compression of the body.
    pub fn compression(mut self, enabled: bool) -> Self {
        self.write.compression = enabled;
        self
    }

    /// Sets the deflate level (clamped to `0..=9`).
    pub fn compression_level(mut self, level: u32) -> Self {
        self.write.compression_level = level.min(9);
        self
    }

    /// Bounds array, collection and field-table lengths accepted by readers.
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.read.max_length = max_length;
        self
    }

    /// Bounds the nesting depth accepted by readers.
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.read.max_depth = max_depth;
        self
    }

    /// The write options in force.
    pub fn write_options(&self) -> WriteOptions {
        self.write
    }

    /// The read options in force.
    pub fn read_options(&self) -> ReadOptions {
        self.read
    }

    /// Writes the header and opens a session over `sink`.
    ///
    /// Call [`StreamBuilder::finish`] when done to flush the compression layer.
    pub fn writer<W: Write>(&self, mut sink: W) -> Result<GraphWriter<BodyWriter<W>>> {
        let codec = self.write.codec();
        StreamHeader::with_flags(codec.header_flags()).write_to(&mut sink)?;
        Ok(GraphWriter::new(codec.writer(sink)))
    }

    /// Ends a session opened with [`StreamBuilder::writer`] and returns the sink.
    pub fn finish<W: Write>(writer: GraphWriter<BodyWriter<W>>) -> Result<W> {
        writer.into_inner().finish()
    }

    /// Reads the header and opens a session over `source`.
    pub fn reader<R: Read>(
        &self,
        mut source: R,
    ) -> Result<(StreamHeader, GraphReader<BodyReader<R>>)> {
        let header = StreamHeader::read_from(&mut source)?;
        let codec = Codec::from_header_flags(header.flags);
        let reader = GraphReader::with_options(codec.reader(source), self.read)?;
        Ok((header, reader))
    }

    /// Writes a stream with several roots sharing one session.
    pub fn write_all<W: Write>(&self, sink: W, roots: &[Value]) -> Result<W> {
        let mut writer = self.writer(sink)?;
        for root in roots {
            writer.write_object(root)?;
        }
        debug!(
            "wrote {} roots, {} objects",
            roots.len(),
            writer.object_count()
        );
        Self::finish(writer)
    }

    /// Writes a stream with a single root.
    pub fn write<W: Write>(&self, sink: W, root: &Value) -> Result<W> {
        self.write_all(sink, std::slice::from_ref(root))
    }

    /// Encodes a single root into a new buffer.
    pub fn serialize(&self, root: &Value) -> Result<Vec<u8>> {
        self.write(Vec::new(), root)
    }

    /// Encodes independent graphs in parallel, one session each.
    ///
    /// Results are in input order. The first failure is returned.
    pub fn serialize_all(&self, roots: &[Value]) -> Result<Vec<Vec<u8>>> {
        roots.par_iter().map(|root| self.serialize(root)).collect()
    }

    /// Reads every root of a stream until its clean end.
    pub fn read_all<R: Read>(&self, source: R) -> Result<Vec<Value>> {
        let (_, mut reader) = self.reader(source)?;
        let mut roots = Vec::new();
        while let Some(root) = reader.read_object()? {
            roots.push(root);
        }
        Ok(roots)
    }

    /// Reads the first root of a stream.
    pub fn read<R: Read>(&self, source: R) -> Result<Value> {
        let (_, mut reader) = self.reader(source)?;
        reader
            .read_object()?
            .ok_or_else(|| GraphError::corrupt("stream contains no root value"))
    }

    /// Decodes the first root of an in-memory stream.
    pub fn deserialize(&self, bytes: &[u8]) -> Result<Value> {
        self.read(bytes)
    }

    /// Writes a single root to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P, root: &Value) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let mut out = self.write(BufWriter::new(file), root)?;
        out.flush()?;
        Ok(())
    }

    /// Reads the first root of a file through a memory map.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Value> {
        let file = File::open(path.as_ref())?;
        let len = file.metadata()?.len();
        if len < HEADER_SIZE as u64 {
            return Err(GraphError::corrupt(format!(
                "file of {len} bytes is shorter than the stream header"
            )));
        }
        // SAFETY: the map is read-only and dropped before returning. Concurrent truncation
        // of the file by another process is outside the codec's control.
        #[allow(unsafe_code)]
        let map = unsafe { Mmap::map(&file)? };
        self.deserialize(&map)
    }
}

/// The main entry point, using default options.
#[derive(Debug)]
pub struct GraphStream;

impl GraphStream {
    /// A builder for non-default options.
    pub fn builder() -> StreamBuilder {
        StreamBuilder::new()
    }

    /// Encodes a graph into a new buffer.
    pub fn serialize(root: &Value) -> Result<Vec<u8>> {
        StreamBuilder::new().serialize(root)
    }

    /// Encodes a graph into `sink` and returns it.
    pub fn write<W: Write>(sink: W, root: &Value) -> Result<W> {
        StreamBuilder::new().write(sink, root)
    }

    /// Decodes the root of an in-memory stream.
    pub fn deserialize(bytes: &[u8]) -> Result<Value> {
        StreamBuilder::new().deserialize(bytes)
    }

    /// Decodes the root of a stream read from `source`.
    pub fn read<R: Read>(source: R) -> Result<Value> {
        StreamBuilder::new().read(source)
    }

    /// Saves a graph to a file.
    pub fn save<P: AsRef<Path>>(path: P, root: &Value) -> Result<()> {
        StreamBuilder::new().save(path, root)
    }

    /// Loads a graph from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Value> {
        StreamBuilder::new().load(path)
    }

    /// Encodes independent graphs in parallel.
    pub fn serialize_all(roots: &[Value]) -> Result<Vec<Vec<u8>>> {
        StreamBuilder::new().serialize_all(roots)
    }
}
