//! Leaf codecs and the process-wide streamer registry.
//!
//! A [`Streamer`] encodes one exact class without walking fields. The registry is seeded with
//! the primitives, strings, class references, primitive arrays, numeric buffers and paths.
//! Enum types and [`EncodableType`]s are added on demand, the first time a value of that class
//! is written or explicitly through [`register_enum`] / [`register_encodable`].
//!
//! Every leaf class is final: a slot declared with a leaf class never carries an announcement.

use crate::error::{GraphError, Result};
use crate::format::{self, read_array};
use crate::hash::{FastMap, fast_map};
use crate::value::{EnumClass, EnumType, NumericBuffer, Primitive, PrimitiveArray, Value};
use crate::varint;
use log::debug;
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::io::{Read, Write};
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

/// Class name of string values.
pub const STR: &str = "str";
/// Class name of class-reference values.
pub const CLASS_REF: &str = "class";
/// Class name of path values.
pub const PATH: &str = "path";

/// Upper bound on speculative preallocation for lengths read from a stream.
const PREALLOC_LIMIT: usize = 4096;

/// A leaf codec for one exact class.
pub trait Streamer: Send + Sync + fmt::Debug {
    /// The class this streamer encodes.
    fn class_name(&self) -> &str;

    /// The primitive type, for the eight primitive streamers.
    ///
    /// Slots declared with a primitive class carry the body only: no id, no announcement.
    fn primitive(&self) -> Option<Primitive> {
        None
    }

    /// The enum described by this streamer, for enum streamers.
    fn enum_class(&self) -> Option<&'static EnumClass> {
        None
    }

    /// Writes the body of `value`.
    fn write(&self, value: &Value, out: &mut dyn Write) -> Result<()>;

    /// Reads a body written by [`Streamer::write`].
    fn read(&self, input: &mut dyn Read) -> Result<Value>;

    /// Like [`Streamer::read`], rejecting element counts above `max_length` as corrupt.
    fn read_bounded(&self, input: &mut dyn Read, _max_length: usize) -> Result<Value> {
        self.read(input)
    }
}

/// A value that writes and reads itself over a raw byte channel.
///
/// Implement [`EncodableType`] instead; this object-safe form is derived from it.
pub trait Encodable: Any + Send + Sync + fmt::Debug {
    /// Fully-qualified class name.
    fn class_name(&self) -> &'static str;
    /// Writes the value's own encoding.
    fn encode_to(&self, out: &mut dyn Write) -> Result<()>;
    /// The streamer for this class, registered on first use.
    fn streamer(&self) -> Arc<dyn Streamer>;
    /// Upcast for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Content equality: same class and identical encodings.
    fn content_eq(&self, other: &dyn Encodable) -> bool {
        if self.class_name() != other.class_name() {
            return false;
        }
        let (mut left, mut right) = (Vec::new(), Vec::new());
        match (self.encode_to(&mut left), other.encode_to(&mut right)) {
            (Ok(()), Ok(())) => left == right,
            _ => false,
        }
    }
}

/// A user type with a hand-written encoding.
///
/// ```rust
/// use graphstream::streamer::EncodableType;
/// use graphstream::Result;
/// use std::io::{Read, Write};
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct Rgb(u8, u8, u8);
///
/// impl EncodableType for Rgb {
///     const CLASS: &'static str = "demo.Rgb";
///
///     fn encode(&self, out: &mut dyn Write) -> Result<()> {
///         out.write_all(&[self.0, self.1, self.2])?;
///         Ok(())
///     }
///
///     fn decode(input: &mut dyn Read) -> Result<Self> {
///         let mut b = [0u8; 3];
///         input.read_exact(&mut b)?;
///         Ok(Rgb(b[0], b[1], b[2]))
///     }
/// }
/// ```
pub trait EncodableType: Sized + Send + Sync + fmt::Debug + 'static {
    /// Fully-qualified class name.
    const CLASS: &'static str;
    /// Writes `self`.
    fn encode(&self, out: &mut dyn Write) -> Result<()>;
    /// Reads a value written by [`EncodableType::encode`].
    fn decode(input: &mut dyn Read) -> Result<Self>;
}

impl<T: EncodableType> Encodable for T {
    fn class_name(&self) -> &'static str {
        T::CLASS
    }

    fn encode_to(&self, out: &mut dyn Write) -> Result<()> {
        self.encode(out)
    }

    fn streamer(&self) -> Arc<dyn Streamer> {
        register_encodable::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// --- Primitive bodies ---

fn mismatch(expected: &str, value: &Value) -> GraphError {
    GraphError::mismatch(expected, value.type_name())
}

fn decode_char(code: u32) -> Result<char> {
    char::from_u32(code).ok_or_else(|| GraphError::corrupt(format!("invalid char {code:#x}")))
}

fn decode_bool(byte: u8) -> Result<bool> {
    match byte {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(GraphError::corrupt(format!("invalid bool byte {other:#04x}"))),
    }
}

/// Writes the fixed-width big-endian body of a primitive value.
pub fn write_primitive(primitive: Primitive, value: &Value, out: &mut dyn Write) -> Result<()> {
    match (primitive, value) {
        (Primitive::Bool, Value::Bool(v)) => out.write_all(&[u8::from(*v)])?,
        (Primitive::Byte, Value::Byte(v)) => out.write_all(&v.to_be_bytes())?,
        (Primitive::Char, Value::Char(v)) => out.write_all(&u32::from(*v).to_be_bytes())?,
        (Primitive::Short, Value::Short(v)) => out.write_all(&v.to_be_bytes())?,
        (Primitive::Int, Value::Int(v)) => out.write_all(&v.to_be_bytes())?,
        (Primitive::Long, Value::Long(v)) => out.write_all(&v.to_be_bytes())?,
        (Primitive::Float, Value::Float(v)) => out.write_all(&v.to_bits().to_be_bytes())?,
        (Primitive::Double, Value::Double(v)) => out.write_all(&v.to_bits().to_be_bytes())?,
        (p, other) => return Err(mismatch(p.class_name(), other)),
    }
    Ok(())
}

/// Reads the body of a primitive value.
pub fn read_primitive(primitive: Primitive, input: &mut dyn Read) -> Result<Value> {
    Ok(match primitive {
        Primitive::Bool => Value::Bool(decode_bool(read_array::<1, _>(input)?[0])?),
        Primitive::Byte => Value::Byte(i8::from_be_bytes(read_array(input)?)),
        Primitive::Char => Value::Char(decode_char(u32::from_be_bytes(read_array(input)?))?),
        Primitive::Short => Value::Short(i16::from_be_bytes(read_array(input)?)),
        Primitive::Int => Value::Int(i32::from_be_bytes(read_array(input)?)),
        Primitive::Long => Value::Long(i64::from_be_bytes(read_array(input)?)),
        Primitive::Float => Value::Float(f32::from_bits(u32::from_be_bytes(read_array(input)?))),
        Primitive::Double => {
            Value::Double(f64::from_bits(u64::from_be_bytes(read_array(input)?)))
        }
    })
}

fn write_elements<T>(
    out: &mut dyn Write,
    items: &[T],
    mut put: impl FnMut(&mut dyn Write, &T) -> std::io::Result<()>,
) -> Result<()> {
    varint::write_len(out, items.len())?;
    for item in items {
        put(out, item)?;
    }
    Ok(())
}

fn read_elements<T>(
    input: &mut dyn Read,
    max_length: usize,
    mut take: impl FnMut(&mut dyn Read) -> Result<T>,
) -> Result<Vec<T>> {
    let len = read_len(input)?;
    if len > max_length {
        return Err(GraphError::corrupt(format!(
            "array length {len} exceeds the limit of {max_length}"
        )));
    }
    // Grows with the bytes actually present, so a forged length cannot force a huge allocation.
    let mut items = Vec::with_capacity(len.min(PREALLOC_LIMIT));
    for _ in 0..len {
        items.push(take(input)?);
    }
    Ok(items)
}

fn read_len(input: &mut dyn Read) -> Result<usize> {
    let len = varint::read_required(input)?;
    usize::try_from(len).map_err(|_| GraphError::corrupt(format!("length {len} overflows usize")))
}

/// Writes a primitive array: varint length, then the elements.
pub fn write_array(array: &PrimitiveArray, out: &mut dyn Write) -> Result<()> {
    match array {
        PrimitiveArray::Bool(v) => write_elements(out, v, |o, x| o.write_all(&[u8::from(*x)])),
        PrimitiveArray::Byte(v) => write_elements(out, v, |o, x| o.write_all(&x.to_be_bytes())),
        PrimitiveArray::Char(v) => {
            write_elements(out, v, |o, x| o.write_all(&u32::from(*x).to_be_bytes()))
        }
        PrimitiveArray::Short(v) => write_elements(out, v, |o, x| o.write_all(&x.to_be_bytes())),
        PrimitiveArray::Int(v) => write_elements(out, v, |o, x| o.write_all(&x.to_be_bytes())),
        PrimitiveArray::Long(v) => write_elements(out, v, |o, x| o.write_all(&x.to_be_bytes())),
        PrimitiveArray::Float(v) => {
            write_elements(out, v, |o, x| o.write_all(&x.to_bits().to_be_bytes()))
        }
        PrimitiveArray::Double(v) => {
            write_elements(out, v, |o, x| o.write_all(&x.to_bits().to_be_bytes()))
        }
    }
}

/// Reads a primitive array with the given element type and at most `max_length` elements.
pub fn read_array_body(
    element: Primitive,
    input: &mut dyn Read,
    max_length: usize,
) -> Result<PrimitiveArray> {
    Ok(match element {
        Primitive::Bool => PrimitiveArray::Bool(read_elements(input, max_length, |i| {
            decode_bool(read_array::<1, _>(i)?[0])
        })?),
        Primitive::Byte => PrimitiveArray::Byte(read_elements(input, max_length, |i| {
            Ok(i8::from_be_bytes(read_array(i)?))
        })?),
        Primitive::Char => PrimitiveArray::Char(read_elements(input, max_length, |i| {
            decode_char(u32::from_be_bytes(read_array(i)?))
        })?),
        Primitive::Short => PrimitiveArray::Short(read_elements(input, max_length, |i| {
            Ok(i16::from_be_bytes(read_array(i)?))
        })?),
        Primitive::Int => PrimitiveArray::Int(read_elements(input, max_length, |i| {
            Ok(i32::from_be_bytes(read_array(i)?))
        })?),
        Primitive::Long => PrimitiveArray::Long(read_elements(input, max_length, |i| {
            Ok(i64::from_be_bytes(read_array(i)?))
        })?),
        Primitive::Float => PrimitiveArray::Float(read_elements(input, max_length, |i| {
            Ok(f32::from_bits(u32::from_be_bytes(read_array(i)?)))
        })?),
        Primitive::Double => PrimitiveArray::Double(read_elements(input, max_length, |i| {
            Ok(f64::from_bits(u64::from_be_bytes(read_array(i)?)))
        })?),
    })
}

// --- Built-in streamers ---

/// Streamer for one of the eight primitive classes.
#[derive(Debug)]
pub struct PrimitiveStreamer(pub Primitive);

impl Streamer for PrimitiveStreamer {
    fn class_name(&self) -> &str {
        self.0.class_name()
    }

    fn primitive(&self) -> Option<Primitive> {
        Some(self.0)
    }

    fn write(&self, value: &Value, out: &mut dyn Write) -> Result<()> {
        write_primitive(self.0, value, out)
    }

    fn read(&self, input: &mut dyn Read) -> Result<Value> {
        read_primitive(self.0, input)
    }
}

/// Length-prefixed UTF-8 strings.
#[derive(Debug)]
pub struct StrStreamer;

impl Streamer for StrStreamer {
    fn class_name(&self) -> &str {
        STR
    }

    fn write(&self, value: &Value, out: &mut dyn Write) -> Result<()> {
        match value {
            Value::Str(s) => format::write_utf(out, s),
            other => Err(mismatch(STR, other)),
        }
    }

    fn read(&self, input: &mut dyn Read) -> Result<Value> {
        Ok(Value::Str(Arc::from(format::read_utf(input)?)))
    }
}

/// Class references, by fully-qualified name.
#[derive(Debug)]
pub struct ClassRefStreamer;

impl Streamer for ClassRefStreamer {
    fn class_name(&self) -> &str {
        CLASS_REF
    }

    fn write(&self, value: &Value, out: &mut dyn Write) -> Result<()> {
        match value {
            Value::Class(name) => format::write_utf(out, name),
            other => Err(mismatch(CLASS_REF, other)),
        }
    }

    fn read(&self, input: &mut dyn Read) -> Result<Value> {
        Ok(Value::Class(Arc::from(format::read_utf(input)?)))
    }
}

/// Opaque file paths, as UTF-8.
#[derive(Debug)]
pub struct PathStreamer;

impl Streamer for PathStreamer {
    fn class_name(&self) -> &str {
        PATH
    }

    fn write(&self, value: &Value, out: &mut dyn Write) -> Result<()> {
        let Value::Path(path) = value else {
            return Err(mismatch(PATH, value));
        };
        let text = path.to_str().ok_or_else(|| {
            GraphError::unsupported(PATH, format!("{} is not valid UTF-8", path.display()))
        })?;
        format::write_utf(out, text)
    }

    fn read(&self, input: &mut dyn Read) -> Result<Value> {
        Ok(Value::Path(Arc::new(PathBuf::from(format::read_utf(input)?))))
    }
}

/// Primitive arrays: varint length plus elements.
#[derive(Debug)]
pub struct ArrayStreamer(pub Primitive);

impl Streamer for ArrayStreamer {
    fn class_name(&self) -> &str {
        self.0.array_class_name()
    }

    fn write(&self, value: &Value, out: &mut dyn Write) -> Result<()> {
        match value {
            Value::Array(array) if array.element() == self.0 => write_array(array, out),
            other => Err(mismatch(self.class_name(), other)),
        }
    }

    fn read(&self, input: &mut dyn Read) -> Result<Value> {
        self.read_bounded(input, usize::MAX)
    }

    fn read_bounded(&self, input: &mut dyn Read, max_length: usize) -> Result<Value> {
        Ok(Value::Array(Arc::new(read_array_body(self.0, input, max_length)?)))
    }
}

/// Typed numeric buffers: varint position, then the contents as a primitive array.
#[derive(Debug)]
pub struct BufferStreamer(pub Primitive);

impl Streamer for BufferStreamer {
    fn class_name(&self) -> &str {
        self.0.buffer_class_name()
    }

    fn write(&self, value: &Value, out: &mut dyn Write) -> Result<()> {
        match value {
            Value::Buffer(buffer) if buffer.elements.element() == self.0 => {
                if buffer.position > buffer.elements.len() {
                    return Err(GraphError::unsupported(
                        self.class_name(),
                        format!(
                            "position {} beyond limit {}",
                            buffer.position,
                            buffer.elements.len()
                        ),
                    ));
                }
                varint::write_len(out, buffer.position)?;
                write_array(&buffer.elements, out)
            }
            other => Err(mismatch(self.class_name(), other)),
        }
    }

    fn read(&self, input: &mut dyn Read) -> Result<Value> {
        self.read_bounded(input, usize::MAX)
    }

    fn read_bounded(&self, input: &mut dyn Read, max_length: usize) -> Result<Value> {
        let position = read_len(input)?;
        let elements = read_array_body(self.0, input, max_length)?;
        if position > elements.len() {
            return Err(GraphError::corrupt(format!(
                "buffer position {position} beyond limit {}",
                elements.len()
            )));
        }
        Ok(Value::Buffer(Arc::new(NumericBuffer { elements, position })))
    }
}

/// Enum constants, by symbolic name.
#[derive(Debug)]
pub struct EnumStreamer(pub &'static EnumClass);

impl Streamer for EnumStreamer {
    fn class_name(&self) -> &str {
        self.0.name
    }

    fn enum_class(&self) -> Option<&'static EnumClass> {
        Some(self.0)
    }

    fn write(&self, value: &Value, out: &mut dyn Write) -> Result<()> {
        match value {
            Value::Enum(constant) if constant.class.name == self.0.name => {
                format::write_utf(out, constant.name())
            }
            other => Err(mismatch(self.0.name, other)),
        }
    }

    fn read(&self, input: &mut dyn Read) -> Result<Value> {
        let name = format::read_utf(input)?;
        let ordinal = self.0.ordinal_of(&name).ok_or_else(|| {
            GraphError::corrupt(format!("'{name}' is not a constant of {}", self.0.name))
        })?;
        Ok(Value::Enum(crate::value::EnumValue {
            class: self.0,
            ordinal,
        }))
    }
}

/// Adapts an [`EncodableType`] to the streamer interface.
pub struct EncodableStreamer<T>(PhantomData<fn() -> T>);

impl<T> fmt::Debug for EncodableStreamer<T>
where
    T: EncodableType,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncodableStreamer({})", T::CLASS)
    }
}

impl<T: EncodableType> Streamer for EncodableStreamer<T> {
    fn class_name(&self) -> &str {
        T::CLASS
    }

    fn write(&self, value: &Value, out: &mut dyn Write) -> Result<()> {
        match value {
            Value::Custom(custom) => match custom.as_any().downcast_ref::<T>() {
                Some(typed) => typed.encode(out),
                None => Err(mismatch(T::CLASS, value)),
            },
            other => Err(mismatch(T::CLASS, other)),
        }
    }

    fn read(&self, input: &mut dyn Read) -> Result<Value> {
        Ok(Value::Custom(Arc::new(T::decode(input)?)))
    }
}

// --- Registry ---

/// Process-wide map from class name to leaf codec.
///
/// Populated once per class; the first registration of a name wins.
#[derive(Debug)]
pub struct StreamerRegistry {
    streamers: RwLock<FastMap<Arc<str>, Arc<dyn Streamer>>>,
}

static STREAMERS: LazyLock<StreamerRegistry> = LazyLock::new(StreamerRegistry::with_builtins);

/// The process-wide streamer registry.
pub fn streamers() -> &'static StreamerRegistry {
    &STREAMERS
}

impl StreamerRegistry {
    fn with_builtins() -> Self {
        let mut map: FastMap<Arc<str>, Arc<dyn Streamer>> = fast_map();
        let mut seed = |streamer: Arc<dyn Streamer>| {
            map.insert(Arc::from(streamer.class_name()), streamer);
        };
        for primitive in Primitive::ALL {
            seed(Arc::new(PrimitiveStreamer(primitive)));
            seed(Arc::new(ArrayStreamer(primitive)));
            seed(Arc::new(BufferStreamer(primitive)));
        }
        seed(Arc::new(StrStreamer));
        seed(Arc::new(ClassRefStreamer));
        seed(Arc::new(PathStreamer));
        Self {
            streamers: RwLock::new(map),
        }
    }

    /// Looks up the streamer for an exact class name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Streamer>> {
        self.streamers.read().get(name).cloned()
    }

    /// Registers `streamer` unless its class already has one; returns the effective streamer.
    pub fn register(&self, streamer: Arc<dyn Streamer>) -> Arc<dyn Streamer> {
        if let Some(existing) = self.get(streamer.class_name()) {
            return existing;
        }
        let mut map = self.streamers.write();
        map.entry(Arc::from(streamer.class_name()))
            .or_insert_with(|| {
                debug!("registered streamer for class '{}'", streamer.class_name());
                streamer
            })
            .clone()
    }
}

/// Registers the streamer for an enum class.
pub fn register_enum_class(class: &'static EnumClass) -> Arc<dyn Streamer> {
    match streamers().get(class.name) {
        Some(existing) => existing,
        None => streamers().register(Arc::new(EnumStreamer(class))),
    }
}

/// Registers the streamer for a `#[derive(GraphEnum)]` type.
pub fn register_enum<E: EnumType>() -> Arc<dyn Streamer> {
    register_enum_class(E::enum_class())
}

/// Registers the streamer for an [`EncodableType`].
pub fn register_encodable<T: EncodableType>() -> Arc<dyn Streamer> {
    match streamers().get(T::CLASS) {
        Some(existing) => existing,
        None => streamers().register(Arc::new(EncodableStreamer::<T>(PhantomData))),
    }
}

/// The streamer for a leaf value, registering enum and encodable classes on first use.
///
/// Returns `None` for `Null` and for objects.
pub fn streamer_for(value: &Value) -> Option<Arc<dyn Streamer>> {
    let name = match value {
        Value::Null | Value::Object(_) => return None,
        Value::Bool(_) => Primitive::Bool.class_name(),
        Value::Byte(_) => Primitive::Byte.class_name(),
        Value::Char(_) => Primitive::Char.class_name(),
        Value::Short(_) => Primitive::Short.class_name(),
        Value::Int(_) => Primitive::Int.class_name(),
        Value::Long(_) => Primitive::Long.class_name(),
        Value::Float(_) => Primitive::Float.class_name(),
        Value::Double(_) => Primitive::Double.class_name(),
        Value::Str(_) => STR,
        Value::Class(_) => CLASS_REF,
        Value::Path(_) => PATH,
        Value::Array(array) => array.element().array_class_name(),
        Value::Buffer(buffer) => buffer.elements.element().buffer_class_name(),
        Value::Enum(constant) => return Some(register_enum_class(constant.class)),
        Value::Custom(custom) => return Some(custom.streamer()),
    };
    streamers().get(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: Value) -> Value {
        let streamer = streamer_for(&value).expect("leaf streamer");
        let mut out = Vec::new();
        streamer.write(&value, &mut out).expect("write");
        let mut input = out.as_slice();
        let decoded = streamer.read(&mut input).expect("read");
        assert!(input.is_empty(), "streamer left {} bytes", input.len());
        decoded
    }

    #[test]
    fn primitives_are_big_endian() {
        let mut out = Vec::new();
        write_primitive(Primitive::Int, &Value::Int(0x0102_0304), &mut out).expect("write");
        assert_eq!(out, [1, 2, 3, 4]);
        let mut out = Vec::new();
        write_primitive(Primitive::Char, &Value::Char('A'), &mut out).expect("write");
        assert_eq!(out, [0, 0, 0, 0x41]);
    }

    #[test]
    fn leaves_survive_their_streamer() {
        for value in [
            Value::Bool(true),
            Value::Double(-0.0),
            Value::Float(f32::NAN),
            Value::str("grüße"),
            Value::Class(Arc::from("demo.Widget")),
            Value::from(PathBuf::from("/tmp/x.bin")),
            Value::from(PrimitiveArray::Long(vec![i64::MIN, 0, i64::MAX])),
        ] {
            assert_eq!(round_trip(value.clone()), value);
        }
    }

    #[test]
    fn buffer_keeps_position() {
        let value = Value::Buffer(Arc::new(NumericBuffer {
            elements: PrimitiveArray::Short(vec![1, 2, 3]),
            position: 2,
        }));
        assert_eq!(round_trip(value.clone()), value);
    }

    #[test]
    fn primitive_streamer_rejects_wrong_shape() {
        let mut out = Vec::new();
        let err = write_primitive(Primitive::Int, &Value::Long(1), &mut out).expect_err("shape");
        assert!(matches!(err, GraphError::TypeMismatch { .. }));
    }

    #[test]
    fn invalid_bool_is_corrupt() {
        let err = read_primitive(Primitive::Bool, &mut [7u8].as_slice()).expect_err("bool");
        assert!(matches!(err, GraphError::Corrupt(_)));
    }

    #[test]
    fn array_lengths_are_bounded() {
        let value = Value::from(PrimitiveArray::Int(vec![1, 2, 3, 4, 5]));
        let streamer = streamer_for(&value).expect("array streamer");
        let mut out = Vec::new();
        streamer.write(&value, &mut out).expect("write");

        let err = streamer.read_bounded(&mut out.as_slice(), 4).expect_err("too long");
        assert!(matches!(err, GraphError::Corrupt(_)));
        let decoded = streamer.read_bounded(&mut out.as_slice(), 5).expect("within limit");
        assert_eq!(decoded, value);
    }
}
