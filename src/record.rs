//! Records: types walked field by field.
//!
//! `#[derive(GraphRecord)]` produces an explicit field-descriptor table per type, indexed
//! getters and setters that convert through [`FieldType`], and a static [`RecordClass`]. This
//! module turns those tables into normalized [`FieldLayout`]s and keeps the process-wide
//! prototype cache used for default elision.
//!
//! ```rust
//! use graphstream::{GraphRecord, GraphStream, Obj, Value};
//!
//! #[derive(Debug, Default, GraphRecord)]
//! #[graph(name = "demo.Counter")]
//! struct Counter {
//!     name: String,
//!     count: i32,
//! }
//!
//! let root = Value::from(Obj::record(Counter { name: "a".into(), count: 5 }));
//! let bytes = GraphStream::serialize(&root)?;
//! let back = GraphStream::deserialize(&bytes)?;
//! assert_eq!(back, root);
//! # Ok::<(), graphstream::GraphError>(())
//! ```

use crate::error::{GraphError, Result};
use crate::format::ClassFlags;
use crate::hash::{FastMap, fast_map};
use crate::value::{Obj, PrimitiveArray, Value};
use log::debug;
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

/// One serializable field as declared by a record type.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    /// Class that declares the field (a base class for inherited fields).
    pub declaring: &'static str,
    /// Field name before normalization.
    pub name: &'static str,
    /// Declared class of the field.
    pub declared: &'static str,
    /// Registers the declared class, so it resolves when announced.
    pub register: fn() -> Result<()>,
}

/// Static description of a record type.
pub struct RecordClass {
    /// Fully-qualified class name.
    pub name: &'static str,
    /// Announcement flags ([`ClassFlags::FINAL`], [`ClassFlags::INNER`]).
    pub flags: ClassFlags,
    /// Number of fields, base fields included.
    pub field_count: usize,
    /// Appends the descriptors of all fields, base class first.
    pub fields: fn(&mut Vec<FieldDescriptor>),
    /// Whether [`CustomFields`] replaces the field walk.
    pub custom: bool,
    /// Builds a fresh default instance.
    pub construct: fn() -> Result<Box<dyn Record>>,
}

impl fmt::Debug for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordClass")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("field_count", &self.field_count)
            .field("custom", &self.custom)
            .finish_non_exhaustive()
    }
}

/// Object-safe access to a record's fields by index.
///
/// Indices follow the descriptor order of [`RecordClass::fields`].
pub trait Record: Any + Send + Sync + fmt::Debug {
    /// The static class description.
    fn record_class(&self) -> &'static RecordClass;

    /// Reads a field as a [`Value`].
    fn get_field(&self, index: usize) -> Result<Value>;

    /// Assigns a field from a [`Value`].
    fn set_field(&mut self, index: usize, value: Value) -> Result<()>;

    /// The owner (outer instance) reference of an inner record.
    fn owner(&self) -> Value {
        Value::Null
    }

    /// Assigns the owner reference.
    fn set_owner(&mut self, owner: Value) -> Result<()> {
        let _ = owner;
        Ok(())
    }

    /// Custom encoding hook; `None` selects the default field walk.
    fn write_custom(&self, out: &mut dyn ObjectOutput) -> Option<Result<()>> {
        let _ = out;
        None
    }

    /// Custom decoding hook; `None` selects the default field walk.
    fn read_custom(&mut self, input: &mut dyn ObjectInput) -> Option<Result<()>> {
        let _ = input;
        None
    }

    /// Upcast for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to the concrete type.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Static side of a record type, implemented by `#[derive(GraphRecord)]`.
pub trait RecordType: Record + Sized {
    /// Fully-qualified class name.
    const NAME: &'static str;
    /// Number of fields, base fields included.
    const FIELD_COUNT: usize;
    /// The static class description.
    fn class() -> &'static RecordClass;
    /// Appends the descriptors of all fields, base class first.
    fn collect_fields(fields: &mut Vec<FieldDescriptor>);
}

/// A type usable as the declared class of a field (`#[graph(declared = "Type")]`).
pub trait ClassType {
    /// Fully-qualified class name.
    const CLASS_NAME: &'static str;
    /// Makes the class resolvable by name.
    fn register_class() -> Result<()>;
}

/// The stream side of a custom encoding hook.
pub trait ObjectOutput {
    /// Writes a value as if it were held by a field declared with `declared`.
    fn write_value(&mut self, value: &Value, declared: &str) -> Result<()>;
    /// Writes a varint.
    fn write_varint(&mut self, value: u64) -> Result<()>;
    /// Writes raw bytes.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()>;
}

/// The stream side of a custom decoding hook.
pub trait ObjectInput {
    /// Reads a value written with [`ObjectOutput::write_value`] and the same declared class.
    fn read_value(&mut self, declared: &str) -> Result<Value>;
    /// Reads a varint.
    fn read_varint(&mut self) -> Result<u64>;
    /// Fills `buf` with raw bytes.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()>;
}

impl dyn ObjectOutput + '_ {
    /// Adapts the output to `std::io::Write` for raw payloads.
    pub fn as_writer(&mut self) -> impl Write + '_ {
        RawOutput(self)
    }
}

impl dyn ObjectInput + '_ {
    /// Adapts the input to `std::io::Read` for raw payloads.
    pub fn as_reader(&mut self) -> impl Read + '_ {
        RawInput(self)
    }
}

struct RawOutput<'a, 'b>(&'a mut (dyn ObjectOutput + 'b));

impl Write for RawOutput<'_, '_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write_bytes(buf).map_err(std::io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

struct RawInput<'a, 'b>(&'a mut (dyn ObjectInput + 'b));

impl Read for RawInput<'_, '_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read_bytes(buf).map_err(std::io::Error::other)?;
        Ok(buf.len())
    }
}

/// Hand-written field encoding, selected with `#[graph(custom)]`.
///
/// Both halves must agree on the layout; the codec only frames it.
///
/// While `read_fields` runs, the record's handle holds a default instance in its place, so a
/// back-reference to the record under construction observes that instance rather than
/// blocking on it.
pub trait CustomFields {
    /// Writes the record's state.
    fn write_fields(&self, out: &mut dyn ObjectOutput) -> Result<()>;
    /// Restores the record's state into a freshly constructed instance.
    fn read_fields(&mut self, input: &mut dyn ObjectInput) -> Result<()>;
}

// --- Field layouts ---

/// Strips one leading `_` from a field name.
pub fn normalize_field_name(name: &str) -> &str {
    name.strip_prefix('_').unwrap_or(name)
}

/// A normalized field of a record class.
#[derive(Debug, Clone, Copy)]
pub struct FieldSlot {
    /// Index for [`Record::get_field`] / [`Record::set_field`].
    pub index: usize,
    /// Normalized name.
    pub name: &'static str,
    /// Declared class.
    pub declared: &'static str,
    /// Declaring class.
    pub declaring: &'static str,
}

/// The normalized field table of one record class.
#[derive(Debug)]
pub struct FieldLayout {
    /// The class this layout describes.
    pub class: &'static RecordClass,
    /// Fields in index order, base class first.
    pub slots: Vec<FieldSlot>,
    by_name: FastMap<&'static str, usize>,
}

impl FieldLayout {
    fn build(class: &'static RecordClass) -> Result<Self> {
        let mut descriptors = Vec::with_capacity(class.field_count);
        (class.fields)(&mut descriptors);
        if descriptors.len() != class.field_count {
            return Err(GraphError::Internal(format!(
                "{} declares {} fields but lists {}",
                class.name,
                class.field_count,
                descriptors.len()
            )));
        }
        let mut slots = Vec::with_capacity(descriptors.len());
        let mut by_name = fast_map();
        for (index, descriptor) in descriptors.into_iter().enumerate() {
            let name = normalize_field_name(descriptor.name);
            if by_name.insert(name, index).is_some() {
                return Err(GraphError::AmbiguousField {
                    class: class.name.to_string(),
                    field: name.to_string(),
                });
            }
            (descriptor.register)().map_err(|e| e.in_field(descriptor.declaring, name))?;
            slots.push(FieldSlot {
                index,
                name,
                declared: descriptor.declared,
                declaring: descriptor.declaring,
            });
        }
        Ok(Self {
            class,
            slots,
            by_name,
        })
    }

    /// Finds the field a stream entry refers to: same normalized name and declared class.
    pub fn find(&self, name: &str, declared: &str) -> Option<&FieldSlot> {
        let slot = self.slots.get(*self.by_name.get(name)?)?;
        (slot.declared == declared).then_some(slot)
    }
}

static LAYOUTS: LazyLock<RwLock<FastMap<&'static str, Arc<FieldLayout>>>> =
    LazyLock::new(|| RwLock::new(fast_map()));

/// The cached field layout of a record class.
pub fn layout(class: &'static RecordClass) -> Result<Arc<FieldLayout>> {
    if let Some(layout) = LAYOUTS.read().get(class.name) {
        return Ok(layout.clone());
    }
    let built = Arc::new(FieldLayout::build(class)?);
    let mut layouts = LAYOUTS.write();
    Ok(layouts.entry(class.name).or_insert(built).clone())
}

// --- Prototypes ---

static PROTOTYPES: LazyLock<RwLock<FastMap<&'static str, Arc<dyn Record>>>> =
    LazyLock::new(|| RwLock::new(fast_map()));

/// Builds a fresh instance of a record class.
pub fn construct(class: &'static RecordClass) -> Result<Box<dyn Record>> {
    (class.construct)().map_err(|e| match e {
        GraphError::Construction { .. } => e,
        other => GraphError::Construction {
            class: class.name.to_string(),
            reason: other.to_string(),
        },
    })
}

/// The shared default instance of a record class, built on first use.
pub fn prototype(class: &'static RecordClass) -> Result<Arc<dyn Record>> {
    if let Some(prototype) = PROTOTYPES.read().get(class.name) {
        return Ok(prototype.clone());
    }
    let built: Arc<dyn Record> = Arc::from(construct(class)?);
    let mut prototypes = PROTOTYPES.write();
    Ok(prototypes
        .entry(class.name)
        .or_insert_with(|| {
            debug!("built prototype for '{}'", class.name);
            built
        })
        .clone())
}

// --- Field conversions ---

/// Conversion between a field's Rust type and [`Value`].
pub trait FieldType: Sized {
    /// Declared class of fields of this type.
    const DECLARED: &'static str;

    /// Declared class of `Option<Self>` fields. Primitive slots cannot hold null, so the
    /// primitives widen to `any` and their values are written as identified leaves.
    const NULLABLE: &'static str = Self::DECLARED;

    /// Converts the field's current value.
    fn to_value(&self) -> Value;

    /// Converts a decoded value back.
    fn from_value(value: Value) -> Result<Self>;

    /// Makes the declared class resolvable by name.
    fn register() -> Result<()> {
        Ok(())
    }
}

macro_rules! primitive_field {
    ($($t:ty => $variant:ident, $declared:literal;)*) => {
        $(
            impl FieldType for $t {
                const DECLARED: &'static str = $declared;
                const NULLABLE: &'static str = crate::class::ANY;

                fn to_value(&self) -> Value {
                    Value::$variant(*self)
                }

                fn from_value(value: Value) -> Result<Self> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(GraphError::mismatch($declared, other.type_name())),
                    }
                }
            }
        )*
    };
}

primitive_field! {
    bool => Bool, "bool";
    i8 => Byte, "i8";
    char => Char, "char";
    i16 => Short, "i16";
    i32 => Int, "i32";
    i64 => Long, "i64";
    f32 => Float, "f32";
    f64 => Double, "f64";
}

macro_rules! array_field {
    ($($t:ty => $variant:ident, $declared:literal;)*) => {
        $(
            impl FieldType for Vec<$t> {
                const DECLARED: &'static str = $declared;

                fn to_value(&self) -> Value {
                    Value::from(PrimitiveArray::$variant(self.clone()))
                }

                fn from_value(value: Value) -> Result<Self> {
                    match value {
                        Value::Array(array) => match Arc::unwrap_or_clone(array) {
                            PrimitiveArray::$variant(items) => Ok(items),
                            other => Err(GraphError::mismatch(
                                $declared,
                                other.element().array_class_name(),
                            )),
                        },
                        other => Err(GraphError::mismatch($declared, other.type_name())),
                    }
                }
            }
        )*
    };
}

array_field! {
    bool => Bool, "[bool";
    i8 => Byte, "[i8";
    char => Char, "[char";
    i16 => Short, "[i16";
    i32 => Int, "[i32";
    i64 => Long, "[i64";
    f32 => Float, "[f32";
    f64 => Double, "[f64";
}

impl FieldType for String {
    const DECLARED: &'static str = crate::streamer::STR;

    fn to_value(&self) -> Value {
        Value::str(self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Str(s) => Ok(s.to_string()),
            other => Err(GraphError::mismatch("str", other.type_name())),
        }
    }
}

impl FieldType for Arc<str> {
    const DECLARED: &'static str = crate::streamer::STR;

    fn to_value(&self) -> Value {
        Value::Str(self.clone())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Str(s) => Ok(s),
            other => Err(GraphError::mismatch("str", other.type_name())),
        }
    }
}

impl FieldType for PathBuf {
    const DECLARED: &'static str = crate::streamer::PATH;

    fn to_value(&self) -> Value {
        Value::from(self.clone())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Path(path) => Ok(Arc::unwrap_or_clone(path)),
            other => Err(GraphError::mismatch("path", other.type_name())),
        }
    }
}

impl FieldType for Value {
    const DECLARED: &'static str = crate::class::ANY;

    fn to_value(&self) -> Value {
        self.clone()
    }

    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl FieldType for Obj {
    const DECLARED: &'static str = crate::class::ANY;

    fn to_value(&self) -> Value {
        Value::Object(self.clone())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(obj) => Ok(obj),
            other => Err(GraphError::mismatch("object", other.type_name())),
        }
    }
}

impl<T: FieldType> FieldType for Option<T> {
    const DECLARED: &'static str = T::NULLABLE;

    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, T::to_value)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }

    fn register() -> Result<()> {
        T::register()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_strips_one_marker() {
        assert_eq!(normalize_field_name("_name"), "name");
        assert_eq!(normalize_field_name("__name"), "_name");
        assert_eq!(normalize_field_name("name"), "name");
    }

    #[test]
    fn option_maps_null() {
        assert!(Option::<i32>::from_value(Value::Null).expect("null").is_none());
        assert_eq!(Some(3i32).to_value(), Value::Int(3));
        assert_eq!(<Option<String> as FieldType>::DECLARED, "str");
    }

    #[test]
    fn optional_primitives_widen_to_any() {
        assert_eq!(<Option<i32> as FieldType>::DECLARED, crate::class::ANY);
        assert_eq!(<Option<f64> as FieldType>::DECLARED, crate::class::ANY);
        assert_eq!(<Option<Option<String>> as FieldType>::DECLARED, "str");
    }

    #[test]
    fn primitive_fields_reject_other_shapes() {
        let err = i32::from_value(Value::Long(1)).expect_err("mismatch");
        assert!(matches!(err, GraphError::TypeMismatch { .. }));
        let err = Vec::<i32>::from_value(Value::from(PrimitiveArray::Long(vec![])))
            .expect_err("mismatch");
        assert!(matches!(err, GraphError::TypeMismatch { .. }));
    }
}
