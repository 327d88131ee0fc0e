//! The dynamic object model the codec reads and writes.
//!
//! A [`Value`] is either an immutable leaf (primitives, strings, class references, enum
//! constants, primitive arrays, numeric buffers, paths and [`Encodable`] values) or an
//! [`Obj`]: a shared, lockable handle to a heap [`Object`] whose identity is the handle's
//! allocation. Graphs of `Obj` handles may share nodes and form cycles.
//!
//! Leaves have no identity of their own; the writer canonicalizes them by content, so two
//! equal strings referenced from one graph are written once.
//!
//! Handles are reference counted. A cyclic graph keeps itself alive until one of its edges is
//! cleared by the caller.

use crate::class;
use crate::record::Record;
use crate::streamer::Encodable;
use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

// --- Primitive types ---

/// The eight primitive value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// `bool`, one byte.
    Bool,
    /// `i8`, one byte.
    Byte,
    /// `char`, four bytes (scalar value).
    Char,
    /// `i16`, two bytes.
    Short,
    /// `i32`, four bytes.
    Int,
    /// `i64`, eight bytes.
    Long,
    /// `f32`, four bytes (IEEE bits).
    Float,
    /// `f64`, eight bytes (IEEE bits).
    Double,
}

impl Primitive {
    /// All primitives, in class-dictionary seed order.
    pub const ALL: [Primitive; 8] = [
        Self::Bool,
        Self::Byte,
        Self::Char,
        Self::Short,
        Self::Int,
        Self::Long,
        Self::Float,
        Self::Double,
    ];

    /// The class name of the primitive.
    pub const fn class_name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Byte => "i8",
            Self::Char => "char",
            Self::Short => "i16",
            Self::Int => "i32",
            Self::Long => "i64",
            Self::Float => "f32",
            Self::Double => "f64",
        }
    }

    /// Class name of the primitive array with this element type.
    pub const fn array_class_name(self) -> &'static str {
        match self {
            Self::Bool => "[bool",
            Self::Byte => "[i8",
            Self::Char => "[char",
            Self::Short => "[i16",
            Self::Int => "[i32",
            Self::Long => "[i64",
            Self::Float => "[f32",
            Self::Double => "[f64",
        }
    }

    /// Class name of the numeric buffer with this element type.
    pub const fn buffer_class_name(self) -> &'static str {
        match self {
            Self::Bool => "buf:bool",
            Self::Byte => "buf:i8",
            Self::Char => "buf:char",
            Self::Short => "buf:i16",
            Self::Int => "buf:i32",
            Self::Long => "buf:i64",
            Self::Float => "buf:f32",
            Self::Double => "buf:f64",
        }
    }
}

/// A primitive array: a leaf value encoded element-wise.
#[derive(Debug, Clone)]
pub enum PrimitiveArray {
    /// `[bool`
    Bool(Vec<bool>),
    /// `[i8`
    Byte(Vec<i8>),
    /// `[char`
    Char(Vec<char>),
    /// `[i16`
    Short(Vec<i16>),
    /// `[i32`
    Int(Vec<i32>),
    /// `[i64`
    Long(Vec<i64>),
    /// `[f32`
    Float(Vec<f32>),
    /// `[f64`
    Double(Vec<f64>),
}

impl PrimitiveArray {
    /// The element type.
    pub fn element(&self) -> Primitive {
        match self {
            Self::Bool(_) => Primitive::Bool,
            Self::Byte(_) => Primitive::Byte,
            Self::Char(_) => Primitive::Char,
            Self::Short(_) => Primitive::Short,
            Self::Int(_) => Primitive::Int,
            Self::Long(_) => Primitive::Long,
            Self::Float(_) => Primitive::Float,
            Self::Double(_) => Primitive::Double,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Self::Bool(v) => v.len(),
            Self::Byte(v) => v.len(),
            Self::Char(v) => v.len(),
            Self::Short(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Long(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Double(v) => v.len(),
        }
    }

    /// Returns true if the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element-wise equality, comparing floating point by bit pattern.
    pub fn bit_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Byte(a), Self::Byte(b)) => a == b,
            (Self::Char(a), Self::Char(b)) => a == b,
            (Self::Short(a), Self::Short(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Long(a), Self::Long(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            (Self::Double(a), Self::Double(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            _ => false,
        }
    }
}

/// A typed numeric buffer: elements plus a read/write position.
#[derive(Debug, Clone)]
pub struct NumericBuffer {
    /// Buffer contents up to its limit.
    pub elements: PrimitiveArray,
    /// Current position, at most `elements.len()`.
    pub position: usize,
}

// --- Enums ---

/// Static description of an enum type, generated by `#[derive(GraphEnum)]`.
#[derive(Debug)]
pub struct EnumClass {
    /// Fully-qualified class name.
    pub name: &'static str,
    /// Symbolic constant names in declaration order.
    pub variants: &'static [&'static str],
}

impl EnumClass {
    /// Finds the ordinal of a symbolic name.
    pub fn ordinal_of(&self, name: &str) -> Option<usize> {
        self.variants.iter().position(|v| *v == name)
    }
}

/// One enum constant.
#[derive(Clone, Copy)]
pub struct EnumValue {
    /// The declaring enum.
    pub class: &'static EnumClass,
    /// Index into `class.variants`.
    pub ordinal: usize,
}

impl EnumValue {
    /// Creates an enum constant, returning `None` for an out-of-range ordinal.
    pub fn new(class: &'static EnumClass, ordinal: usize) -> Option<Self> {
        (ordinal < class.variants.len()).then_some(Self { class, ordinal })
    }

    /// The symbolic name of the constant.
    pub fn name(&self) -> &'static str {
        self.class.variants.get(self.ordinal).copied().unwrap_or("?")
    }
}

impl fmt::Debug for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.class.name, self.name())
    }
}

impl PartialEq for EnumValue {
    fn eq(&self, other: &Self) -> bool {
        self.class.name == other.class.name && self.ordinal == other.ordinal
    }
}

/// Implemented by `#[derive(GraphEnum)]` for fieldless enums.
pub trait EnumType: Sized + 'static {
    /// The static class description.
    fn enum_class() -> &'static EnumClass;
    /// Ordinal of `self`.
    fn ordinal(&self) -> usize;
    /// Inverse of [`EnumType::ordinal`].
    fn from_ordinal(ordinal: usize) -> Option<Self>;

    /// Converts `self` into an enum constant value.
    fn to_enum_value(&self) -> EnumValue {
        EnumValue {
            class: Self::enum_class(),
            ordinal: self.ordinal(),
        }
    }
}

// --- Values ---

/// A value flowing through the codec.
#[derive(Clone, Default)]
pub enum Value {
    /// The null reference (object id 0).
    #[default]
    Null,
    /// `bool`
    Bool(bool),
    /// `i8`
    Byte(i8),
    /// `char`
    Char(char),
    /// `i16`
    Short(i16),
    /// `i32`
    Int(i32),
    /// `i64`
    Long(i64),
    /// `f32`
    Float(f32),
    /// `f64`
    Double(f64),
    /// An immutable string.
    Str(Arc<str>),
    /// A reference to a class, by fully-qualified name.
    Class(Arc<str>),
    /// An enum constant.
    Enum(EnumValue),
    /// A primitive array.
    Array(Arc<PrimitiveArray>),
    /// A typed numeric buffer.
    Buffer(Arc<NumericBuffer>),
    /// An opaque file path.
    Path(Arc<PathBuf>),
    /// A self-encoding user value.
    Custom(Arc<dyn Encodable>),
    /// An identity-bearing heap object.
    Object(Obj),
}

impl Value {
    /// Creates a string value.
    pub fn str(value: impl AsRef<str>) -> Self {
        Self::Str(Arc::from(value.as_ref()))
    }

    /// Returns true for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the object handle, if this is an object.
    pub fn as_obj(&self) -> Option<&Obj> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Returns the string contents, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer, if this is an `Int`.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the integer, if this is a `Long`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the flag, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// A short description of the value's shape, used in error messages.
    pub fn type_name(&self) -> String {
        match self {
            Self::Null => "null".into(),
            Self::Object(obj) => obj.class_name(),
            other => class::runtime_class_name(other).unwrap_or_else(|| "?".into()),
        }
    }

    /// Structural equality: bitwise for floating point, by content for leaves, and deep
    /// (cycle-safe) for objects. Shared and cyclic structure is compared as reachable shape.
    pub fn deep_eq(&self, other: &Value) -> bool {
        let mut seen = HashSet::new();
        eq_with(self, other, &mut seen)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.deep_eq(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Bool(v) => write!(f, "Bool({v})"),
            Self::Byte(v) => write!(f, "Byte({v})"),
            Self::Char(v) => write!(f, "Char({v:?})"),
            Self::Short(v) => write!(f, "Short({v})"),
            Self::Int(v) => write!(f, "Int({v})"),
            Self::Long(v) => write!(f, "Long({v})"),
            Self::Float(v) => write!(f, "Float({v})"),
            Self::Double(v) => write!(f, "Double({v})"),
            Self::Str(v) => write!(f, "Str({v:?})"),
            Self::Class(v) => write!(f, "Class({v})"),
            Self::Enum(v) => write!(f, "Enum({v:?})"),
            Self::Array(v) => write!(f, "Array({v:?})"),
            Self::Buffer(v) => write!(f, "Buffer({v:?})"),
            Self::Path(v) => write!(f, "Path({v:?})"),
            Self::Custom(v) => write!(f, "Custom({v:?})"),
            Self::Object(v) => write!(f, "{v:?}"),
        }
    }
}

macro_rules! value_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(value: $t) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

value_from!(
    bool => Bool,
    i8 => Byte,
    char => Char,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    EnumValue => Enum,
    Obj => Object,
);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(Arc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(Arc::from(value))
    }
}

impl From<PrimitiveArray> for Value {
    fn from(value: PrimitiveArray) -> Self {
        Self::Array(Arc::new(value))
    }
}

impl From<PathBuf> for Value {
    fn from(value: PathBuf) -> Self {
        Self::Path(Arc::new(value))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

// --- Objects ---

/// An object array with a declared component class.
#[derive(Debug, Clone)]
pub struct ObjectArray {
    /// Class name of the component type (`"any"` for untyped arrays).
    pub component: Arc<str>,
    /// The elements.
    pub items: Vec<Value>,
}

/// A sequence collection (list, set, sorted set or a registered custom sequence class).
#[derive(Debug, Clone)]
pub struct Collection {
    /// Class name; see [`crate::class::LIST`] and friends.
    pub class: Arc<str>,
    /// The elements, in encounter order.
    pub items: Vec<Value>,
}

/// A multiset: elements with multiplicities.
#[derive(Debug, Clone)]
pub struct Multiset {
    /// Class name; normally [`crate::class::MULTISET`].
    pub class: Arc<str>,
    /// Element and count pairs.
    pub entries: Vec<(Value, u64)>,
}

/// A set of constants of one enum type.
#[derive(Debug, Clone)]
pub struct EnumSet {
    /// The element enum, announced even when the set is empty.
    pub element: &'static EnumClass,
    /// The members, as [`Value::Enum`] values.
    pub items: Vec<Value>,
}

/// A map (or multimap, which the codec refuses to encode).
#[derive(Debug, Clone)]
pub struct MapObject {
    /// Class name; see [`crate::class::MAP`] and friends.
    pub class: Arc<str>,
    /// Key and value pairs, in encounter order.
    pub entries: Vec<(Value, Value)>,
}

/// The heap node behind an [`Obj`] handle.
#[derive(Debug)]
pub enum Object {
    /// A record walked field by field.
    Record(Box<dyn Record>),
    /// An object array.
    Array(ObjectArray),
    /// A sequence collection.
    Collection(Collection),
    /// A multiset.
    Multiset(Multiset),
    /// An enum set.
    EnumSet(EnumSet),
    /// A map.
    Map(MapObject),
}

impl Object {
    /// The runtime class name of the object.
    pub fn class_name(&self) -> String {
        match self {
            Self::Record(r) => r.record_class().name.to_string(),
            Self::Array(a) => format!("[{}", a.component),
            Self::Collection(c) => c.class.to_string(),
            Self::Multiset(m) => m.class.to_string(),
            Self::EnumSet(_) => class::ENUM_SET.to_string(),
            Self::Map(m) => m.class.to_string(),
        }
    }
}

/// A shared handle to a heap [`Object`]. Cloning the handle does not clone the object.
#[derive(Clone)]
pub struct Obj(Arc<RwLock<Object>>);

impl Obj {
    /// Wraps an object in a new handle with a fresh identity.
    pub fn new(object: Object) -> Self {
        Self(Arc::new(RwLock::new(object)))
    }

    /// Wraps a record.
    pub fn record<T: Record>(record: T) -> Self {
        Self::new(Object::Record(Box::new(record)))
    }

    /// Creates an object array.
    pub fn array(component: &str, items: Vec<Value>) -> Self {
        Self::new(Object::Array(ObjectArray {
            component: Arc::from(component),
            items,
        }))
    }

    /// Creates a sequence collection of the given class.
    pub fn collection(class: &str, items: Vec<Value>) -> Self {
        Self::new(Object::Collection(Collection {
            class: Arc::from(class),
            items,
        }))
    }

    /// Creates a list.
    pub fn list(items: Vec<Value>) -> Self {
        Self::collection(class::LIST, items)
    }

    /// Creates a multiset.
    pub fn multiset(entries: Vec<(Value, u64)>) -> Self {
        Self::new(Object::Multiset(Multiset {
            class: Arc::from(class::MULTISET),
            entries,
        }))
    }

    /// Creates an enum set.
    pub fn enum_set(element: &'static EnumClass, items: Vec<Value>) -> Self {
        Self::new(Object::EnumSet(EnumSet { element, items }))
    }

    /// Creates a map of the given class.
    pub fn map_of(class: &str, entries: Vec<(Value, Value)>) -> Self {
        Self::new(Object::Map(MapObject {
            class: Arc::from(class),
            entries,
        }))
    }

    /// Creates a map.
    pub fn map(entries: Vec<(Value, Value)>) -> Self {
        Self::map_of(class::MAP, entries)
    }

    /// Locks the object for reading. Re-entrant on the current thread.
    pub fn read(&self) -> RwLockReadGuard<'_, Object> {
        self.0.read_recursive()
    }

    /// Locks the object for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, Object> {
        self.0.write()
    }

    /// Borrows the record behind this handle as `T`, if it is one.
    pub fn get<T: Record>(&self) -> Option<MappedRwLockReadGuard<'_, T>> {
        RwLockReadGuard::try_map(self.read(), |object| match object {
            Object::Record(r) => r.as_any().downcast_ref::<T>(),
            _ => None,
        })
        .ok()
    }

    /// Mutably borrows the record behind this handle as `T`, if it is one.
    pub fn get_mut<T: Record>(&self) -> Option<MappedRwLockWriteGuard<'_, T>> {
        RwLockWriteGuard::try_map(self.write(), |object| match object {
            Object::Record(r) => r.as_any_mut().downcast_mut::<T>(),
            _ => None,
        })
        .ok()
    }

    /// Returns true if both handles point to the same object.
    pub fn ptr_eq(&self, other: &Obj) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// A stable identity key for the lifetime of the object.
    pub fn address(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// The runtime class name of the object.
    pub fn class_name(&self) -> String {
        self.read().class_name()
    }
}

impl fmt::Debug for Obj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never recurse into contents: graphs may be cyclic.
        match self.0.try_read_recursive() {
            Some(object) => write!(f, "Obj({}@{:#x})", object.class_name(), self.address()),
            None => write!(f, "Obj(<locked>@{:#x})", self.address()),
        }
    }
}

// --- Structural equality ---

fn eq_with(a: &Value, b: &Value, seen: &mut HashSet<(usize, usize)>) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Byte(x), Value::Byte(y)) => x == y,
        (Value::Char(x), Value::Char(y)) => x == y,
        (Value::Short(x), Value::Short(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Long(x), Value::Long(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
        (Value::Double(x), Value::Double(y)) => x.to_bits() == y.to_bits(),
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Class(x), Value::Class(y)) => x == y,
        (Value::Enum(x), Value::Enum(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => x.bit_eq(y),
        (Value::Buffer(x), Value::Buffer(y)) => {
            x.position == y.position && x.elements.bit_eq(&y.elements)
        }
        (Value::Path(x), Value::Path(y)) => x == y,
        (Value::Custom(x), Value::Custom(y)) => x.content_eq(y.as_ref()),
        (Value::Object(x), Value::Object(y)) => {
            if x.ptr_eq(y) {
                return true;
            }
            // A pair already under comparison is assumed equal; any difference is found on
            // the path that first reached it.
            if !seen.insert((x.address(), y.address())) {
                return true;
            }
            let (left, right) = (x.read(), y.read());
            objects_eq(&left, &right, seen)
        }
        _ => false,
    }
}

fn all_eq<'a>(
    a: impl ExactSizeIterator<Item = &'a Value>,
    b: impl ExactSizeIterator<Item = &'a Value>,
    seen: &mut HashSet<(usize, usize)>,
) -> bool {
    a.len() == b.len() && a.zip(b).all(|(x, y)| eq_with(x, y, seen))
}

fn objects_eq(a: &Object, b: &Object, seen: &mut HashSet<(usize, usize)>) -> bool {
    match (a, b) {
        (Object::Record(x), Object::Record(y)) => {
            let class = x.record_class();
            if class.name != y.record_class().name {
                return false;
            }
            if !eq_with(&x.owner(), &y.owner(), seen) {
                return false;
            }
            (0..class.field_count).all(|i| match (x.get_field(i), y.get_field(i)) {
                (Ok(l), Ok(r)) => eq_with(&l, &r, seen),
                _ => false,
            })
        }
        (Object::Array(x), Object::Array(y)) => {
            x.component == y.component && all_eq(x.items.iter(), y.items.iter(), seen)
        }
        (Object::Collection(x), Object::Collection(y)) => {
            x.class == y.class && all_eq(x.items.iter(), y.items.iter(), seen)
        }
        (Object::Multiset(x), Object::Multiset(y)) => {
            x.class == y.class
                && x.entries.len() == y.entries.len()
                && x.entries
                    .iter()
                    .zip(&y.entries)
                    .all(|((l, lc), (r, rc))| lc == rc && eq_with(l, r, seen))
        }
        (Object::EnumSet(x), Object::EnumSet(y)) => {
            x.element.name == y.element.name && all_eq(x.items.iter(), y.items.iter(), seen)
        }
        (Object::Map(x), Object::Map(y)) => {
            x.class == y.class
                && x.entries.len() == y.entries.len()
                && x.entries
                    .iter()
                    .zip(&y.entries)
                    .all(|((lk, lv), (rk, rv))| eq_with(lk, rk, seen) && eq_with(lv, rv, seen))
        }
        _ => false,
    }
}
