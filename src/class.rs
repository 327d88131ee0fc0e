//! The process-wide class registry.
//!
//! Maps fully-qualified class names to a [`ClassEntry`]: the flag byte sent in announcements and
//! the [`ClassKind`] that selects how bodies are encoded. Leaf classes come from the streamer
//! registry; records, enums and encodables are registered on demand when the writer first sees
//! one of their values, or up front with [`register_record`] (required before reading a stream
//! in a process that has not written that class yet).
//!
//! The first [`BUILTIN_CLASSES`] entries seed every session's class dictionary with ids
//! `0..BUILTIN_CLASSES.len()`. That order is part of the format and only ever grows at the end.

use crate::error::{GraphError, Result};
use crate::format::ClassFlags;
use crate::hash::{FastMap, fast_map};
use crate::record::{RecordClass, RecordType};
use crate::streamer::{self, CLASS_REF, STR, Streamer};
use crate::value::{Object, Primitive, Value};
use log::debug;
use parking_lot::RwLock;
use std::sync::{Arc, LazyLock};

/// The untyped declared class: values in such slots always carry an announcement.
pub const ANY: &str = "any";
/// Insertion-ordered list.
pub const LIST: &str = "list";
/// Unordered set.
pub const SET: &str = "set";
/// Sorted set.
pub const SORTED_SET: &str = "sorted_set";
/// Multiset (element plus count).
pub const MULTISET: &str = "multiset";
/// Set of enum constants.
pub const ENUM_SET: &str = "enum_set";
/// Unordered map.
pub const MAP: &str = "map";
/// Sorted map.
pub const SORTED_MAP: &str = "sorted_map";
/// Multimap. Registered so it can be recognized and refused.
pub const MULTIMAP: &str = "multimap";

/// Classes with fixed ids in every session, in id order. Append-only.
pub const BUILTIN_CLASSES: [&str; 11] = [
    ANY,
    Primitive::Bool.class_name(),
    Primitive::Byte.class_name(),
    Primitive::Char.class_name(),
    Primitive::Short.class_name(),
    Primitive::Int.class_name(),
    Primitive::Long.class_name(),
    Primitive::Float.class_name(),
    Primitive::Double.class_name(),
    STR,
    CLASS_REF,
];

/// How the entries of a collection class are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    /// `size element*`
    Sequence,
    /// `size (element count)*`
    Multiset,
    /// `element-class size element*`
    EnumSet,
    /// `size (key value)*`
    Map,
    /// Not encodable.
    Multimap,
}

impl CollectionKind {
    /// The announcement flags of a collection class of this kind.
    pub const fn flags(self) -> ClassFlags {
        match self {
            Self::Sequence | Self::EnumSet => ClassFlags::COLLECTION,
            Self::Multiset => ClassFlags::COLLECTION.with(ClassFlags::MULTI),
            Self::Map => ClassFlags::MAP,
            Self::Multimap => ClassFlags::MAP.with(ClassFlags::MULTI),
        }
    }

    /// The generic layout implied by announcement flags, for classes unknown to this process.
    pub fn from_flags(flags: ClassFlags) -> Option<Self> {
        let multi = flags.contains(ClassFlags::MULTI);
        if flags.contains(ClassFlags::MAP) {
            Some(if multi { Self::Multimap } else { Self::Map })
        } else if flags.contains(ClassFlags::COLLECTION) {
            Some(if multi { Self::Multiset } else { Self::Sequence })
        } else {
            None
        }
    }
}

/// How values of a class are encoded.
#[derive(Debug, Clone)]
pub enum ClassKind {
    /// The untyped root class; never the runtime class of a value.
    Any,
    /// Encoded by a leaf streamer.
    Leaf(Arc<dyn Streamer>),
    /// Walked field by field.
    Record(&'static RecordClass),
    /// An object array of the given component class.
    Array(Arc<ClassEntry>),
    /// A collection or map.
    Collection(CollectionKind),
}

/// A registered class.
#[derive(Debug, Clone)]
pub struct ClassEntry {
    /// Fully-qualified name.
    pub name: Arc<str>,
    /// Flag byte for announcements.
    pub flags: ClassFlags,
    /// Body encoding.
    pub kind: ClassKind,
}

impl ClassEntry {
    fn new(name: &str, flags: ClassFlags, kind: ClassKind) -> Self {
        Self {
            name: Arc::from(name),
            flags,
            kind,
        }
    }

    fn leaf(streamer: Arc<dyn Streamer>) -> Self {
        let name = streamer.class_name().to_string();
        Self::new(&name, ClassFlags::FINAL, ClassKind::Leaf(streamer))
    }

    /// The primitive type, if this is one of the eight primitive classes.
    pub fn primitive(&self) -> Option<Primitive> {
        match &self.kind {
            ClassKind::Leaf(streamer) => streamer.primitive(),
            _ => None,
        }
    }

    /// Values declared with this class omit their announcement.
    pub fn is_final(&self) -> bool {
        self.flags.is_final()
    }
}

/// Process-wide map from class name to [`ClassEntry`].
#[derive(Debug)]
pub struct ClassRegistry {
    classes: RwLock<FastMap<Arc<str>, Arc<ClassEntry>>>,
    any: Arc<ClassEntry>,
}

static CLASSES: LazyLock<ClassRegistry> = LazyLock::new(ClassRegistry::with_builtins);

/// The process-wide class registry.
pub fn classes() -> &'static ClassRegistry {
    &CLASSES
}

impl ClassRegistry {
    fn with_builtins() -> Self {
        let any = Arc::new(ClassEntry::new(ANY, ClassFlags::NONE, ClassKind::Any));
        let mut map: FastMap<Arc<str>, Arc<ClassEntry>> = fast_map();
        map.insert(any.name.clone(), any.clone());
        for (name, kind) in [
            (LIST, CollectionKind::Sequence),
            (SET, CollectionKind::Sequence),
            (SORTED_SET, CollectionKind::Sequence),
            (MULTISET, CollectionKind::Multiset),
            (ENUM_SET, CollectionKind::EnumSet),
            (MAP, CollectionKind::Map),
            (SORTED_MAP, CollectionKind::Map),
            (MULTIMAP, CollectionKind::Multimap),
        ] {
            let entry = ClassEntry::new(name, kind.flags(), ClassKind::Collection(kind));
            map.insert(entry.name.clone(), Arc::new(entry));
        }
        Self {
            classes: RwLock::new(map),
            any,
        }
    }

    /// The entry of the untyped class [`ANY`].
    pub fn any(&self) -> Arc<ClassEntry> {
        self.any.clone()
    }

    fn insert(&self, entry: ClassEntry) -> Arc<ClassEntry> {
        let mut map = self.classes.write();
        map.entry(entry.name.clone())
            .or_insert_with(|| {
                debug!("registered class '{}' {:?}", entry.name, entry.flags);
                Arc::new(entry)
            })
            .clone()
    }

    /// Finds a registered class or a leaf streamer class by exact name.
    pub fn lookup(&self, name: &str) -> Option<Arc<ClassEntry>> {
        if let Some(entry) = self.classes.read().get(name) {
            return Some(entry.clone());
        }
        let streamer = streamer::streamers().get(name)?;
        Some(self.insert(ClassEntry::leaf(streamer)))
    }

    /// Resolves a class name, deriving object-array classes from their component.
    pub fn resolve(&self, name: &str) -> Result<Arc<ClassEntry>> {
        if let Some(entry) = self.lookup(name) {
            return Ok(entry);
        }
        match name.strip_prefix('[') {
            Some(component) if !component.is_empty() => {
                let component = self.resolve(component)?;
                Ok(self.insert(ClassEntry::new(
                    name,
                    component.flags,
                    ClassKind::Array(component),
                )))
            }
            _ => Err(GraphError::ClassResolution {
                name: name.to_string(),
            }),
        }
    }

    /// Resolves a class announced in a stream.
    ///
    /// The stream's flags win over local ones, so that elision decisions match the writer's.
    /// Unknown collection and map classes decode generically from their flags.
    pub fn resolve_announced(&self, name: &str, flags: ClassFlags) -> Result<Arc<ClassEntry>> {
        let entry = match self.lookup(name) {
            Some(entry) => entry,
            None => match name.strip_prefix('[') {
                Some(component) if !component.is_empty() => {
                    let component = self.resolve_announced(component, flags)?;
                    Arc::new(ClassEntry::new(name, flags, ClassKind::Array(component)))
                }
                _ => match CollectionKind::from_flags(flags) {
                    Some(kind) => {
                        debug!("decoding unknown class '{name}' as a generic {kind:?}");
                        Arc::new(ClassEntry::new(name, flags, ClassKind::Collection(kind)))
                    }
                    None => {
                        return Err(GraphError::ClassResolution {
                            name: name.to_string(),
                        });
                    }
                },
            },
        };
        if entry.flags == flags {
            return Ok(entry);
        }
        debug!(
            "class '{name}' announced with {flags:?}, registered with {:?}",
            entry.flags
        );
        Ok(Arc::new(ClassEntry {
            flags,
            ..(*entry).clone()
        }))
    }

    /// Registers a record class.
    pub fn register_record(&self, class: &'static RecordClass) -> Result<Arc<ClassEntry>> {
        let known = self.classes.read().get(class.name).cloned();
        if let Some(existing) = known {
            return match existing.kind {
                ClassKind::Record(known) if std::ptr::eq(known, class) => Ok(existing.clone()),
                _ => Err(GraphError::unsupported(
                    class.name,
                    "class name already registered for a different type",
                )),
            };
        }
        let entry = self.insert(ClassEntry::new(
            class.name,
            class.flags,
            ClassKind::Record(class),
        ));
        match entry.kind {
            ClassKind::Record(known) if std::ptr::eq(known, class) => Ok(entry),
            _ => Err(GraphError::unsupported(
                class.name,
                "class name already registered for a different type",
            )),
        }
    }

    /// Registers a collection class with the given layout.
    pub fn register_collection(&self, name: &str, kind: CollectionKind) -> Result<Arc<ClassEntry>> {
        let entry = match self.lookup(name) {
            Some(entry) => entry,
            None => self.insert(ClassEntry::new(
                name,
                kind.flags(),
                ClassKind::Collection(kind),
            )),
        };
        match entry.kind {
            ClassKind::Collection(known) if known == kind => Ok(entry),
            _ => Err(GraphError::unsupported(
                name,
                format!("already registered as {:?}", entry.kind),
            )),
        }
    }

    fn collection_class(&self, name: &str, accepted: &[CollectionKind]) -> Result<Arc<ClassEntry>> {
        let entry = match self.lookup(name) {
            Some(entry) => entry,
            None => self.register_collection(name, accepted[0])?,
        };
        match entry.kind {
            ClassKind::Collection(kind) if accepted.contains(&kind) => Ok(entry),
            _ => Err(GraphError::unsupported(
                name,
                format!("class is not a collection of kind {accepted:?}"),
            )),
        }
    }

    /// The runtime class of a non-null value, registering it on first use.
    pub fn runtime_class(&self, value: &Value) -> Result<Arc<ClassEntry>> {
        let object = match value {
            Value::Null => {
                return Err(GraphError::Internal("null has no runtime class".into()));
            }
            Value::Object(object) => object,
            leaf => {
                let streamer = streamer::streamer_for(leaf).ok_or_else(|| {
                    GraphError::Internal(format!("no streamer for {}", leaf.type_name()))
                })?;
                let known = self.classes.read().get(streamer.class_name()).cloned();
                return Ok(known.unwrap_or_else(|| self.insert(ClassEntry::leaf(streamer))));
            }
        };
        let guard = object.read();
        match &*guard {
            Object::Record(record) => self.register_record(record.record_class()),
            Object::Array(array) => self.resolve(&format!("[{}", array.component)),
            Object::Collection(c) => self.collection_class(&c.class, &[CollectionKind::Sequence]),
            Object::Multiset(m) => self.collection_class(&m.class, &[CollectionKind::Multiset]),
            Object::EnumSet(set) => {
                streamer::register_enum_class(set.element);
                self.collection_class(ENUM_SET, &[CollectionKind::EnumSet])
            }
            Object::Map(m) => self.collection_class(
                &m.class,
                &[CollectionKind::Map, CollectionKind::Multimap],
            ),
        }
    }
}

/// Registers a `#[derive(GraphRecord)]` type so that streams containing it can be read.
pub fn register_record<T: RecordType>() -> Result<()> {
    classes().register_record(T::class())?;
    Ok(())
}

/// Registers a custom collection or map class.
pub fn register_collection(name: &str, kind: CollectionKind) -> Result<()> {
    classes().register_collection(name, kind)?;
    Ok(())
}

/// The runtime class name of a value, or `None` for null.
pub fn runtime_class_name(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Object(object) => Some(object.class_name()),
        leaf => streamer::streamer_for(leaf).map(|s| s.class_name().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_classes_resolve() {
        for name in BUILTIN_CLASSES {
            let entry = classes().resolve(name).expect("builtin");
            assert_eq!(&*entry.name, name);
        }
        assert!(!classes().any().is_final());
        assert!(classes().resolve("i32").expect("i32").is_final());
    }

    #[test]
    fn arrays_inherit_component_flags() {
        let entry = classes().resolve("[[list").expect("nested array");
        assert_eq!(entry.flags, ClassFlags::COLLECTION);
        assert!(matches!(entry.kind, ClassKind::Array(_)));
        assert!(classes().resolve("[i32").expect("leaf").primitive().is_none());
    }

    #[test]
    fn unknown_collections_decode_generically() {
        let flags = ClassFlags::COLLECTION.with(ClassFlags::MULTI);
        let entry = classes()
            .resolve_announced("elsewhere.Bag", flags)
            .expect("generic");
        assert!(matches!(
            entry.kind,
            ClassKind::Collection(CollectionKind::Multiset)
        ));
        assert!(classes().resolve("elsewhere.Bag").is_err());
    }

    #[test]
    fn unknown_plain_class_fails() {
        let err = classes()
            .resolve_announced("elsewhere.Widget", ClassFlags::NONE)
            .expect_err("unknown");
        assert!(matches!(err, GraphError::ClassResolution { .. }));
    }

    #[test]
    fn collection_kind_conflicts_are_rejected() {
        assert!(register_collection("test.Queue", CollectionKind::Sequence).is_ok());
        assert!(register_collection("test.Queue", CollectionKind::Sequence).is_ok());
        assert!(register_collection("test.Queue", CollectionKind::Map).is_err());
    }
}
