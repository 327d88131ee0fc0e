//! The object graph reader.
//!
//! Driven entirely by the stream: every new object id is checked against the next expected id,
//! every announced class is resolved through the class registry, and every record is
//! constructed and registered *before* its fields are read, so that back-references from
//! inside the record resolve to the instance under construction.
//!
//! Fields absent from the stream keep the values of the freshly constructed instance. Fields
//! present in the stream but unknown locally (different name or declared class) are read and
//! discarded.
//!
//! Lengths and nesting depth are trusted from the stream but bounded by [`ReadOptions`].

use crate::class::{ClassEntry, ClassKind, CollectionKind, classes};
use crate::dictionary::{ClassTable, FieldTable, ObjectTable, ReadField, expect_next};
use crate::error::{GraphError, Result};
use crate::format::{self, ClassFlags, read_array};
use crate::record::{self, ObjectInput, Record, RecordClass};
use crate::streamer::STR;
use crate::value::{Collection, EnumSet, MapObject, Multiset, Obj, Object, ObjectArray, Value};
use crate::varint;
use log::{debug, trace};
use std::io::Read;
use std::sync::Arc;

/// Default bound on array, collection and field-table lengths.
pub const DEFAULT_MAX_LENGTH: usize = 16 * 1024 * 1024;

/// Default bound on object nesting depth.
pub const DEFAULT_MAX_DEPTH: usize = 4096;

/// Upper bound on speculative preallocation for lengths read from a stream.
const PREALLOC_LIMIT: usize = 4096;

/// Limits applied while decoding untrusted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// Largest accepted element or field count.
    pub max_length: usize,
    /// Deepest accepted nesting of new objects.
    pub max_depth: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Reads object graphs from a byte source.
#[derive(Debug)]
pub struct GraphReader<R: Read> {
    source: R,
    options: ReadOptions,
    objects: ObjectTable,
    classes: ClassTable,
    fields: FieldTable,
    depth: usize,
}

impl<R: Read> GraphReader<R> {
    /// Starts a session over `source` with default limits. No header is expected.
    pub fn new(source: R) -> Result<Self> {
        Self::with_options(source, ReadOptions::default())
    }

    /// Starts a session over `source`.
    pub fn with_options(source: R, options: ReadOptions) -> Result<Self> {
        Ok(Self {
            source,
            options,
            objects: ObjectTable::default(),
            classes: ClassTable::new()?,
            fields: FieldTable::default(),
            depth: 0,
        })
    }

    /// Reads the next root value, or `None` at a clean end of the stream.
    pub fn read_object(&mut self) -> Result<Option<Value>> {
        let any = classes().any();
        let Some(id) = varint::read_u64(&mut self.source)? else {
            return Ok(None);
        };
        self.read_with_id(id, &any).map(Some)
    }

    /// Reads a value held by a slot declared with `declared`.
    pub fn read_value(&mut self, declared: &Arc<ClassEntry>) -> Result<Value> {
        if let ClassKind::Leaf(streamer) = &declared.kind
            && streamer.primitive().is_some()
        {
            return streamer.read_bounded(&mut self.source, self.options.max_length);
        }
        let id = varint::read_required(&mut self.source)?;
        self.read_with_id(id, declared)
    }

    fn read_with_id(&mut self, id: u64, declared: &Arc<ClassEntry>) -> Result<Value> {
        if id == 0 {
            return Ok(Value::Null);
        }
        if let Some(value) = self.objects.get(id) {
            return Ok(value.clone());
        }
        expect_next("object", id, self.objects.next_id())?;
        if self.depth >= self.options.max_depth {
            return Err(GraphError::corrupt(format!(
                "objects nested deeper than {}",
                self.options.max_depth
            )));
        }
        self.depth += 1;
        let result = self.read_new(declared);
        self.depth -= 1;
        result
    }

    fn read_new(&mut self, declared: &Arc<ClassEntry>) -> Result<Value> {
        let class = if declared.is_final() {
            declared.clone()
        } else {
            self.read_class()?
        };
        match &class.kind {
            ClassKind::Leaf(streamer) => {
                let value = streamer.read_bounded(&mut self.source, self.options.max_length)?;
                self.objects.push(value.clone());
                Ok(value)
            }
            ClassKind::Record(record_class) => self.read_record(*record_class, class.flags),
            ClassKind::Array(component) => self.read_array(component),
            ClassKind::Collection(kind) => self.read_collection(*kind, &class.name),
            ClassKind::Any => Err(GraphError::corrupt(
                "the untyped class cannot be instantiated",
            )),
        }
    }

    fn read_class(&mut self) -> Result<Arc<ClassEntry>> {
        let id = varint::read_required(&mut self.source)?;
        if let Some(entry) = self.classes.get(id) {
            return Ok(entry.clone());
        }
        expect_next("class", id, self.classes.next_id())?;
        let name = format::read_utf(&mut self.source)?;
        let flags = ClassFlags::from_byte(read_array::<1, _>(&mut self.source)?[0])?;
        trace!("class #{id} announced: '{name}' {flags:?}");
        let entry = classes().resolve_announced(&name, flags)?;
        self.classes.push(entry.clone());
        Ok(entry)
    }

    fn read_len(&mut self) -> Result<usize> {
        let len = varint::read_required(&mut self.source)?;
        match usize::try_from(len) {
            Ok(len) if len <= self.options.max_length => Ok(len),
            _ => Err(GraphError::corrupt(format!(
                "length {len} exceeds the limit of {}",
                self.options.max_length
            ))),
        }
    }

    /// Registers a new node, so that its own contents can refer back to it.
    fn register(&mut self, object: Object) -> Obj {
        let obj = Obj::new(object);
        self.objects.push(Value::Object(obj.clone()));
        obj
    }

    fn read_record(&mut self, class: &'static RecordClass, flags: ClassFlags) -> Result<Value> {
        let layout = record::layout(class)?;
        let obj = self.register(Object::Record(record::construct(class)?));

        if flags.contains(ClassFlags::INNER) {
            let owner = self
                .read_value(&classes().any())
                .map_err(|e| e.in_field(class.name, "<owner>"))?;
            with_record(&obj, |r| r.set_owner(owner))
                .map_err(|e| e.in_field(class.name, "<owner>"))?;
        }

        if class.custom {
            self.read_custom(&obj, class)?;
            return Ok(Value::Object(obj));
        }

        let str_class = classes().resolve(STR)?;
        let count = self.read_len()?;
        for _ in 0..count {
            let field_id = varint::read_required(&mut self.source)?;
            let field = match self.fields.get(class.name, field_id) {
                Some(field) => field.clone(),
                None => {
                    expect_next("field", field_id, self.fields.next_id(class.name))?;
                    let name = match self.read_value(&str_class)? {
                        Value::Str(name) => name,
                        other => {
                            return Err(GraphError::corrupt(format!(
                                "field name of '{}' is a {}",
                                class.name,
                                other.type_name()
                            )));
                        }
                    };
                    let declared = self.read_class()?;
                    let slot = layout.find(&name, &declared.name).map(|slot| slot.index);
                    if slot.is_none() {
                        debug!(
                            "'{}' has no field '{}' of class '{}'; its values are skipped",
                            class.name, name, declared.name
                        );
                    }
                    let field = ReadField {
                        name,
                        declared,
                        slot,
                    };
                    self.fields.push(class.name, field.clone());
                    field
                }
            };
            let value = self
                .read_value(&field.declared)
                .map_err(|e| e.in_field(class.name, &field.name))?;
            if let Some(index) = field.slot {
                with_record(&obj, |r| r.set_field(index, value))
                    .map_err(|e| e.in_field(class.name, &field.name))?;
            }
        }
        Ok(Value::Object(obj))
    }

    /// Runs the record's custom hook on an instance taken out of `obj`, so that no lock is held
    /// while the hook reads nested values.
    fn read_custom(&mut self, obj: &Obj, class: &'static RecordClass) -> Result<()> {
        let placeholder = Object::Record(record::construct(class)?);
        let Object::Record(mut record) = std::mem::replace(&mut *obj.write(), placeholder) else {
            return Err(GraphError::Internal(format!("{} is not a record", class.name)));
        };
        let result = record.read_custom(self).unwrap_or(Ok(()));
        *obj.write() = Object::Record(record);
        result.map_err(|e| e.in_field(class.name, "<custom>"))
    }

    fn read_array(&mut self, component: &Arc<ClassEntry>) -> Result<Value> {
        let obj = self.register(Object::Array(ObjectArray {
            component: component.name.clone(),
            items: Vec::new(),
        }));
        let items = self.read_items(component)?;
        if let Object::Array(array) = &mut *obj.write() {
            array.items = items;
        }
        Ok(Value::Object(obj))
    }

    fn read_items(&mut self, declared: &Arc<ClassEntry>) -> Result<Vec<Value>> {
        let len = self.read_len()?;
        let mut items = Vec::with_capacity(len.min(PREALLOC_LIMIT));
        for _ in 0..len {
            items.push(self.read_value(declared)?);
        }
        Ok(items)
    }

    fn read_collection(&mut self, kind: CollectionKind, name: &Arc<str>) -> Result<Value> {
        let any = classes().any();
        let class = name.clone();
        match kind {
            CollectionKind::Sequence => {
                let obj = self.register(Object::Collection(Collection {
                    class,
                    items: Vec::new(),
                }));
                let items = self.read_items(&any)?;
                if let Object::Collection(c) = &mut *obj.write() {
                    c.items = items;
                }
                Ok(Value::Object(obj))
            }
            CollectionKind::Multiset => {
                let obj = self.register(Object::Multiset(Multiset {
                    class,
                    entries: Vec::new(),
                }));
                let len = self.read_len()?;
                let mut entries = Vec::with_capacity(len.min(PREALLOC_LIMIT));
                for _ in 0..len {
                    let item = self.read_value(&any)?;
                    entries.push((item, varint::read_required(&mut self.source)?));
                }
                if let Object::Multiset(m) = &mut *obj.write() {
                    m.entries = entries;
                }
                Ok(Value::Object(obj))
            }
            CollectionKind::EnumSet => {
                let element_class = self.read_class()?;
                let element = match &element_class.kind {
                    ClassKind::Leaf(streamer) => streamer.enum_class(),
                    _ => None,
                }
                .ok_or_else(|| {
                    GraphError::corrupt(format!(
                        "enum set element class '{}' is not an enum",
                        element_class.name
                    ))
                })?;
                let obj = self.register(Object::EnumSet(EnumSet {
                    element,
                    items: Vec::new(),
                }));
                let items = self.read_items(&element_class)?;
                if let Object::EnumSet(set) = &mut *obj.write() {
                    set.items = items;
                }
                Ok(Value::Object(obj))
            }
            CollectionKind::Map => {
                let obj = self.register(Object::Map(MapObject {
                    class,
                    entries: Vec::new(),
                }));
                let len = self.read_len()?;
                let mut entries = Vec::with_capacity(len.min(PREALLOC_LIMIT));
                for _ in 0..len {
                    let key = self.read_value(&any)?;
                    let value = self.read_value(&any)?;
                    entries.push((key, value));
                }
                if let Object::Map(m) = &mut *obj.write() {
                    m.entries = entries;
                }
                Ok(Value::Object(obj))
            }
            CollectionKind::Multimap => Err(GraphError::unsupported(
                &**name,
                "multimaps have no encoding",
            )),
        }
    }

    /// Classes announced so far, built-ins first, in id order.
    pub fn classes(&self) -> &[Arc<ClassEntry>] {
        self.classes.entries()
    }

    /// The field dictionary read so far for a record class.
    pub fn field_dictionary(&self, class: &str) -> &[ReadField] {
        self.fields.fields(class)
    }

    /// Number of identity ids read so far.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// The limits in force.
    pub fn options(&self) -> ReadOptions {
        self.options
    }

    /// Ends the session and returns the source.
    pub fn into_inner(self) -> R {
        self.source
    }
}

fn with_record<T>(obj: &Obj, apply: impl FnOnce(&mut dyn Record) -> Result<T>) -> Result<T> {
    match &mut *obj.write() {
        Object::Record(record) => apply(record.as_mut()),
        other => Err(GraphError::Internal(format!(
            "{} is not a record",
            other.class_name()
        ))),
    }
}

impl<R: Read> ObjectInput for GraphReader<R> {
    fn read_value(&mut self, declared: &str) -> Result<Value> {
        let declared = classes().resolve(declared)?;
        GraphReader::read_value(self, &declared)
    }

    fn read_varint(&mut self) -> Result<u64> {
        varint::read_required(&mut self.source)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.source.read_exact(buf)?;
        Ok(())
    }
}
