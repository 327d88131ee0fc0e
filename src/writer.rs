//! The object graph writer.
//!
//! One [`GraphWriter`] is one session: it owns the identity table and the class and field
//! dictionaries, and is not meant to be shared between threads. Independent graphs are encoded
//! in parallel with independent writers (see [`crate::GraphStream::serialize_all`]).
//!
//! Encoding of one value in a slot declared with class `D`:
//!
//! 1. `D` primitive: the fixed-width body, nothing else.
//! 2. Null: varint `0`.
//! 3. Otherwise the identity id. A back-reference ends here.
//! 4. A new id is registered before anything else is written, then the runtime class is
//!    announced unless `D` is final, then the body.

use crate::class::{ClassEntry, ClassKind, CollectionKind, classes};
use crate::dictionary::{ClassIds, FieldIds, Lookup, ObjectIds};
use crate::error::{GraphError, Result};
use crate::format::{self, ClassFlags};
use crate::record::{self, FieldSlot, ObjectOutput, RecordClass};
use crate::streamer::{STR, Streamer};
use crate::value::{EnumClass, Obj, Object, Value};
use crate::varint;
use log::trace;
use std::io::Write;
use std::sync::Arc;

/// Writes object graphs to a byte sink.
#[derive(Debug)]
pub struct GraphWriter<W: Write> {
    sink: W,
    objects: ObjectIds,
    classes: ClassIds,
    fields: FieldIds,
}

impl<W: Write> GraphWriter<W> {
    /// Starts a session over `sink`. No header is written; see [`crate::GraphStream`].
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            objects: ObjectIds::default(),
            classes: ClassIds::default(),
            fields: FieldIds::default(),
        }
    }

    /// Writes one root value.
    ///
    /// May be called repeatedly: later roots share the session's dictionaries and may refer
    /// back to objects written by earlier ones.
    pub fn write_object(&mut self, root: &Value) -> Result<()> {
        let any = classes().any();
        self.write_value(root, &any)
    }

    /// Writes `value` as held by a slot declared with `declared`.
    pub fn write_value(&mut self, value: &Value, declared: &ClassEntry) -> Result<()> {
        if let ClassKind::Leaf(streamer) = &declared.kind
            && streamer.primitive().is_some()
        {
            return streamer.write(value, &mut self.sink);
        }
        if value.is_null() {
            varint::write_u64(&mut self.sink, 0)?;
            return Ok(());
        }
        let runtime = classes().runtime_class(value)?;
        let announce = !declared.is_final();
        if !announce && runtime.name != declared.name {
            return Err(GraphError::unsupported(
                &*runtime.name,
                format!("value in a slot declared with final class '{}'", declared.name),
            ));
        }
        match &runtime.kind {
            ClassKind::Leaf(streamer) => self.write_leaf(value, &runtime, streamer, announce),
            ClassKind::Collection(CollectionKind::Multimap) => Err(GraphError::unsupported(
                &*runtime.name,
                "multimaps have no encoding",
            )),
            _ => match value {
                Value::Object(obj) => self.write_node(obj, &runtime, announce),
                other => Err(GraphError::Internal(format!(
                    "leaf {} resolved to non-leaf class {}",
                    other.type_name(),
                    runtime.name
                ))),
            },
        }
    }

    fn write_leaf(
        &mut self,
        value: &Value,
        runtime: &Arc<ClassEntry>,
        streamer: &Arc<dyn Streamer>,
        announce: bool,
    ) -> Result<()> {
        let mut body = Vec::new();
        streamer.write(value, &mut body)?;
        match self.objects.leaf(&runtime.name, &body) {
            Lookup::Existing(id) => {
                varint::write_u64(&mut self.sink, id)?;
            }
            Lookup::New(id) => {
                varint::write_u64(&mut self.sink, id)?;
                if announce {
                    self.announce(runtime)?;
                }
                self.sink.write_all(&body)?;
            }
        }
        Ok(())
    }

    fn write_node(&mut self, obj: &Obj, runtime: &Arc<ClassEntry>, announce: bool) -> Result<()> {
        match self.objects.object(obj) {
            Lookup::Existing(id) => {
                varint::write_u64(&mut self.sink, id)?;
                return Ok(());
            }
            Lookup::New(id) => varint::write_u64(&mut self.sink, id)?,
        };
        if announce {
            self.announce(runtime)?;
        }
        match &runtime.kind {
            ClassKind::Record(class) => self.write_record(obj, *class),
            ClassKind::Array(component) => self.write_array(obj, component),
            ClassKind::Collection(kind) => self.write_collection(obj, *kind, &runtime.name),
            ClassKind::Any | ClassKind::Leaf(_) => Err(GraphError::Internal(format!(
                "object of class {} has no node encoding",
                runtime.name
            ))),
        }
    }

    /// Writes a class reference: the id, plus name and flags the first time.
    fn announce(&mut self, class: &ClassEntry) -> Result<()> {
        match self.classes.class(&class.name) {
            Lookup::Existing(id) => {
                varint::write_u64(&mut self.sink, id)?;
            }
            Lookup::New(id) => {
                trace!("announcing class #{id} '{}' {:?}", class.name, class.flags);
                varint::write_u64(&mut self.sink, id)?;
                format::write_utf(&mut self.sink, &class.name)?;
                self.sink.write_all(&[class.flags.as_u8()])?;
            }
        }
        Ok(())
    }

    fn write_record(&mut self, obj: &Obj, class: &'static RecordClass) -> Result<()> {
        let layout = record::layout(class)?;
        let any = classes().any();

        let guard = obj.read();
        let Object::Record(record) = &*guard else {
            return Err(GraphError::Internal(format!("{} is not a record", class.name)));
        };
        if class.flags.contains(ClassFlags::INNER) {
            let owner = record.owner();
            self.write_value(&owner, &any)
                .map_err(|e| e.in_field(class.name, "<owner>"))?;
        }
        if let Some(result) = record.write_custom(self) {
            return result.map_err(|e| e.in_field(class.name, "<custom>"));
        }
        let values = layout
            .slots
            .iter()
            .map(|slot| record.get_field(slot.index))
            .collect::<Result<Vec<_>>>()?;
        drop(guard);

        let prototype = record::prototype(class)?;
        let mut present: Vec<(&FieldSlot, Value)> = Vec::with_capacity(values.len());
        for (slot, value) in layout.slots.iter().zip(values) {
            if !is_default(&value, &prototype.get_field(slot.index)?) {
                present.push((slot, value));
            }
        }

        varint::write_len(&mut self.sink, present.len())?;
        let str_class = classes().resolve(STR)?;
        for (slot, value) in present {
            let declared = classes()
                .resolve(slot.declared)
                .map_err(|e| e.in_field(class.name, slot.name))?;
            match self.fields.field(class.name, slot.name, slot.declared) {
                Lookup::Existing(id) => {
                    varint::write_u64(&mut self.sink, id)?;
                }
                Lookup::New(id) => {
                    trace!("field #{id} of '{}': {} {}", class.name, slot.name, slot.declared);
                    varint::write_u64(&mut self.sink, id)?;
                    self.write_value(&Value::str(slot.name), &str_class)?;
                    self.announce(&declared)?;
                }
            }
            self.write_value(&value, &declared)
                .map_err(|e| e.in_field(class.name, slot.name))?;
        }
        Ok(())
    }

    fn write_array(&mut self, obj: &Obj, component: &Arc<ClassEntry>) -> Result<()> {
        let items = match &*obj.read() {
            Object::Array(array) => array.items.clone(),
            other => {
                return Err(GraphError::Internal(format!(
                    "{} is not an object array",
                    other.class_name()
                )));
            }
        };
        varint::write_len(&mut self.sink, items.len())?;
        for item in &items {
            self.write_value(item, component)?;
        }
        Ok(())
    }

    fn write_collection(&mut self, obj: &Obj, kind: CollectionKind, name: &str) -> Result<()> {
        let any = classes().any();
        let snapshot = snapshot(&obj.read());
        match (kind, snapshot) {
            (CollectionKind::Sequence, Contents::Items(items)) => {
                varint::write_len(&mut self.sink, items.len())?;
                for item in &items {
                    self.write_value(item, &any)?;
                }
            }
            (CollectionKind::Multiset, Contents::Counted(entries)) => {
                varint::write_len(&mut self.sink, entries.len())?;
                for (item, count) in &entries {
                    self.write_value(item, &any)?;
                    varint::write_u64(&mut self.sink, *count)?;
                }
            }
            (CollectionKind::EnumSet, Contents::Enums(element, items)) => {
                let element = classes().resolve(element.name)?;
                self.announce(&element)?;
                varint::write_len(&mut self.sink, items.len())?;
                for item in &items {
                    self.write_value(item, &element)?;
                }
            }
            (CollectionKind::Map, Contents::Pairs(entries)) => {
                varint::write_len(&mut self.sink, entries.len())?;
                for (key, value) in &entries {
                    self.write_value(key, &any)?;
                    self.write_value(value, &any)?;
                }
            }
            (kind, _) => {
                return Err(GraphError::unsupported(
                    name,
                    format!("contents do not match collection kind {kind:?}"),
                ));
            }
        }
        Ok(())
    }

    /// Number of identity ids assigned so far.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Borrows the sink.
    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    /// Ends the session and returns the sink.
    pub fn into_inner(self) -> W {
        self.sink
    }
}

impl<W: Write> ObjectOutput for GraphWriter<W> {
    fn write_value(&mut self, value: &Value, declared: &str) -> Result<()> {
        let declared = classes().resolve(declared)?;
        GraphWriter::write_value(self, value, &declared)
    }

    fn write_varint(&mut self, value: u64) -> Result<()> {
        varint::write_u64(&mut self.sink, value)?;
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.sink.write_all(bytes)?;
        Ok(())
    }
}

/// A snapshot of a collection's contents, taken so no lock is held while writing elements.
enum Contents {
    Items(Vec<Value>),
    Counted(Vec<(Value, u64)>),
    Enums(&'static EnumClass, Vec<Value>),
    Pairs(Vec<(Value, Value)>),
    Other,
}

fn snapshot(object: &Object) -> Contents {
    match object {
        Object::Collection(c) => Contents::Items(c.items.clone()),
        Object::Multiset(m) => Contents::Counted(m.entries.clone()),
        Object::EnumSet(s) => Contents::Enums(s.element, s.items.clone()),
        Object::Map(m) => Contents::Pairs(m.entries.clone()),
        Object::Record(_) | Object::Array(_) => Contents::Other,
    }
}

/// Whether a field value may be elided in favour of the constructor's default.
///
/// Objects carry identity: only the prototype's own handle counts as the default, since the
/// reader would otherwise rebuild a fresh object and lose any sharing.
fn is_default(value: &Value, default: &Value) -> bool {
    match (value, default) {
        (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
        (Value::Object(_), _) | (_, Value::Object(_)) => false,
        _ => value.deep_eq(default),
    }
}
