//! Per-session identity and dictionary tables.
//!
//! Each session owns three append-only id spaces:
//!
//! - **objects**: id 0 is null; ids from 1 are assigned in first-encounter order. Heap objects
//!   are keyed by handle address, leaf values by class and encoded bytes.
//! - **classes**: seeded with [`BUILTIN_CLASSES`]; new classes continue from there.
//! - **fields**: one table per record class, numbered from 0, keyed by
//!   (normalized name, declared class).
//!
//! An id, once assigned, is never reassigned for the lifetime of the session. The writer
//! registers an object *before* encoding its body; that ordering is what terminates cycles.

use crate::class::{BUILTIN_CLASSES, ClassEntry, classes};
use crate::error::{GraphError, Result};
use crate::hash::{FastMap, fast_map};
use crate::value::{Obj, Value};
use std::sync::Arc;

/// Result of looking up a key in a write-side dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Seen before: write only the id.
    Existing(u64),
    /// Just assigned: write the id followed by the full definition.
    New(u64),
}

impl Lookup {
    /// The id, either way.
    pub fn id(self) -> u64 {
        match self {
            Self::Existing(id) | Self::New(id) => id,
        }
    }
}

// --- Write side ---

/// Object identity table of a writer.
#[derive(Debug)]
pub struct ObjectIds {
    next: u64,
    objects: FastMap<usize, u64>,
    leaves: FastMap<Arc<str>, FastMap<Vec<u8>, u64>>,
    // Keeps every registered object alive so that addresses are not reused mid-session.
    pinned: Vec<Obj>,
}

impl Default for ObjectIds {
    fn default() -> Self {
        Self {
            next: 1,
            objects: fast_map(),
            leaves: fast_map(),
            pinned: Vec::new(),
        }
    }
}

impl ObjectIds {
    /// Looks up a heap object by identity, registering it if new.
    pub fn object(&mut self, obj: &Obj) -> Lookup {
        if let Some(&id) = self.objects.get(&obj.address()) {
            return Lookup::Existing(id);
        }
        let id = self.assign();
        self.objects.insert(obj.address(), id);
        self.pinned.push(obj.clone());
        Lookup::New(id)
    }

    /// Looks up a leaf value by class and content, registering it if new.
    pub fn leaf(&mut self, class: &Arc<str>, body: &[u8]) -> Lookup {
        if let Some(&id) = self.leaves.get(class).and_then(|by_body| by_body.get(body)) {
            return Lookup::Existing(id);
        }
        let id = self.assign();
        self.leaves
            .entry(class.clone())
            .or_insert_with(fast_map)
            .insert(body.to_vec(), id);
        Lookup::New(id)
    }

    fn assign(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Number of ids assigned so far.
    pub fn len(&self) -> usize {
        (self.next - 1) as usize
    }

    /// Returns true if no id has been assigned.
    pub fn is_empty(&self) -> bool {
        self.next == 1
    }
}

/// Class dictionary of a writer.
#[derive(Debug)]
pub struct ClassIds {
    ids: FastMap<Arc<str>, u64>,
}

impl Default for ClassIds {
    fn default() -> Self {
        let mut ids = fast_map();
        for (id, name) in BUILTIN_CLASSES.iter().enumerate() {
            ids.insert(Arc::from(*name), id as u64);
        }
        Self { ids }
    }
}

impl ClassIds {
    /// Looks up a class by name, registering it if new.
    pub fn class(&mut self, name: &Arc<str>) -> Lookup {
        if let Some(&id) = self.ids.get(name) {
            return Lookup::Existing(id);
        }
        let id = self.ids.len() as u64;
        self.ids.insert(name.clone(), id);
        Lookup::New(id)
    }

    /// Number of classes known to the session, built-ins included.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the dictionary holds no classes, built-ins included.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Field dictionaries of a writer, one per record class.
#[derive(Debug, Default)]
pub struct FieldIds {
    per_class: FastMap<&'static str, FastMap<(&'static str, &'static str), u64>>,
}

impl FieldIds {
    /// Looks up a field of `class` by (normalized name, declared class).
    pub fn field(
        &mut self,
        class: &'static str,
        name: &'static str,
        declared: &'static str,
    ) -> Lookup {
        let fields = self.per_class.entry(class).or_insert_with(fast_map);
        if let Some(&id) = fields.get(&(name, declared)) {
            return Lookup::Existing(id);
        }
        let id = fields.len() as u64;
        fields.insert((name, declared), id);
        Lookup::New(id)
    }
}

// --- Read side ---

/// Object table of a reader: position `i` holds id `i + 1`.
#[derive(Debug, Default)]
pub struct ObjectTable {
    values: Vec<Value>,
}

impl ObjectTable {
    /// The id the next new object must carry.
    pub fn next_id(&self) -> u64 {
        self.values.len() as u64 + 1
    }

    /// Resolves a back-reference.
    pub fn get(&self, id: u64) -> Option<&Value> {
        let index = usize::try_from(id.checked_sub(1)?).ok()?;
        self.values.get(index)
    }

    /// Registers the next object.
    pub fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    /// Number of objects read so far.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if nothing has been read yet.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Class dictionary of a reader.
#[derive(Debug)]
pub struct ClassTable {
    entries: Vec<Arc<ClassEntry>>,
}

impl ClassTable {
    /// A table seeded with the built-in classes.
    pub fn new() -> Result<Self> {
        let entries = BUILTIN_CLASSES
            .iter()
            .map(|name| classes().resolve(name))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }

    /// The id the next announced class receives.
    pub fn next_id(&self) -> u64 {
        self.entries.len() as u64
    }

    /// Resolves a class id.
    pub fn get(&self, id: u64) -> Option<&Arc<ClassEntry>> {
        self.entries.get(usize::try_from(id).ok()?)
    }

    /// Registers the next announced class.
    pub fn push(&mut self, entry: Arc<ClassEntry>) {
        self.entries.push(entry);
    }

    /// All classes in id order.
    pub fn entries(&self) -> &[Arc<ClassEntry>] {
        &self.entries
    }
}

/// A field dictionary entry of a reader.
#[derive(Debug, Clone)]
pub struct ReadField {
    /// Normalized name as written.
    pub name: Arc<str>,
    /// Declared class as announced.
    pub declared: Arc<ClassEntry>,
    /// Matching local field, or `None` if the value is to be skipped.
    pub slot: Option<usize>,
}

/// Field dictionaries of a reader, one per record class.
#[derive(Debug, Default)]
pub struct FieldTable {
    per_class: FastMap<&'static str, Vec<ReadField>>,
}

impl FieldTable {
    /// The id the next new field of `class` must carry.
    pub fn next_id(&self, class: &'static str) -> u64 {
        self.per_class.get(class).map_or(0, |fields| fields.len() as u64)
    }

    /// Resolves a field id of `class`.
    pub fn get(&self, class: &'static str, id: u64) -> Option<&ReadField> {
        self.per_class.get(class)?.get(usize::try_from(id).ok()?)
    }

    /// Registers the next field of `class`.
    pub fn push(&mut self, class: &'static str, field: ReadField) {
        self.per_class.entry(class).or_default().push(field);
    }

    /// The dictionary of one class, in id order.
    pub fn fields(&self, class: &str) -> &[ReadField] {
        self.per_class.get(class).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Fails with [`GraphError::Corrupt`] unless `id` is the next id of its space.
pub(crate) fn expect_next(space: &str, id: u64, next: u64) -> Result<()> {
    if id == next {
        Ok(())
    } else {
        Err(GraphError::corrupt(format!(
            "{space} id {id} out of sequence (next is {next})"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_ids_start_at_one_and_are_stable() {
        let mut ids = ObjectIds::default();
        let a = Obj::list(vec![]);
        let b = Obj::list(vec![]);
        assert_eq!(ids.object(&a), Lookup::New(1));
        assert_eq!(ids.object(&b), Lookup::New(2));
        assert_eq!(ids.object(&a), Lookup::Existing(1));
        assert_eq!(ids.object(&a.clone()), Lookup::Existing(1));
    }

    #[test]
    fn equal_leaves_share_an_id() {
        let mut ids = ObjectIds::default();
        let str_class: Arc<str> = Arc::from("str");
        let int_class: Arc<str> = Arc::from("i32");
        assert_eq!(ids.leaf(&str_class, b"\x00\x01a"), Lookup::New(1));
        assert_eq!(ids.leaf(&str_class, b"\x00\x01a"), Lookup::Existing(1));
        // Same bytes, different class.
        assert_eq!(ids.leaf(&int_class, b"\x00\x01a"), Lookup::New(2));
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn class_ids_continue_after_builtins() {
        let mut ids = ClassIds::default();
        assert_eq!(ids.class(&Arc::from("str")), Lookup::Existing(9));
        assert_eq!(ids.class(&Arc::from("demo.A")), Lookup::New(11));
        assert_eq!(ids.class(&Arc::from("demo.A")), Lookup::Existing(11));
    }

    #[test]
    fn field_ids_are_per_class() {
        let mut ids = FieldIds::default();
        assert_eq!(ids.field("A", "x", "i32"), Lookup::New(0));
        assert_eq!(ids.field("A", "y", "i32"), Lookup::New(1));
        assert_eq!(ids.field("B", "x", "i32"), Lookup::New(0));
        assert_eq!(ids.field("A", "x", "i64"), Lookup::New(2));
        assert_eq!(ids.field("A", "x", "i32"), Lookup::Existing(0));
    }

    #[test]
    fn reader_tables_reject_gaps() {
        assert!(expect_next("object", 3, 2).is_err());
        assert!(expect_next("object", 2, 2).is_ok());
        let table = ObjectTable::default();
        assert!(table.get(0).is_none());
        assert!(table.get(1).is_none());
    }
}
