// src/inspector.rs

//! Tools for inspecting the structure of graphstream streams.
//! Useful for checking what a stream announces and how compactly it encodes.
//!
//! The inspector decodes every root, so every class in the stream must be resolvable in the
//! current process.

use crate::api::StreamBuilder;
use crate::class::{BUILTIN_CLASSES, ClassKind};
use crate::error::Result;
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// A structural report of a stream.
#[derive(Debug, Serialize)]
pub struct StreamReport {
    /// Total size of the stream in bytes, header included.
    pub total_size: u64,
    /// Format version from the header.
    pub version: u16,
    /// Whether the body is deflate-compressed.
    pub compressed: bool,
    /// Number of roots in the stream.
    pub root_count: usize,
    /// Number of identity ids assigned (objects and distinct leaves).
    pub object_count: usize,
    /// Classes announced by the stream, in id order. Built-ins are omitted.
    pub classes: Vec<ClassInfo>,
}

/// One announced class.
#[derive(Debug, Serialize)]
pub struct ClassInfo {
    /// Class id within the stream.
    pub id: u64,
    /// Fully-qualified name.
    pub name: String,
    /// Flag byte, rendered.
    pub flags: String,
    /// Body encoding.
    pub kind: String,
    /// Field dictionary, for record classes.
    pub fields: Vec<FieldInfo>,
}

/// One field dictionary entry.
#[derive(Debug, Serialize)]
pub struct FieldInfo {
    /// Field id within its class.
    pub id: u64,
    /// Normalized name.
    pub name: String,
    /// Declared class.
    pub declared: String,
    /// Whether the local type has a matching field.
    pub known: bool,
}

/// The graphstream inspector tool.
#[derive(Debug)]
pub struct StreamInspector;

impl StreamInspector {
    /// Analyzes an in-memory stream.
    pub fn inspect(bytes: &[u8]) -> Result<StreamReport> {
        let (header, mut reader) = StreamBuilder::new().reader(bytes)?;
        let mut root_count = 0;
        while reader.read_object()?.is_some() {
            root_count += 1;
        }

        let classes = reader
            .classes()
            .iter()
            .enumerate()
            .skip(BUILTIN_CLASSES.len())
            .map(|(id, entry)| {
                let (kind, fields) = match &entry.kind {
                    ClassKind::Record(class) => (
                        "record".to_string(),
                        reader
                            .field_dictionary(class.name)
                            .iter()
                            .enumerate()
                            .map(|(field_id, field)| FieldInfo {
                                id: field_id as u64,
                                name: field.name.to_string(),
                                declared: field.declared.name.to_string(),
                                known: field.slot.is_some(),
                            })
                            .collect(),
                    ),
                    ClassKind::Leaf(_) => ("leaf".to_string(), Vec::new()),
                    ClassKind::Array(component) => {
                        (format!("array of {}", component.name), Vec::new())
                    }
                    ClassKind::Collection(kind) => (format!("{kind:?}"), Vec::new()),
                    ClassKind::Any => ("any".to_string(), Vec::new()),
                };
                ClassInfo {
                    id: id as u64,
                    name: entry.name.to_string(),
                    flags: format!("{:?}", entry.flags),
                    kind,
                    fields,
                }
            })
            .collect();

        Ok(StreamReport {
            total_size: bytes.len() as u64,
            version: header.version,
            compressed: header.is_compressed(),
            root_count,
            object_count: reader.object_count(),
            classes,
        })
    }

    /// Analyzes a stream stored in a file.
    pub fn inspect_file<P: AsRef<Path>>(path: P) -> Result<StreamReport> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::inspect(&bytes)
    }
}

impl fmt::Display for StreamReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== GRAPHSTREAM INSPECTOR REPORT ===")?;
        writeln!(f, "Size:        {}b", self.total_size)?;
        writeln!(f, "Version:     {}", self.version)?;
        writeln!(f, "Compressed:  {}", self.compressed)?;
        writeln!(f, "Roots:       {}", self.root_count)?;
        writeln!(f, "Objects:     {}", self.object_count)?;
        writeln!(f, "\n[CLASS DICTIONARY]")?;
        for (i, class) in self.classes.iter().enumerate() {
            class.fmt_tree(f, i == self.classes.len() - 1)?;
        }
        Ok(())
    }
}

impl ClassInfo {
    fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, is_last: bool) -> fmt::Result {
        let connector = if is_last { "└── " } else { "├── " };
        let child_prefix = if is_last { "    " } else { "│   " };
        writeln!(
            f,
            "{}#{} {} [{}] {}",
            connector, self.id, self.name, self.kind, self.flags
        )?;
        for (i, field) in self.fields.iter().enumerate() {
            let field_connector = if i == self.fields.len() - 1 {
                "└── "
            } else {
                "├── "
            };
            let unknown = if field.known { "" } else { " (skipped)" };
            writeln!(
                f,
                "{}{}#{} {}: {}{}",
                child_prefix, field_connector, field.id, field.name, field.declared, unknown
            )?;
        }
        Ok(())
    }
}
