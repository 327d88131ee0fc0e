//! # graphstream
//!
//! A self-describing binary codec for arbitrary object graphs: shared references and cycles
//! survive a round trip, and a stream written by one version of a type can be read by another.
//!
//! ## Overview
//!
//! A stream is a header followed by one or more root objects. Every object is written once and
//! referred to by its identity id afterwards, so diamonds and cycles cost one varint per extra
//! reference. Classes and fields are announced by name the first time they occur and by small
//! integer ids after that; the stream carries its own dictionaries and needs no external schema.
//!
//! ### Key Features
//!
//! *   **Identity preservation:** every heap object ([`Obj`]) keeps its identity; immutable
//!     leaves (strings, enum constants, paths, arrays) are canonicalized by content.
//! *   **Incremental dictionaries:** class and field names are written once per stream.
//! *   **Default elision:** record fields equal to the type's default are not written.
//! *   **Schema evolution:** unknown fields in the stream are skipped; fields missing from the
//!     stream keep their defaults.
//! *   **Leaf streamers:** primitives, strings, arrays, numeric buffers, enums and user
//!     [`EncodableType`]s are encoded without walking fields.
//! *   **Optional deflate compression** of the stream body.
//!
//! ## File Format
//!
//! ```text
//! "GSTM" version:u16 flags:u16 | object*
//!
//! object   := varint id                       (0 = null, known id = back-reference)
//!           | varint id class? body           (new id)
//! class    := varint classId [utf name flags] (name and flags on first use)
//! record   := [owner] varint count (varint fieldId [str-object class] value)*
//! ```
//!
//! All integers are big-endian; varints are little-endian base-128.
//!
//! ## Usage
//!
//! ```rust
//! use graphstream::{GraphRecord, GraphStream, Obj, Value};
//!
//! #[derive(Debug, Default, GraphRecord)]
//! #[graph(name = "demo.Node")]
//! struct Node {
//!     label: String,
//!     next: Option<Obj>,
//! }
//!
//! // A two-node cycle.
//! let a = Obj::record(Node { label: "a".into(), next: None });
//! let b = Obj::record(Node { label: "b".into(), next: Some(a.clone()) });
//! a.get_mut::<Node>().expect("node").next = Some(b.clone());
//!
//! let bytes = GraphStream::serialize(&Value::from(a))?;
//! let root = GraphStream::deserialize(&bytes)?;
//!
//! let a2 = root.as_obj().expect("object").clone();
//! let b2 = a2.get::<Node>().expect("node").next.clone().expect("next");
//! let back = b2.get::<Node>().expect("node").next.clone().expect("next");
//! assert!(back.ptr_eq(&a2));
//! # Ok::<(), graphstream::GraphError>(())
//! ```
//!
//! ## Logging
//!
//! The crate logs through the `log` facade: registrations and skipped fields at `debug`, class
//! and field announcements at `trace`. No logger is installed.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

extern crate self as graphstream;

// --- PUBLIC API MODULES ---
pub mod api;
pub mod class;
pub mod compression;
pub mod dictionary;
pub mod error;
pub mod format;
pub mod hash;
pub mod inspector;
pub mod reader;
pub mod record;
pub mod streamer;
pub mod value;
pub mod varint;
pub mod writer;

// --- MACRO SUPPORT MODULES ---

/// Runtime utilities used by the derived code.
#[doc(hidden)]
pub mod rt;

// --- RE-EXPORTS ---

pub use api::{GraphStream, StreamBuilder, WriteOptions};
pub use class::{CollectionKind, register_collection, register_record};
pub use error::{GraphError, Result};
pub use inspector::{StreamInspector, StreamReport};
pub use reader::{GraphReader, ReadOptions};
pub use record::{CustomFields, FieldType, ObjectInput, ObjectOutput, Record, RecordType};
pub use streamer::{EncodableType, register_encodable, register_enum};
pub use value::{
    EnumClass, EnumType, EnumValue, NumericBuffer, Obj, Object, Primitive, PrimitiveArray, Value,
};
pub use writer::GraphWriter;

// Re-export the derive macros so they are accessible as `graphstream::GraphRecord`.
pub use graphstream_derive::{GraphEnum, GraphRecord};
