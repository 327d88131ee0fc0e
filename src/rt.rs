// src/rt.rs

//! Runtime utilities for generated code (Macros).
//! Do not use directly, except for the serde bridge.
//!
//! The serde bridge lets a serde type become a leaf in two lines:
//!
//! ```rust
//! use graphstream::rt::{decode_serde, encode_serde};
//! use graphstream::streamer::EncodableType;
//! use std::io::{Read, Write};
//!
//! #[derive(Debug, serde::Serialize, serde::Deserialize)]
//! struct Span { start: u32, end: u32 }
//!
//! impl EncodableType for Span {
//!     const CLASS: &'static str = "demo.Span";
//!     fn encode(&self, out: &mut dyn Write) -> graphstream::Result<()> { encode_serde(self, out) }
//!     fn decode(input: &mut dyn Read) -> graphstream::Result<Self> { decode_serde(input) }
//! }
//! ```

use crate::error::{GraphError, Result};
use crate::record::{Record, RecordType};
use crate::value::{EnumType, Value};
use crate::varint;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{Read, Write};

pub use crate::class::register_record;
pub use crate::record::{
    ClassType, CustomFields, FieldDescriptor, FieldType, ObjectInput, ObjectOutput, RecordClass,
};
pub use crate::streamer::register_enum;
pub use crate::value::EnumClass;

/// Error for an index outside a record's field table.
pub fn field_index_error(class: &str, index: usize) -> GraphError {
    GraphError::Internal(format!("{class} has no field #{index}"))
}

/// Boxes a default instance, for records without a custom constructor.
pub fn construct_default<T: RecordType + Default>() -> Result<Box<dyn Record>> {
    Ok(Box::new(T::default()))
}

/// Boxes the result of a user constructor.
pub fn construct_with<T: RecordType>(built: Result<T>) -> Result<Box<dyn Record>> {
    built.map(|record| Box::new(record) as Box<dyn Record>)
}

/// Converts a decoded enum constant back into the Rust enum.
pub fn enum_from_value<E: EnumType>(value: Value) -> Result<E> {
    let class = E::enum_class();
    match value {
        Value::Enum(constant) if constant.class.name == class.name => E::from_ordinal(
            constant.ordinal,
        )
        .ok_or_else(|| {
            GraphError::corrupt(format!("{} has no ordinal {}", class.name, constant.ordinal))
        }),
        other => Err(GraphError::mismatch(class.name, other.type_name())),
    }
}

/// Registers an enum's streamer for use as a declared field class.
pub fn register_enum_field<E: EnumType>() -> Result<()> {
    register_enum::<E>();
    Ok(())
}

// --- Serde bridge ---

/// Writes a serde value as a varint length followed by its bincode encoding.
pub fn encode_serde<T: Serialize>(value: &T, out: &mut dyn Write) -> Result<()> {
    let bytes = bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| GraphError::Serialization(e.to_string()))?;
    varint::write_len(out, bytes.len())?;
    out.write_all(&bytes)?;
    Ok(())
}

/// Reads a value written by [`encode_serde`].
pub fn decode_serde<T: DeserializeOwned>(input: &mut dyn Read) -> Result<T> {
    let len = varint::read_required(input)?;
    let mut bytes = Vec::new();
    input.take(len).read_to_end(&mut bytes)?;
    if bytes.len() as u64 != len {
        return Err(GraphError::corrupt(format!(
            "serde payload truncated: {} of {len} bytes",
            bytes.len()
        )));
    }
    let (value, used) = bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
        .map_err(|e| GraphError::Serialization(e.to_string()))?;
    if used != bytes.len() {
        return Err(GraphError::Serialization(format!(
            "{} trailing bytes after serde payload",
            bytes.len() - used
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        id: u32,
        tags: Vec<String>,
    }

    #[test]
    fn serde_payload_round_trips() {
        let sample = Sample {
            id: 7,
            tags: vec!["a".into(), "bc".into()],
        };
        let mut out = Vec::new();
        encode_serde(&sample, &mut out).expect("encode");
        let mut input = out.as_slice();
        let back: Sample = decode_serde(&mut input).expect("decode");
        assert_eq!(back, sample);
        assert!(input.is_empty());
    }

    #[test]
    fn truncated_payload_is_corrupt() {
        let mut out = Vec::new();
        encode_serde(&Sample { id: 1, tags: vec![] }, &mut out).expect("encode");
        out.pop();
        let mut input = out.as_slice();
        let err = decode_serde::<Sample>(&mut input).expect_err("truncated");
        assert!(matches!(err, GraphError::Corrupt(_)));
    }
}
