#![allow(missing_docs)]

use assert_matches::assert_matches;
use graphstream::format::StreamHeader;
use graphstream::{
    GraphError, GraphRecord, GraphStream, NumericBuffer, Obj, PrimitiveArray, StreamBuilder,
    Value, varint,
};
use std::sync::Arc;

#[derive(Debug, Default, GraphRecord)]
#[graph(name = "err.Twins")]
struct Twins {
    name: String,
    _name: String,
}

#[derive(Debug, Default, GraphRecord)]
#[graph(name = "err.Base")]
struct Base {
    label: String,
}

#[derive(Debug, Default, GraphRecord)]
#[graph(name = "err.Derived")]
struct Derived {
    #[graph(base)]
    base: Base,
    _label: i32,
}

#[derive(Debug, GraphRecord)]
#[graph(name = "err.Broken", constructor = "Broken::new")]
struct Broken {
    value: i32,
}

impl Broken {
    fn new() -> graphstream::Result<Self> {
        Err(GraphError::Internal("no default instance".into()))
    }
}

fn stream(body: &[u8]) -> Vec<u8> {
    let mut bytes = StreamHeader::new(false).to_bytes().to_vec();
    bytes.extend_from_slice(body);
    bytes
}

fn nested_lists(depth: usize) -> Value {
    let mut value = Value::Int(0);
    for _ in 0..depth {
        value = Value::from(Obj::list(vec![value]));
    }
    value
}

#[test]
fn test_duplicate_normalized_names_are_ambiguous() {
    let err = GraphStream::serialize(&Value::from(Obj::record(Twins::default())))
        .expect_err("ambiguous");
    assert_matches!(err, GraphError::AmbiguousField { class, field } => {
        assert_eq!(class, "err.Twins");
        assert_eq!(field, "name");
    });

    let err = GraphStream::serialize(&Value::from(Obj::record(Derived::default())))
        .expect_err("ambiguous across the hierarchy");
    assert_matches!(err, GraphError::AmbiguousField { field, .. } if field == "label");
}

#[test]
fn test_failing_constructor() {
    let err = GraphStream::serialize(&Value::from(Obj::record(Broken { value: 1 })))
        .expect_err("no prototype");
    assert_matches!(err, GraphError::Construction { class, .. } if class == "err.Broken");
}

#[test]
fn test_multimap_is_unsupported() {
    let multimap = Value::from(Obj::map_of(
        "multimap",
        vec![(Value::Int(1), Value::Int(2)), (Value::Int(1), Value::Int(3))],
    ));
    let err = GraphStream::serialize(&multimap).expect_err("multimap");
    assert_matches!(err, GraphError::Unsupported { class, .. } if class == "multimap");
}

#[test]
fn test_unknown_class_name() {
    let mut body = vec![1, 11];
    graphstream::format::write_utf(&mut body, "nowhere.Thing").expect("utf");
    body.push(0);
    let err = GraphStream::deserialize(&stream(&body)).expect_err("unknown class");
    assert_matches!(err, GraphError::ClassResolution { name } if name == "nowhere.Thing");
}

#[test]
fn test_malformed_streams_are_corrupt() {
    // Bad magic.
    assert_matches!(
        GraphStream::deserialize(b"NOPE\x00\x01\x00\x00"),
        Err(GraphError::Corrupt(_))
    );
    // Header only: no root.
    assert_matches!(GraphStream::deserialize(&stream(&[])), Err(GraphError::Corrupt(_)));
    // Object id 2 before id 1.
    assert_matches!(GraphStream::deserialize(&stream(&[2])), Err(GraphError::Corrupt(_)));
    // Back-reference to the built-in class table beyond its end.
    assert_matches!(
        GraphStream::deserialize(&stream(&[1, 40])),
        Err(GraphError::Corrupt(_))
    );
    // Unterminated varint.
    assert_matches!(
        GraphStream::deserialize(&stream(&[0x80, 0x80])),
        Err(GraphError::Corrupt(_))
    );
}

#[test]
fn test_truncated_stream() -> graphstream::Result<()> {
    let bytes = GraphStream::serialize(&Value::from(Obj::list(vec![Value::str("complete")])))?;
    for cut in 9..bytes.len() {
        assert_matches!(
            GraphStream::deserialize(&bytes[..cut]),
            Err(GraphError::Corrupt(_)),
            "cut at {cut}"
        );
    }
    Ok(())
}

#[test]
fn test_reader_limits() -> graphstream::Result<()> {
    let long = GraphStream::serialize(&Value::from(Obj::list(vec![Value::Int(1); 3])))?;
    let strict = StreamBuilder::new().max_length(2);
    assert_matches!(strict.deserialize(&long), Err(GraphError::Corrupt(_)));
    assert!(StreamBuilder::new().max_length(3).deserialize(&long).is_ok());

    let ints = GraphStream::serialize(&Value::from(PrimitiveArray::Int(vec![1, 2, 3, 4, 5])))?;
    assert_matches!(strict.deserialize(&ints), Err(GraphError::Corrupt(_)));
    assert!(StreamBuilder::new().max_length(5).deserialize(&ints).is_ok());

    let buffer = GraphStream::serialize(&Value::Buffer(Arc::new(NumericBuffer {
        elements: PrimitiveArray::Double(vec![0.5; 3]),
        position: 1,
    })))?;
    assert_matches!(strict.deserialize(&buffer), Err(GraphError::Corrupt(_)));

    let deep = GraphStream::serialize(&nested_lists(5))?;
    assert_matches!(
        StreamBuilder::new().max_depth(4).deserialize(&deep),
        Err(GraphError::Corrupt(_))
    );
    // The innermost i32 is a leaf with its own identity.
    assert!(StreamBuilder::new().max_depth(6).deserialize(&deep).is_ok());
    Ok(())
}

#[test]
fn test_errors_are_clone_and_display() {
    let mut body = Vec::new();
    varint::write_u64(&mut body, 1).expect("varint");
    let err = GraphStream::deserialize(&stream(&body)).expect_err("truncated");
    let copy = err.clone();
    assert_eq!(err.to_string(), copy.to_string());
    assert!(err.to_string().starts_with("corrupt stream"));
}
