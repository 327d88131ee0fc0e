#![allow(missing_docs)]

//! Default elision, declared-class elision and reading streams written by other versions of a
//! type. Two versions of a type cannot share a class name in one process, so the streams are
//! re-labelled by patching the class name (same length) in the encoded bytes.

use assert_matches::assert_matches;
use graphstream::{GraphError, GraphRecord, GraphStream, Obj, Object, Result, Value};

#[derive(Debug, Default, GraphRecord)]
#[graph(name = "evo.Counter")]
struct Counter {
    name: String,
    count: i32,
}

#[derive(Debug, Default, GraphRecord)]
#[graph(name = "evo.ShapeV1")]
struct ShapeV1 {
    name: String,
    sides: i32,
    legacy: i64,
}

#[derive(Debug, GraphRecord)]
#[graph(name = "evo.ShapeV2", constructor = "ShapeV2::new")]
struct ShapeV2 {
    name: String,
    sides: i64,
    color: String,
}

impl ShapeV2 {
    fn new() -> Result<Self> {
        Ok(Self {
            name: "unnamed".into(),
            sides: -1,
            color: "red".into(),
        })
    }
}

#[derive(Debug, Default, GraphRecord)]
#[graph(name = "evo.Point", final)]
struct Point {
    x: i32,
    y: i32,
}

#[derive(Debug, Default, GraphRecord)]
#[graph(name = "evo.HolderA")]
struct HolderA {
    #[graph(declared = "Point")]
    first: Option<Obj>,
    #[graph(declared = "Point")]
    second: Option<Obj>,
}

#[derive(Debug, Default, GraphRecord)]
#[graph(name = "evo.HolderB")]
struct HolderB {
    first: Option<Obj>,
    second: Option<Obj>,
}

#[derive(Debug, GraphRecord)]
#[graph(name = "evo.Limits", constructor = "Limits::new")]
struct Limits {
    limit: Option<i32>,
    ratio: Option<f64>,
}

impl Limits {
    fn new() -> Result<Self> {
        Ok(Self {
            limit: Some(10),
            ratio: None,
        })
    }
}

#[derive(Debug, GraphRecord)]
#[graph(name = "evo.Tagged", constructor = "Tagged::new")]
struct Tagged {
    tags: Option<Obj>,
}

impl Tagged {
    fn new() -> Result<Self> {
        Ok(Self {
            tags: Some(Obj::list(Vec::new())),
        })
    }
}

fn relabel(bytes: &[u8], from: &str, to: &str) -> Vec<u8> {
    assert_eq!(from.len(), to.len());
    let (from, to) = (from.as_bytes(), to.as_bytes());
    let mut out = bytes.to_vec();
    let mut i = 0;
    let mut patched = 0;
    while i + from.len() <= out.len() {
        if &out[i..i + from.len()] == from {
            out[i..i + from.len()].copy_from_slice(to);
            patched += 1;
            i += from.len();
        } else {
            i += 1;
        }
    }
    assert!(patched > 0, "class name not found in stream");
    out
}

/// Offset of the record's field count: header, object id, class id, class name, flag byte.
fn field_count_offset(class: &str) -> usize {
    8 + 1 + 1 + 2 + class.len() + 1
}

#[test]
fn test_default_fields_are_elided() -> Result<()> {
    let at = field_count_offset("evo.Counter");

    let one = GraphStream::serialize(&Value::from(Obj::record(Counter {
        name: "a".into(),
        count: 0,
    })))?;
    assert_eq!(&one[at - 12..at - 1], b"evo.Counter");
    assert_eq!(one[at], 1);

    let two = GraphStream::serialize(&Value::from(Obj::record(Counter {
        name: "a".into(),
        count: 5,
    })))?;
    assert_eq!(two[at], 2);

    let none = GraphStream::serialize(&Value::from(Obj::record(Counter::default())))?;
    assert_eq!(none[at], 0);
    assert_eq!(none.len(), at + 1);
    Ok(())
}

#[test]
fn test_field_names_are_written_once_per_class() -> Result<()> {
    let single = GraphStream::serialize(&Value::from(Obj::list(vec![Value::from(
        Obj::record(Counter {
            name: "n".into(),
            count: 1,
        }),
    )])))?;
    let double = GraphStream::serialize(&Value::from(Obj::list(vec![
        Value::from(Obj::record(Counter {
            name: "n".into(),
            count: 1,
        })),
        Value::from(Obj::record(Counter {
            name: "n".into(),
            count: 2,
        })),
    ])))?;
    // Second record: id, class id, count, two field ids, back-referenced name, i32 body.
    assert_eq!(double.len(), single.len() + 1 + 1 + 1 + 2 + 1 + 4);
    Ok(())
}

#[test]
fn test_newer_reader_skips_unknown_and_mismatched_fields() -> Result<()> {
    graphstream::register_record::<ShapeV2>()?;
    let old = GraphStream::serialize(&Value::from(Obj::record(ShapeV1 {
        name: "tri".into(),
        sides: 3,
        legacy: 9,
    })))?;

    let back = GraphStream::deserialize(&relabel(&old, "evo.ShapeV1", "evo.ShapeV2"))?;
    let obj = back.as_obj().expect("record");
    let shape = obj.get::<ShapeV2>().expect("ShapeV2");
    assert_eq!(shape.name, "tri");
    // `sides` changed from i32 to i64: a different field, left at its default.
    assert_eq!(shape.sides, -1);
    assert_eq!(shape.color, "red");
    Ok(())
}

#[test]
fn test_older_reader_keeps_defaults_for_missing_fields() -> Result<()> {
    graphstream::register_record::<ShapeV1>()?;
    let new = GraphStream::serialize(&Value::from(Obj::record(ShapeV2 {
        name: "square".into(),
        sides: 4,
        color: "blue".into(),
    })))?;

    let back = GraphStream::deserialize(&relabel(&new, "evo.ShapeV2", "evo.ShapeV1"))?;
    let obj = back.as_obj().expect("record");
    let shape = obj.get::<ShapeV1>().expect("ShapeV1");
    assert_eq!(shape.name, "square");
    assert_eq!(shape.sides, 0);
    assert_eq!(shape.legacy, 0);
    Ok(())
}

#[test]
fn test_final_declared_class_is_not_announced_per_value() -> Result<()> {
    let point = |x| Some(Obj::record(Point { x, y: 1 }));
    let declared = GraphStream::serialize(&Value::from(Obj::record(HolderA {
        first: point(1),
        second: point(2),
    })))?;
    let open = GraphStream::serialize(&Value::from(Obj::record(HolderB {
        first: point(1),
        second: point(2),
    })))?;
    // HolderB pays one byte per field for the untyped declared class.
    assert_eq!(open.len(), declared.len() + 2);

    let back = GraphStream::deserialize(&declared)?;
    let obj = back.as_obj().expect("holder");
    let holder = obj.get::<HolderA>().expect("HolderA");
    let second = holder.second.as_ref().expect("second");
    assert_eq!(second.get::<Point>().expect("point").x, 2);
    Ok(())
}

#[test]
fn test_final_declared_class_rejects_other_classes() {
    let holder = Value::from(Obj::record(HolderA {
        first: Some(Obj::record(Counter::default())),
        second: None,
    }));
    let err = GraphStream::serialize(&holder).expect_err("wrong runtime class");
    assert_matches!(err, GraphError::Field { field, source, .. } => {
        assert_eq!(field, "first");
        assert_matches!(*source, GraphError::Unsupported { .. });
    });
}

#[test]
fn test_elided_record_reads_back_its_defaults() -> Result<()> {
    let bytes = GraphStream::serialize(&Value::from(Obj::record(ShapeV2::new()?)))?;
    let at = field_count_offset("evo.ShapeV2");
    assert_eq!(bytes[at], 0);
    assert_eq!(bytes.len(), at + 1);

    let back = GraphStream::deserialize(&bytes)?;
    let obj = back.as_obj().expect("record");
    let shape = obj.get::<ShapeV2>().expect("ShapeV2");
    assert_eq!(shape.name, "unnamed");
    assert_eq!(shape.sides, -1);
    assert_eq!(shape.color, "red");
    Ok(())
}

#[test]
fn test_optional_primitives_hold_null() -> Result<()> {
    let at = field_count_offset("evo.Limits");
    let cases = [
        (None, None, 1),
        (Some(3), Some(0.5), 2),
        (Some(10), None, 0),
        (None, Some(-0.0), 2),
    ];
    for (limit, ratio, present) in cases {
        let bytes = GraphStream::serialize(&Value::from(Obj::record(Limits { limit, ratio })))?;
        assert_eq!(bytes[at], present, "{limit:?} {ratio:?}");

        let back = GraphStream::deserialize(&bytes)?;
        let obj = back.as_obj().expect("record");
        let limits = obj.get::<Limits>().expect("Limits");
        assert_eq!(limits.limit, limit);
        assert_eq!(limits.ratio.map(f64::to_bits), ratio.map(f64::to_bits));
    }
    Ok(())
}

#[test]
fn test_object_equal_to_default_keeps_its_identity() -> Result<()> {
    let shared = Obj::list(Vec::new());
    let root = Value::from(Obj::list(vec![
        Value::from(Obj::record(Tagged {
            tags: Some(shared.clone()),
        })),
        Value::from(shared),
    ]));

    let back = GraphStream::deserialize(&GraphStream::serialize(&root)?)?;
    let list = back.as_obj().expect("list");
    let guard = list.read();
    let Object::Collection(items) = &*guard else {
        panic!("expected a list");
    };
    let tagged = items.items[0].as_obj().expect("tagged");
    let tags = tagged.get::<Tagged>().expect("Tagged").tags.clone().expect("tags");
    assert!(tags.ptr_eq(items.items[1].as_obj().expect("shared list")));
    Ok(())
}
