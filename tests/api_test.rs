#![allow(missing_docs)]

use graphstream::rt::{decode_serde, encode_serde};
use graphstream::{
    CustomFields, EncodableType, GraphRecord, GraphStream, ObjectInput, ObjectOutput, Obj,
    Object, StreamBuilder, Value,
};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::sync::Arc;

#[derive(Debug, Default, GraphRecord)]
#[graph(name = "api.Item")]
struct Item {
    id: i64,
    title: String,
    tags: Option<Obj>,
}

#[derive(Debug, Default, GraphRecord)]
#[graph(name = "api.Temperature", custom)]
struct Temperature {
    celsius: f64,
    label: String,
}

impl CustomFields for Temperature {
    fn write_fields(&self, out: &mut dyn ObjectOutput) -> graphstream::Result<()> {
        out.write_varint(1)?;
        out.write_value(&Value::Double(self.celsius), "f64")?;
        out.write_value(&Value::str(&self.label), "str")
    }

    fn read_fields(&mut self, input: &mut dyn ObjectInput) -> graphstream::Result<()> {
        let version = input.read_varint()?;
        assert_eq!(version, 1);
        if let Value::Double(celsius) = input.read_value("f64")? {
            self.celsius = celsius;
        }
        self.label = input
            .read_value("str")?
            .as_str()
            .unwrap_or_default()
            .to_string();
        Ok(())
    }
}

#[derive(Debug, Default, GraphRecord)]
#[graph(name = "api.Loop", custom)]
struct Loop {
    label: String,
    this: Option<Obj>,
}

impl CustomFields for Loop {
    fn write_fields(&self, out: &mut dyn ObjectOutput) -> graphstream::Result<()> {
        out.write_value(&Value::str(&self.label), "str")?;
        let this = self.this.clone().map_or(Value::Null, Value::Object);
        out.write_value(&this, "any")
    }

    fn read_fields(&mut self, input: &mut dyn ObjectInput) -> graphstream::Result<()> {
        self.label = input
            .read_value("str")?
            .as_str()
            .unwrap_or_default()
            .to_string();
        let this = input.read_value("any")?.as_obj().cloned();
        if let Some(obj) = &this {
            // The record under construction is reachable, holding a default instance.
            let seen = obj.get::<Loop>().map(|l| l.label.clone());
            assert_eq!(seen.as_deref(), Some(""));
        }
        self.this = this;
        Ok(())
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Span {
    start: u32,
    end: u32,
    note: Option<String>,
}

impl EncodableType for Span {
    const CLASS: &'static str = "api.Span";

    fn encode(&self, out: &mut dyn Write) -> graphstream::Result<()> {
        encode_serde(self, out)
    }

    fn decode(input: &mut dyn Read) -> graphstream::Result<Self> {
        decode_serde(input)
    }
}

fn item(id: i64) -> Value {
    Value::from(Obj::record(Item {
        id,
        title: format!("item #{id}"),
        tags: Some(Obj::list(vec![Value::str("tag"), Value::Int(id as i32)])),
    }))
}

#[test]
fn test_compressed_round_trip() -> graphstream::Result<()> {
    let items: Vec<Value> = (0..200).map(item).collect();
    let root = Value::from(Obj::list(items));

    let plain = GraphStream::serialize(&root)?;
    let stream = GraphStream::builder().compression(true).compression_level(9);
    let packed = stream.serialize(&root)?;
    assert!(packed.len() < plain.len());
    assert_eq!(&packed[..4], b"GSTM");
    assert_eq!(&packed[6..8], &[0x10, 0x00]);
    assert_eq!(&plain[6..8], &[0x00, 0x00]);

    // The reader follows the header flags, whatever its own options.
    assert_eq!(GraphStream::deserialize(&packed)?, root);
    Ok(())
}

#[test]
#[cfg(not(target_arch = "wasm32"))]
fn test_save_and_load() -> graphstream::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("graph.gstm");
    let root = item(7);

    GraphStream::save(&path, &root)?;
    assert_eq!(GraphStream::load(&path)?, root);

    let compressed = dir.path().join("graph.deflate.gstm");
    GraphStream::builder().compression(true).save(&compressed, &root)?;
    assert_eq!(GraphStream::load(&compressed)?, root);
    Ok(())
}

#[test]
fn test_write_and_read_through_io() -> graphstream::Result<()> {
    let root = item(3);
    let buffer = GraphStream::write(Vec::new(), &root)?;
    assert_eq!(GraphStream::read(buffer.as_slice())?, root);
    Ok(())
}

#[test]
fn test_multiple_roots_share_one_session() -> graphstream::Result<()> {
    let shared = Obj::record(Item {
        id: 1,
        ..Item::default()
    });
    let builder = StreamBuilder::new();
    let mut writer = builder.writer(Vec::new())?;
    writer.write_object(&Value::from(shared.clone()))?;
    writer.write_object(&Value::from(Obj::list(vec![Value::from(shared.clone())])))?;
    writer.write_object(&Value::str("tail"))?;
    let bytes = StreamBuilder::finish(writer)?;

    let roots = builder.read_all(bytes.as_slice())?;
    assert_eq!(roots.len(), 3);
    let first = roots[0].as_obj().expect("first root");
    let list = roots[1].as_obj().expect("second root");
    let guard = list.read();
    let Object::Collection(items) = &*guard else {
        panic!("expected a list");
    };
    assert!(items.items[0].as_obj().expect("item").ptr_eq(first));
    assert_eq!(roots[2].as_str(), Some("tail"));
    Ok(())
}

#[test]
fn test_serialize_all_in_parallel() -> graphstream::Result<()> {
    let roots: Vec<Value> = (0..32).map(item).collect();
    let streams = GraphStream::serialize_all(&roots)?;
    assert_eq!(streams.len(), roots.len());
    for (bytes, root) in streams.iter().zip(&roots) {
        assert_eq!(&GraphStream::deserialize(bytes)?, root);
    }
    Ok(())
}

#[test]
fn test_custom_field_hook() -> graphstream::Result<()> {
    let root = Value::from(Obj::record(Temperature {
        celsius: -3.5,
        label: "freezer".into(),
    }));
    let back = GraphStream::deserialize(&GraphStream::serialize(&root)?)?;
    let obj = back.as_obj().expect("record");
    let temperature = obj.get::<Temperature>().expect("temperature");
    assert_eq!(temperature.celsius, -3.5);
    assert_eq!(temperature.label, "freezer");
    Ok(())
}

#[test]
fn test_custom_hook_reads_a_reference_to_itself() -> graphstream::Result<()> {
    let obj = Obj::record(Loop {
        label: "self".into(),
        this: None,
    });
    if let Some(mut record) = obj.get_mut::<Loop>() {
        record.this = Some(obj.clone());
    }

    let back = GraphStream::deserialize(&GraphStream::serialize(&Value::from(obj))?)?;
    let obj = back.as_obj().expect("record");
    let record = obj.get::<Loop>().expect("Loop");
    assert_eq!(record.label, "self");
    assert!(record.this.as_ref().expect("this").ptr_eq(obj));
    Ok(())
}

#[test]
fn test_serde_encodable_leaf() -> graphstream::Result<()> {
    let span = Value::Custom(Arc::new(Span {
        start: 3,
        end: 9,
        note: Some("hot".into()),
    }));
    let root = Value::from(Obj::list(vec![span.clone(), span.clone()]));
    let bytes = GraphStream::serialize(&root)?;
    let back = GraphStream::deserialize(&bytes)?;
    assert_eq!(back, root);

    let obj = back.as_obj().expect("list");
    let guard = obj.read();
    let Object::Collection(items) = &*guard else {
        panic!("expected a list");
    };
    let Value::Custom(custom) = &items.items[0] else {
        panic!("expected a custom leaf");
    };
    let decoded = custom.as_any().downcast_ref::<Span>().expect("Span");
    assert_eq!(decoded.end, 9);
    Ok(())
}

#[test]
fn test_builder_defaults() {
    let builder = GraphStream::builder();
    assert!(!builder.write_options().compression);
    assert_eq!(builder.write_options().compression_level, 6);
    assert_eq!(builder.read_options().max_length, 16 * 1024 * 1024);
    assert_eq!(builder.read_options().max_depth, 4096);
    assert_eq!(builder.compression_level(42).write_options().compression_level, 9);
}
