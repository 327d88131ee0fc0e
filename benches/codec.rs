#![allow(missing_docs)]

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use graphstream::{GraphRecord, GraphStream, Obj, Value};
use serde::{Deserialize, Serialize};
use std::hint::black_box;

#[derive(Clone, Debug, Default, Serialize, Deserialize, GraphRecord)]
#[graph(name = "bench.Item")]
struct BenchItem {
    id: i64,
    name: String,
    payload: Vec<i64>,
}

fn generate_items(count: usize) -> Vec<BenchItem> {
    (0..count)
        .map(|i| BenchItem {
            id: i as i64,
            name: format!("item-{}", i % 64),
            payload: vec![i as i64; 32],
        })
        .collect()
}

fn as_graph(items: &[BenchItem]) -> Value {
    Value::from(Obj::list(
        items
            .iter()
            .cloned()
            .map(|item| Value::from(Obj::record(item)))
            .collect(),
    ))
}

// --- BENCHMARKS ---

fn bench_writers(c: &mut Criterion) {
    let item_count = 10_000;
    let items = generate_items(item_count);
    let graph = as_graph(&items);

    println!("Writers Item count: {}", item_count);

    let mut group = c.benchmark_group("Serialization Write");
    group.throughput(Throughput::Elements(item_count as u64));

    // 1. Baseline: Bincode
    group.bench_function("bincode_serialize", |b| {
        b.iter(|| {
            bincode::serde::encode_to_vec(black_box(&items), bincode::config::standard())
                .expect("Bincode serialization failed")
        });
    });

    // 2. graphstream
    group.bench_function("graphstream_serialize", |b| {
        b.iter(|| GraphStream::serialize(black_box(&graph)).expect("serialize"));
    });

    // 3. graphstream + deflate
    let compressed = GraphStream::builder().compression(true);
    group.bench_function("graphstream_serialize_deflate", |b| {
        b.iter(|| compressed.serialize(black_box(&graph)).expect("serialize"));
    });

    group.finish();
}

fn bench_readers(c: &mut Criterion) {
    let item_count = 10_000;
    let items = generate_items(item_count);
    let graph = as_graph(&items);

    let bincode_buffer = bincode::serde::encode_to_vec(&items, bincode::config::standard())
        .expect("Bincode serialization failed");
    let buffer = GraphStream::serialize(&graph).expect("serialize");
    println!(
        "Readers Item count: {} (bincode {}b, graphstream {}b)",
        item_count,
        bincode_buffer.len(),
        buffer.len()
    );

    let mut group = c.benchmark_group("Deserialization Read");
    group.throughput(Throughput::Elements(item_count as u64));

    group.bench_function("bincode_read_all", |b| {
        b.iter(|| {
            let (res, _): (Vec<BenchItem>, usize) = bincode::serde::decode_from_slice(
                black_box(&bincode_buffer),
                bincode::config::standard(),
            )
            .expect("Bincode deserialization failed");
            res
        });
    });

    group.bench_function("graphstream_read_all", |b| {
        b.iter(|| GraphStream::deserialize(black_box(&buffer)).expect("deserialize"));
    });

    group.finish();
}

criterion_group!(benches, bench_writers, bench_readers);
criterion_main!(benches);
