//! Codec benchmarks for switchboard-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use serde_json::json;
use switchboard_protocol::codec;

fn bench_decode_small(c: &mut Criterion) {
    let frame = br#"{"type":"move","dx":1,"dy":-1}"#;

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(frame.len() as u64));
    group.bench_function("small", |b| b.iter(|| codec::decode(black_box(frame))));
    group.finish();
}

fn bench_decode_nested(c: &mut Criterion) {
    let frame = serde_json::to_vec(&json!({
        "type": "state",
        "players": (0..32).map(|i| json!({"id": i, "x": i * 3, "y": i * 5})).collect::<Vec<_>>(),
    }))
    .unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(frame.len() as u64));
    group.bench_function("nested_32", |b| {
        b.iter(|| codec::decode(black_box(&frame)))
    });
    group.finish();
}

fn bench_encode_reply(c: &mut Criterion) {
    let reply = json!({"ok": true, "position": {"x": 10, "y": 20}});

    c.bench_function("encode_reply", |b| {
        b.iter(|| codec::encode_reply(black_box(&reply)))
    });
}

criterion_group!(
    benches,
    bench_decode_small,
    bench_decode_nested,
    bench_encode_reply
);
criterion_main!(benches);
