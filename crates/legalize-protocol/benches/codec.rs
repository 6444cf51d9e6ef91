//! Codec benchmarks for legalize-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use legalize_protocol::{codec, OutboundMessage};
use serde_json::json;

const NOTIFICATION: &[u8] = br#"{"kind":"notification","payload":{"id":981,"title":"New message from your lawyer","read":false,"created_at":"2024-05-02T10:11:12Z"}}"#;

fn bench_decode_notification(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(NOTIFICATION.len() as u64));
    group.bench_function("notification", |b| {
        b.iter(|| codec::decode(black_box(NOTIFICATION)))
    });
    group.finish();
}

fn bench_encode_subscribe(c: &mut Criterion) {
    let message = OutboundMessage::subscribe("case:1024");

    c.bench_function("encode_subscribe", |b| {
        b.iter(|| codec::encode(black_box(&message)))
    });
}

fn bench_encode_custom(c: &mut Criterion) {
    let message = OutboundMessage::custom(
        "typing",
        json!({"case_id": 1024, "user_id": 7, "started": true}),
    );

    c.bench_function("encode_custom", |b| {
        b.iter(|| codec::encode(black_box(&message)))
    });
}

criterion_group!(
    benches,
    bench_decode_notification,
    bench_encode_subscribe,
    bench_encode_custom
);
criterion_main!(benches);
