//! Codec benchmarks for peerplay-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use peerplay_protocol::{codec, Packet};
use serde_json::json;

fn chat_packet() -> Packet {
    Packet::new(
        "chat",
        json!({"roomId": "movie-night", "user": "alice", "text": "x".repeat(64)}),
    )
}

fn bench_text(c: &mut Criterion) {
    let packet = chat_packet();
    let text = codec::encode_text(&packet).unwrap();

    let mut group = c.benchmark_group("text");
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("encode_chat", |b| {
        b.iter(|| codec::encode_text(black_box(&packet)))
    });
    group.bench_function("decode_chat", |b| b.iter(|| codec::decode_text(black_box(&text))));
    group.finish();
}

fn bench_binary(c: &mut Criterion) {
    let packet = chat_packet();
    let encoded = codec::encode(&packet).unwrap();

    let mut group = c.benchmark_group("binary");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("encode_chat", |b| b.iter(|| codec::encode(black_box(&packet))));
    group.bench_function("decode_chat", |b| b.iter(|| codec::decode(black_box(&encoded))));
    group.finish();
}

criterion_group!(benches, bench_text, bench_binary);
criterion_main!(benches);
