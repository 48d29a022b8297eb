//! Criterion benchmarks for the frame envelope.
//!
//! Every relayed line is sealed once by its sender and opened once by each
//! recipient, so seal/open latency bounds how fast HQ can fan out chat.
//!
//! Run with:
//! ```bash
//! cargo bench --package shield-core --bench cipher_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use shield_core::crypto::derive;
use shield_core::protocol::message::Message;
use shield_core::Envelope;

// ── Payload fixtures ──────────────────────────────────────────────────────────

fn payloads() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("token", b"AUTH_REQUEST".to_vec()),
        ("chat", Message::chat_line("AGENT_12", "moving to the north gate").into_bytes()),
        ("radio_1k", Message::radio_line("AGENT_12", &"x".repeat(1024)).into_bytes()),
        ("max_4k", vec![b'a'; 4096]),
    ]
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_derive(c: &mut Criterion) {
    c.bench_function("derive", |b| {
        b.iter(|| derive(black_box("ALPHA-77")).expect("derive must succeed"))
    });
}

fn bench_seal(c: &mut Criterion) {
    let env = Envelope::sealed("ALPHA-77").expect("derive must succeed for benchmark setup");
    let mut group = c.benchmark_group("seal_frame");
    for (name, payload) in payloads() {
        group.bench_with_input(BenchmarkId::new("payload", name), &payload, |b, p| {
            b.iter(|| env.seal_frame(black_box(p)).expect("seal must succeed"))
        });
    }
    group.finish();
}

fn bench_open(c: &mut Criterion) {
    let env = Envelope::sealed("ALPHA-77").expect("derive must succeed for benchmark setup");
    let mut group = c.benchmark_group("open_frame");
    for (name, payload) in payloads() {
        let body = env.seal_frame(&payload).expect("seal must succeed for benchmark setup");
        group.bench_with_input(BenchmarkId::new("payload", name), &body, |b, body| {
            b.iter(|| env.open_frame(black_box(body)).expect("open must succeed"))
        });
    }
    group.finish();
}

/// Opening under the wrong key is what a mis-keyed agent does to every beacon.
fn bench_open_wrong_key(c: &mut Criterion) {
    let tx = Envelope::sealed("ALPHA-77").expect("derive must succeed for benchmark setup");
    let rx = Envelope::sealed("WRONG").expect("derive must succeed for benchmark setup");
    let body = tx.seal_frame(b"AUTH_REQUEST").expect("seal must succeed for benchmark setup");
    c.bench_function("open_frame_wrong_key", |b| {
        b.iter(|| rx.open_frame(black_box(&body)).is_err())
    });
}

criterion_group!(benches, bench_derive, bench_seal, bench_open, bench_open_wrong_key);
criterion_main!(benches);
