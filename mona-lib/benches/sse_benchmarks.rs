//! Event stream decoding benchmarks
//!
//! Run with: `cargo bench --bench sse_benchmarks`

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use mona_lib::secure_storage::ValueCipher;
use mona_lib::stream::{extract_payload, SseDecoder};

fn sample_stream(frames: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..frames {
        out.extend_from_slice(
            format!(
                "event: put\ndata: {{\"path\":\"/\",\"data\":{{\"event\":\"progress_update\",\"seq\":{}}}}}\n\n",
                i
            )
            .as_bytes(),
        );
    }
    out
}

/// Decode a stream delivered in small chunks
fn bench_decode_chunked(c: &mut Criterion) {
    let stream = sample_stream(100);
    let mut group = c.benchmark_group("sse_decode");
    group.throughput(Throughput::Bytes(stream.len() as u64));

    for chunk_size in [16usize, 256, 4096] {
        group.bench_function(format!("chunk_{}", chunk_size), |b| {
            b.iter(|| {
                let mut decoder = SseDecoder::new();
                let mut frames = 0;
                for chunk in stream.chunks(chunk_size) {
                    frames += decoder.push(black_box(chunk)).len();
                }
                black_box(frames)
            })
        });
    }
    group.finish();
}

/// Envelope unwrapping of a single frame
fn bench_extract_payload(c: &mut Criterion) {
    let data = r#"{"path":"/","data":{"event":"transaction_completed","transactionRef":"T1"}}"#;
    c.bench_function("extract_payload", |b| {
        b.iter(|| black_box(extract_payload(black_box(data))))
    });
}

/// Sealing a stored token
fn bench_seal_value(c: &mut Criterion) {
    let cipher = ValueCipher::new([9u8; 32]);
    c.bench_function("seal_access_token", |b| {
        b.iter(|| black_box(cipher.seal("mona.accessToken", black_box(b"at_0123456789abcdef"))))
    });
}

criterion_group!(
    benches,
    bench_decode_chunked,
    bench_extract_payload,
    bench_seal_value
);
criterion_main!(benches);
