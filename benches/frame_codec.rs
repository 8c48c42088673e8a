//! Frame codec benchmark suite.
//!
//! Benchmarks frame encode and decode at different sizes:
//! - Content: map with 10, 100, 1000 entries
//! - Attachment: 1 KiB, 64 KiB, 1 MiB upload
//!
//! Run with: cargo bench --bench frame_codec
//! Results saved to: target/criterion/

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rmpv::Value;
use sim_msgrouter::ReqSeq;
use sim_msgrouter::protocol::{Attachment, Frame, Header, PROTOCOL_VERSION};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const CONTENT_ENTRIES: &[usize] = &[10, 100, 1000];
const ATTACHMENT_SIZES: &[usize] = &[1 << 10, 64 << 10, 1 << 20];

// ============================================================================
// Fixtures
// ============================================================================

fn reply_frame(entries: usize) -> Frame {
    let content = Value::Map(
        (0..entries)
            .map(|i| (Value::from(format!("field{i}")), Value::from(i as f64 * 0.5)))
            .collect(),
    );
    Frame::new(
        Header::HttpReply {
            req_seq: ReqSeq::new(1),
        }
        .to_wire(PROTOCOL_VERSION),
        content,
    )
}

fn upload_frame(size: usize) -> Frame {
    Frame::new(
        Header::HttpRequest {
            req_seq: ReqSeq::new(1),
            uri: "/upload-lib-file".to_string(),
        }
        .to_wire(PROTOCOL_VERSION),
        Value::Map(vec![(Value::from("simulationType"), Value::from("srw"))]),
    )
    .with_attachment(Attachment::new("beam.dat", vec![0xA5; size]))
}

// ============================================================================
// Benchmark: Content
// ============================================================================

fn bench_content(c: &mut Criterion) {
    let mut group = c.benchmark_group("content");

    for &entries in CONTENT_ENTRIES {
        let frame = reply_frame(entries);
        let bytes = frame.encode().expect("encode");
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_with_input(BenchmarkId::new("encode", entries), &frame, |b, frame| {
            b.iter(|| black_box(frame).encode().expect("encode"));
        });
        group.bench_with_input(BenchmarkId::new("decode", entries), &bytes, |b, bytes| {
            b.iter(|| Frame::decode(black_box(bytes)).expect("decode"));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Attachments
// ============================================================================

fn bench_attachment(c: &mut Criterion) {
    let mut group = c.benchmark_group("attachment");

    for &size in ATTACHMENT_SIZES {
        let frame = upload_frame(size);
        let bytes = frame.encode().expect("encode");
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("encode", size), &frame, |b, frame| {
            b.iter(|| black_box(frame).encode().expect("encode"));
        });
        group.bench_with_input(BenchmarkId::new("decode", size), &bytes, |b, bytes| {
            b.iter(|| Frame::decode(black_box(bytes)).expect("decode"));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_content, bench_attachment);
criterion_main!(benches);
