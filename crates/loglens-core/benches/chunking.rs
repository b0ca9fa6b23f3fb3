//! Benchmarks for log chunking
//! Run: cargo bench -p loglens-core --bench chunking

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use loglens_core::chunker::chunk_logs;
use std::hint::black_box;

const SAMPLE_LINES: &[&str] = &[
    "2024-03-01T10:00:01Z ERROR payment-api connection pool exhausted",
    "2024-03-01T10:00:02Z WARN auth-service token refresh slow (812ms)",
    "2024-03-01T10:00:03Z INFO nginx GET /health 200 1ms",
    "2024-03-01T10:00:04Z ERROR redis connection refused 127.0.0.1:6379",
    "2024-03-01T10:00:05Z FATAL worker-3 out of memory, killing process",
];

fn bench_chunking(c: &mut Criterion) {
    let sizes = [100, 1_000, 10_000];
    let mut group = c.benchmark_group("chunking");

    for size in sizes {
        let raw: String = (0..size)
            .map(|i| SAMPLE_LINES[i % SAMPLE_LINES.len()])
            .collect::<Vec<_>>()
            .join("\n");

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("chunk_logs", size), &raw, |b, raw| {
            b.iter(|| chunk_logs(black_box("bench-corpus"), black_box(raw)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_chunking);
criterion_main!(benches);
