use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use logview::{render_page, LineStore, LogLines, PageOptions, SensorReport};
use std::io::Write;

fn sample_lines(count: usize) -> LogLines {
    (0..count)
        .map(|i| format!("2024-01-01 12:00:{:02} worker {} finished job <#{}> & moved on", i % 60, i % 8, i))
        .collect()
}

/// Benchmark page rendering for growing log sizes
fn bench_render(c: &mut Criterion) {
    let report = SensorReport::new("coretemp-isa-0000\nAdapter: ISA adapter\nPackage id 0: +45.0°C\n");
    let options = PageOptions::default();

    for count in [10, 1_000, 10_000].iter() {
        let log = Ok(sample_lines(*count));
        c.bench_with_input(BenchmarkId::new("render_page", count), count, |b, _| {
            b.iter(|| render_page(&log, &report, &options))
        });
    }
}

/// Benchmark reading and splitting the log file
fn bench_read(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("Should create tokio runtime");

    let mut file = tempfile::NamedTempFile::new().expect("Should create temp file");
    for line in sample_lines(10_000).iter() {
        writeln!(file, "{}", line).expect("Should write log line");
    }
    let store = LineStore::new(file.path());

    c.bench_function("read_lines_10000", |b| {
        b.to_async(&rt).iter(|| async {
            store.read_lines().await.expect("Should read log file")
        })
    });
}

criterion_group!(benches, bench_render, bench_read);
criterion_main!(benches);
