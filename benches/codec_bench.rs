//! Criterion benchmarks for the payload codecs
//!
//! Run with: cargo bench --bench codec_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use scope_stp::codec::{self, binary};
use scope_stp::messages::{ConsoleMessage, Severity, WindowInfo, WindowList};
use scope_stp::{DynamicMessage, PayloadFormat};

fn console_full() -> ConsoleMessage {
    let mut msg = ConsoleMessage::new(3, 1_700_000_000_000, "Uncaught TypeError: x is undefined");
    msg.set_uri("http://example.com/static/app.js");
    msg.set_line(1337);
    msg.set_severity(Severity::Error);
    msg.set_context("window.onload");
    msg
}

fn window_list(count: u32) -> WindowList {
    let mut list = WindowList::default();
    list.windows = (0..count)
        .map(|id| WindowInfo::new(id, format!("Window number {id}")))
        .collect();
    list
}

fn bench_console_formats(c: &mut Criterion) {
    let msg = console_full();
    let mut formats = vec![PayloadFormat::Binary, PayloadFormat::Json];
    if cfg!(feature = "xml") {
        formats.push(PayloadFormat::Xml);
    }

    let mut group = c.benchmark_group("console_encode");
    for format in &formats {
        group.bench_with_input(BenchmarkId::from_parameter(format.name()), format, |b, format| {
            b.iter(|| {
                let bytes = codec::encode(black_box(&msg), *format).unwrap();
                black_box(bytes);
            });
        });
    }
    group.finish();

    let mut group = c.benchmark_group("console_decode");
    for format in &formats {
        let bytes = codec::encode(&msg, *format).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(format.name()), &bytes, |b, bytes| {
            b.iter(|| {
                let mut decoded = ConsoleMessage::default();
                codec::decode(&mut decoded, *format, black_box(bytes)).unwrap();
                black_box(decoded);
            });
        });
    }
    group.finish();
}

fn bench_repeated_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("window_list");

    for count in [1u32, 16, 256] {
        let list = window_list(count);
        let wire = binary::encode(&list).unwrap();

        group.bench_with_input(BenchmarkId::new("encode", count), &list, |b, list| {
            b.iter(|| black_box(binary::encode(black_box(list)).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("decode_concrete", count), &wire, |b, wire| {
            b.iter(|| {
                let mut decoded = WindowList::default();
                binary::decode(&mut decoded, black_box(wire)).unwrap();
                black_box(decoded);
            });
        });
        group.bench_with_input(BenchmarkId::new("decode_dynamic", count), &wire, |b, wire| {
            b.iter(|| {
                let mut decoded = DynamicMessage::new(WindowList::descriptor());
                binary::decode(&mut decoded, black_box(wire)).unwrap();
                black_box(decoded);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_console_formats, bench_repeated_sizes);
criterion_main!(benches);
