//! Criterion benchmarks for the stream reader and writer
//!
//! Run with: cargo bench --bench stream_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use scope_stp::messages::{commands, services, ConsoleMessage};
use scope_stp::{
    PayloadFormat, ProtocolVersion, ReaderConfig, StpReader, StpWriter, TransportMessage,
    WriterConfig,
};

fn console_events(count: usize) -> Vec<TransportMessage> {
    (0..count)
        .map(|i| {
            let mut event =
                TransportMessage::event(services::CONSOLE, commands::ON_CONSOLE_MESSAGE)
                    .with_format(PayloadFormat::Json);
            event
                .set_message(&ConsoleMessage::new(1, i as u64, format!("message {i}")))
                .unwrap();
            event
        })
        .collect()
}

fn write_all(messages: &[TransportMessage], version: ProtocolVersion) -> Vec<u8> {
    let config = WriterConfig::default().with_protocol_version(version);
    let mut writer = StpWriter::with_config(Vec::new(), config);
    for message in messages {
        writer.enqueue_message(message.clone()).unwrap();
    }
    writer.into_sink()
}

fn bench_writer(c: &mut Criterion) {
    let messages = console_events(100);
    let mut group = c.benchmark_group("writer");

    for version in [ProtocolVersion::Stp1, ProtocolVersion::Stp0] {
        group.bench_with_input(
            BenchmarkId::new("batch_100", version.as_u8()),
            &messages,
            |b, messages| b.iter(|| black_box(write_all(black_box(messages), version))),
        );
    }

    group.finish();
}

fn bench_reader_chunking(c: &mut Criterion) {
    let messages = console_events(100);
    let mut group = c.benchmark_group("reader");

    for version in [ProtocolVersion::Stp1, ProtocolVersion::Stp0] {
        let stream = write_all(&messages, version);
        group.throughput(Throughput::Bytes(stream.len() as u64));

        for chunk_size in [1usize, 64, 4096] {
            let id = format!("stp{}_chunk", version.as_u8());
            group.bench_with_input(BenchmarkId::new(id, chunk_size), &stream, |b, stream| {
                b.iter(|| {
                    let config = ReaderConfig::default().with_protocol_version(version);
                    let mut reader = StpReader::with_config(Vec::new(), config);
                    for piece in stream.chunks(chunk_size) {
                        reader.on_data_ready(black_box(piece)).unwrap();
                    }
                    black_box(reader.into_handler().len());
                });
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_writer, bench_reader_chunking);
criterion_main!(benches);
