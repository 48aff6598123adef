//! Benchmark frame encoding and stream decoding

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

use lan_sensor_streamer::codec::{encode_frame, FrameDecoder, FrameEncoder};
use lan_sensor_streamer::protocol::{pack_adc_sample, Frame, SourceKind};

fn audio_frame(samples: usize) -> Frame {
    let samples = (0..samples).map(|i| ((i * 37) % 65536) as i16).collect();
    Frame::new(SourceKind::Audio, 123_456, samples).unwrap()
}

fn adc_frame(samples: usize) -> Frame {
    let samples = (0..samples)
        .map(|i| pack_adc_sample(2 + (i % 2) as u8, (i * 13 % 4096) as u16))
        .collect();
    Frame::new(SourceKind::Adc, 654_321, samples).unwrap()
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    for &samples in &[16usize, 128, 256] {
        let frame = audio_frame(samples);
        group.throughput(Throughput::Bytes(frame.wire_len() as u64));
        group.bench_with_input(BenchmarkId::new("encoder", samples), &frame, |b, frame| {
            let mut encoder = FrameEncoder::new();
            b.iter(|| black_box(encoder.encode(black_box(frame))));
        });
        group.bench_with_input(BenchmarkId::new("contiguous", samples), &frame, |b, frame| {
            b.iter(|| black_box(encode_frame(black_box(frame))));
        });
    }
    group.finish();
}

fn bench_decode_stream(c: &mut Criterion) {
    // One second of reference traffic: ~94 audio and ~63 ADC frames
    let mut stream = Vec::new();
    for i in 0..157 {
        let frame = if i % 3 == 2 { adc_frame(256) } else { audio_frame(256) };
        stream.extend_from_slice(&encode_frame(&frame));
    }

    let mut group = c.benchmark_group("decode_stream");
    group.throughput(Throughput::Bytes(stream.len() as u64));
    for &chunk in &[64usize, 1460, 8192] {
        group.bench_with_input(BenchmarkId::new("chunk", chunk), &chunk, |b, &chunk| {
            b.iter(|| {
                let mut decoder = FrameDecoder::new();
                let mut count = 0;
                for piece in stream.chunks(chunk) {
                    count += decoder.feed(piece).map(|f| f.len()).unwrap_or(0);
                }
                black_box(count)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode_stream);
criterion_main!(benches);
