use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use partconv::audio::block::AudioBlock;
use partconv::ir::model::ImpulseResponse;

mod common;
use common::{SAMPLE_RATE, bench_config, build_engine, synthetic_taps};

const QUANTUM: usize = 128;
const IR_LENGTH: usize = SAMPLE_RATE as usize;

fn bench_engine_channels(c: &mut Criterion) {
    let mut group = c.benchmark_group("Engine Channels");

    for &channels in &[1, 2, 8] {
        group.bench_with_input(
            BenchmarkId::from_parameter(channels),
            &channels,
            |b, &channels| {
                let (mut engine, _) = build_engine(bench_config(channels, QUANTUM, 0), IR_LENGTH);

                let input =
                    AudioBlock::from_channels(vec![vec![0.5f32; QUANTUM]; channels]).unwrap();
                let mut output = AudioBlock::new(channels, QUANTUM);

                for _ in 0..10 {
                    engine.process(&input, &mut output).unwrap();
                }

                b.iter(|| {
                    engine
                        .process(black_box(&input), black_box(&mut output))
                        .unwrap();
                });
            },
        );
    }

    group.finish();
}

fn bench_engine_workers(c: &mut Criterion) {
    let mut group = c.benchmark_group("Engine Workers (8 channels)");
    let channels = 8;

    for &workers in &[0, 2, 4] {
        group.bench_with_input(
            BenchmarkId::from_parameter(workers),
            &workers,
            |b, &workers| {
                let config = bench_config(channels, QUANTUM, workers);
                let (mut engine, _) = build_engine(config, IR_LENGTH);

                let input =
                    AudioBlock::from_channels(vec![vec![0.5f32; QUANTUM]; channels]).unwrap();
                let mut output = AudioBlock::new(channels, QUANTUM);

                for _ in 0..10 {
                    engine.process(&input, &mut output).unwrap();
                }

                b.iter(|| {
                    engine
                        .process(black_box(&input), black_box(&mut output))
                        .unwrap();
                });
            },
        );
    }

    group.finish();
}

fn bench_engine_crossfade(c: &mut Criterion) {
    let mut group = c.benchmark_group("Engine Crossfade");

    for &quantum in &[64, 256] {
        group.bench_with_input(
            BenchmarkId::from_parameter(quantum),
            &quantum,
            |b, &quantum| {
                let config = partconv::EngineConfig {
                    bank_count: 2,
                    ..bench_config(2, quantum, 0)
                };
                let (mut engine, _) = build_engine(config, IR_LENGTH);
                let ir = ImpulseResponse::mono(&synthetic_taps(IR_LENGTH / 2)).unwrap();
                engine.load_bank(1, &ir).unwrap();

                let input = AudioBlock::from_channels(vec![vec![0.5f32; quantum]; 2]).unwrap();
                let mut output = AudioBlock::new(2, quantum);
                let mut target = 1;

                // Each iteration starts a transition and renders its first quantum
                b.iter(|| {
                    engine.select_bank(target).unwrap();
                    target = 1 - target;
                    engine
                        .process(black_box(&input), black_box(&mut output))
                        .unwrap();
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_engine_channels,
    bench_engine_workers,
    bench_engine_crossfade
);
criterion_main!(benches);
