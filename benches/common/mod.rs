use partconv::audio::engine::{Engine, EngineHandle};
use partconv::ir::model::ImpulseResponse;
use partconv::settings::{EngineConfig, IrFormat};

pub const SAMPLE_RATE: u32 = 48000;

/// Decaying 440 Hz sine, `length` taps.
pub fn synthetic_taps(length: usize) -> Vec<f32> {
    (0..length)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            let decay = (-t * 3.0).exp();
            let freq = 440.0 * 2.0 * std::f32::consts::PI;
            (freq * t).sin() * decay
        })
        .collect()
}

pub fn bench_config(channels: usize, quantum: usize, workers: usize) -> EngineConfig {
    EngineConfig {
        channels,
        sample_rate: SAMPLE_RATE,
        ir_format: IrFormat::Mono,
        min_partition: quantum,
        max_partition: 8192,
        workers,
        ..EngineConfig::default()
    }
}

pub fn build_engine(config: EngineConfig, ir_length: usize) -> (Engine<f32>, EngineHandle<f32>) {
    let (mut engine, handle) = Engine::new(config).unwrap();
    let ir = ImpulseResponse::mono(&synthetic_taps(ir_length)).unwrap();
    engine.load_bank(0, &ir).unwrap();
    (engine, handle)
}
