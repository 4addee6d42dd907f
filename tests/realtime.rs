use anyhow::Result;
use assert_no_alloc::{AllocDisabler, assert_no_alloc};
use partconv::audio::block::AudioBlock;
use partconv::audio::engine::Engine;
use partconv::audio::stream::StreamAdapter;
use partconv::error::Error;
use partconv::ir::model::ImpulseResponse;
use partconv::settings::EngineConfig;

#[global_allocator]
static ALLOCATOR: AllocDisabler = AllocDisabler;

/// Runs `f` with allocation forbidden and fails if it allocated anyway.
fn without_allocation<R>(f: impl FnOnce() -> R) -> R {
    #[cfg(debug_assertions)]
    assert_no_alloc::reset_violation_count();

    let result = assert_no_alloc(f);

    #[cfg(debug_assertions)]
    assert_eq!(assert_no_alloc::violation_count(), 0);

    result
}

fn stereo_ir(decay: f32, gain: f32) -> Result<ImpulseResponse<f32>> {
    let taps: Vec<f32> = (0..6_000).map(|i| decay.powi(i) * gain).collect();
    Ok(ImpulseResponse::from_channels(vec![taps.clone(), taps])?)
}

fn render(
    engine: &mut Engine<f32>,
    input: &AudioBlock<f32>,
    output: &mut AudioBlock<f32>,
    results: &mut Vec<partconv::Result<()>>,
    quanta: usize,
) {
    without_allocation(|| {
        for _ in 0..quanta {
            results.push(engine.process(input, output));
        }
    });
}

#[test]
fn steady_processing_does_not_allocate() -> Result<()> {
    let config = EngineConfig {
        channels: 2,
        min_partition: 64,
        max_partition: 1024,
        bank_count: 2,
        ..EngineConfig::default()
    };
    let (mut engine, _) = Engine::<f32>::new(config)?;
    engine.load_bank(0, &stereo_ir(0.999, 0.01)?)?;

    let input = AudioBlock::from_channels(vec![vec![0.25f32; 64]; 2])?;
    let mut output = AudioBlock::new(2, 64);

    let mut results = Vec::with_capacity(200);
    render(&mut engine, &input, &mut output, &mut results, 200);

    assert!(results.iter().all(|r| r.is_ok()));
    assert!(output.channel(0).iter().any(|&s| s != 0.0));
    Ok(())
}

#[test]
fn commands_and_transitions_do_not_allocate() -> Result<()> {
    let config = EngineConfig {
        channels: 2,
        min_partition: 64,
        max_partition: 1024,
        bank_count: 3,
        ..EngineConfig::default()
    };
    let (mut engine, handle) = Engine::<f32>::new(config)?;
    engine.load_bank(0, &stereo_ir(0.999, 0.01)?)?;
    engine.load_bank(1, &stereo_ir(0.998, 0.02)?)?;

    let input = AudioBlock::from_channels(vec![vec![0.25f32; 64]; 2])?;
    let mut output = AudioBlock::new(2, 64);
    let mut results = Vec::with_capacity(200);

    render(&mut engine, &input, &mut output, &mut results, 10);

    // Fill an empty slot, then replace it while it is idle
    handle.load_bank(2, stereo_ir(0.997, 0.01)?)?;
    render(&mut engine, &input, &mut output, &mut results, 2);
    handle.load_bank(2, stereo_ir(0.996, 0.03)?)?;
    render(&mut engine, &input, &mut output, &mut results, 2);
    assert!(handle.status().loaded_banks[2]);
    assert!(matches!(
        handle.load_bank(0, stereo_ir(0.995, 0.01)?),
        Err(Error::BankBusy(0))
    ));

    // The new bank primes over its whole span before the blend
    handle.select_bank(1)?;
    render(&mut engine, &input, &mut output, &mut results, 1);
    assert!(handle.status().transitioning);
    render(&mut engine, &input, &mut output, &mut results, 159);
    let status = handle.status();
    assert!(!status.transitioning);
    assert_eq!(status.selected_bank, 1);

    handle.set_bypass(true)?;
    render(&mut engine, &input, &mut output, &mut results, 4);
    assert!(handle.status().bypassed);
    handle.set_bypass(false)?;
    render(&mut engine, &input, &mut output, &mut results, 4);
    let status = handle.status();
    assert!(!status.bypassed);
    assert!(!status.transitioning);

    assert_eq!(results.len(), 182);
    assert!(results.iter().all(|r| r.is_ok()));
    assert!(output.channel(1).iter().any(|&s| s != 0.0));
    Ok(())
}

#[test]
fn stream_adapter_pull_does_not_allocate() -> Result<()> {
    let config = EngineConfig {
        channels: 1,
        min_partition: 32,
        max_partition: 256,
        ..EngineConfig::default()
    };
    let (mut engine, _) = Engine::<f64>::new(config)?;
    let taps: Vec<f64> = (0..2_000).map(|i| 0.998f64.powi(i)).collect();
    engine.load_bank(0, &ImpulseResponse::mono(&taps)?)?;

    let mut adapter = StreamAdapter::for_engine(&engine);
    let mut output = AudioBlock::new(1, 32);
    let host = vec![0.5f64; 20];
    let mut pulled = 0usize;

    // Buffer growth happens on the first pushes; after that the FIFO is reused
    for _ in 0..16 {
        adapter.push(&[&host[..]])?;
        while adapter.pull(&mut engine, &mut output)? {}
    }

    without_allocation(|| {
        for _ in 0..100 {
            if adapter.push(&[&host[..]]).is_ok() {
                while let Ok(true) = adapter.pull(&mut engine, &mut output) {
                    pulled += 1;
                }
            }
        }
    });

    assert!(pulled >= 60);
    Ok(())
}
