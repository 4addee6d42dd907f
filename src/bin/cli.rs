use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{info, warn};
use partconv::audio::block::AudioBlock;
use partconv::audio::engine::Engine;
use partconv::audio::stream::StreamAdapter;
use partconv::ir::bank::{Bank, BankId};
use partconv::ir::convolver::{DirectConvolver, Sample};
use partconv::ir::model::ImpulseResponse;
use partconv::settings::{EngineConfig, IrFormat, LoadStrategy, Precision};
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PrecisionArg {
    Single,
    Double,
}

#[derive(Parser, Debug)]
#[command(name = "partconv")]
#[command(version)]
#[command(about = "Renders a test signal through the partitioned convolution engine.")]
struct Args {
    #[arg(long, env = "PARTCONV_CONFIG", help = "Engine config JSON file")]
    config: Option<PathBuf>,
    #[arg(long, help = "Override channel count")]
    channels: Option<usize>,
    #[arg(long, help = "Override sample rate")]
    sample_rate: Option<u32>,
    #[arg(long, help = "Override minimum partition size")]
    min_partition: Option<usize>,
    #[arg(long, help = "Override maximum partition size")]
    max_partition: Option<usize>,
    #[arg(long, env = "PARTCONV_WORKERS", help = "Override worker thread count")]
    workers: Option<usize>,
    #[arg(long, value_enum, help = "Override sample precision")]
    precision: Option<PrecisionArg>,
    #[arg(long, help = "Override bank count")]
    banks: Option<usize>,
    #[arg(long, help = "Build banks on first selection")]
    on_demand: bool,
    #[arg(long, default_value_t = 1.0, help = "Synthetic IR length in seconds")]
    ir_seconds: f64,
    #[arg(long, default_value_t = 5.0, help = "Rendered signal length in seconds")]
    duration: f64,
    #[arg(long, default_value_t = 441, help = "Host block size fed to the stream adapter")]
    host_block: usize,
    #[arg(long, help = "Switch to the next bank after this many seconds")]
    switch_at: Option<f64>,
    #[arg(long, help = "Compare the start of the output against direct convolution")]
    verify: bool,
    #[arg(long, default_value_t = 8192, help = "Frames checked by --verify")]
    verify_frames: usize,
    #[arg(long, help = "Print the effective config as JSON and exit")]
    dump_config: bool,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    info!("partconv v{}", env!("CARGO_PKG_VERSION"));
    info!("Args: {:?}", args);

    let config = build_config(&args)?;

    if args.dump_config {
        println!("{}", config.to_json()?);
        return Ok(());
    }

    info!("Config:\n{config}");

    match config.precision {
        Precision::Single => run::<f32>(&args, config),
        Precision::Double => run::<f64>(&args, config),
    }
}

fn build_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("failed to read config '{}'", path.display()))?;
            EngineConfig::from_json(&json)
                .with_context(|| format!("invalid config '{}'", path.display()))?
        }
        None => EngineConfig::default(),
    };

    if let Some(channels) = args.channels {
        config.channels = channels;
    }
    if let Some(sample_rate) = args.sample_rate {
        config.sample_rate = sample_rate;
    }
    if let Some(min) = args.min_partition {
        config.min_partition = min;
    }
    if let Some(max) = args.max_partition {
        config.max_partition = max;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(precision) = args.precision {
        config.precision = match precision {
            PrecisionArg::Single => Precision::Single,
            PrecisionArg::Double => Precision::Double,
        };
    }
    if let Some(banks) = args.banks {
        config.bank_count = banks;
        config.selected_bank = config.selected_bank.min(banks.saturating_sub(1));
    }
    if args.on_demand {
        config.load_strategy = LoadStrategy::OnDemand;
    }

    config.validate().context("invalid engine config")?;
    Ok(config)
}

/// Exponentially decaying sine, one variant per bank and channel.
fn synthetic_ir<T: Sample>(
    bank: usize,
    config: &EngineConfig,
    seconds: f64,
) -> Result<ImpulseResponse<T>> {
    let sample_rate = config.sample_rate as f64;
    let len = ((seconds * sample_rate) as usize).clamp(1, config.max_ir_taps());
    let ir_channels = match config.ir_format {
        IrFormat::Mono => 1,
        IrFormat::Input => config.channels,
    };

    let channels = (0..ir_channels)
        .map(|ch| {
            let freq = 220.0 * (bank + 1) as f64 + 30.0 * ch as f64;
            let decay = 3.0 + bank as f64;
            (0..len)
                .map(|i| {
                    let t = i as f64 / sample_rate;
                    T::lit((2.0 * std::f64::consts::PI * freq * t).sin() * (-t * decay).exp())
                })
                .collect()
        })
        .collect();

    ImpulseResponse::from_channels(channels).context("failed to build synthetic IR")
}

fn chirp<T: Sample>(channel: usize, frames: usize, sample_rate: f64) -> Vec<T> {
    let duration = frames as f64 / sample_rate;
    let (f0, f1) = (40.0, sample_rate * 0.4);
    (0..frames)
        .map(|i| {
            let t = i as f64 / sample_rate;
            let sweep = f0 * t + (f1 - f0) * t * t / (2.0 * duration);
            let phase = 2.0 * std::f64::consts::PI * sweep;
            T::lit(0.5 * (phase + channel as f64 * 0.25).sin())
        })
        .collect()
}

fn run<T: Sample>(args: &Args, config: EngineConfig) -> Result<()> {
    let (mut engine, handle) =
        Engine::<T>::new(config.clone()).context("failed to create engine")?;
    let quantum = engine.quantum();

    let build_start = Instant::now();
    for bank in 0..config.bank_count {
        let ir = synthetic_ir::<T>(bank, &config, args.ir_seconds)?;
        let loaded = match config.load_strategy {
            LoadStrategy::Eager => engine.load_bank(bank, &ir),
            LoadStrategy::OnDemand => handle.load_bank(bank, ir),
        };
        loaded.with_context(|| format!("failed to load bank {bank}"))?;
    }
    if config.load_strategy == LoadStrategy::OnDemand {
        handle
            .select_bank(config.selected_bank)
            .context("failed to build the initial bank")?;
    }
    info!(
        "Loaded {} bank(s) in {:.1} ms",
        config.bank_count,
        build_start.elapsed().as_secs_f64() * 1000.0
    );

    let sample_rate = config.sample_rate as f64;
    let frames = ((args.duration * sample_rate) as usize).max(1);
    let input: Vec<Vec<T>> = (0..config.channels)
        .map(|ch| chirp(ch, frames, sample_rate))
        .collect();
    let mut rendered: Vec<Vec<T>> = (0..config.channels)
        .map(|_| Vec::with_capacity(frames + quantum))
        .collect();

    let switch_frame = args
        .switch_at
        .filter(|_| config.bank_count > 1)
        .map(|s| (s * sample_rate) as usize);

    let mut adapter = StreamAdapter::for_engine(&engine);
    let mut output = AudioBlock::new(config.channels, quantum);
    let host_block = args.host_block.max(1);
    let mut switched = false;

    let render_start = Instant::now();
    let mut pos = 0;
    while pos < frames {
        if let Some(at) = switch_frame
            && !switched
            && pos >= at
        {
            let next = (config.selected_bank + 1) % config.bank_count;
            info!("Switching to bank {next} at frame {pos}");
            handle.select_bank(next)?;
            switched = true;
        }

        let end = (pos + host_block).min(frames);
        let block: Vec<&[T]> = input.iter().map(|c| &c[pos..end]).collect();
        adapter.push(&block)?;
        pos = end;

        while adapter.pull(&mut engine, &mut output)? {
            for (dst, src) in rendered.iter_mut().zip(output.channels()) {
                dst.extend_from_slice(src);
            }
        }
    }

    let tail = adapter.flush(&mut engine, &mut output)?;
    for (dst, src) in rendered.iter_mut().zip(output.channels()) {
        dst.extend_from_slice(&src[..tail]);
    }

    let elapsed = render_start.elapsed().as_secs_f64();
    let audio_seconds = frames as f64 / sample_rate;
    info!(
        "Rendered {frames} frames x {} channel(s) in {:.3} s ({:.1}x realtime)",
        config.channels,
        elapsed,
        audio_seconds / elapsed.max(f64::EPSILON)
    );

    let peak = rendered
        .iter()
        .flatten()
        .fold(0.0f64, |acc, s| acc.max(s.as_f64().abs()));
    info!("Output peak: {:.4}", peak);

    if args.verify {
        let limit = switch_frame.unwrap_or(frames).min(args.verify_frames).min(frames);
        verify(&config, args, &input[0], &rendered[0][..limit])?;
    }

    info!("Final status: {:?}", handle.status());
    Ok(())
}

fn verify<T: Sample>(
    config: &EngineConfig,
    args: &Args,
    input: &[T],
    rendered: &[T],
) -> Result<()> {
    let id = BankId::new(config.selected_bank, config.bank_count)?;
    let ir = synthetic_ir::<T>(config.selected_bank, config, args.ir_seconds)?;
    let bank = Bank::build(id, &ir, config)?;

    let dry = T::lit(config.dry_gain);
    let wet = config.wet_gain;
    let mut direct = DirectConvolver::new(bank.response().channel(0));

    let max_error = input
        .iter()
        .zip(rendered)
        .map(|(&x, &y)| {
            let expected = direct.process_sample(x * dry).as_f64() * wet;
            (expected - y.as_f64()).abs()
        })
        .fold(0.0f64, f64::max);

    let tolerance = match config.precision {
        Precision::Single => 1e-3,
        Precision::Double => 1e-9,
    };

    if max_error > tolerance {
        anyhow::bail!(
            "output differs from direct convolution by {max_error:e} (tolerance {tolerance:e})"
        );
    }
    if rendered.is_empty() {
        warn!("Nothing to verify");
    } else {
        info!(
            "Verified {} frames against direct convolution, max error {:e}",
            rendered.len(),
            max_error
        );
    }
    Ok(())
}
