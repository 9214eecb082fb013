use std::{
    f64::consts::PI,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use clap::{Args, Parser, Subcommand};
use spectral_bars_core::{AnalysisConfig, AnalysisPipeline, SampleProducer, VisualiserError};
use tracing_subscriber::EnvFilter;

/// Frames per block handed to the producer, roughly what an audio callback
/// delivers.
const BLOCK_FRAMES: usize = 512;

fn main() -> spectral_bars_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Tone(options) => run_tone(options),
        Commands::Defaults => print_defaults(),
    }
}

fn run_tone(options: ToneOptions) -> spectral_bars_core::Result<()> {
    if options.sample_rate == 0 || options.channels == 0 || options.fps == 0 {
        return Err(format!(
            "sample rate ({}), channel count ({}) and fps ({}) must all be positive",
            options.sample_rate, options.channels, options.fps
        )
        .into());
    }

    let config = match &options.config {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };
    let band_count = options.bands.unwrap_or(config.band_count);
    if band_count == 0 {
        return Err("band count must be at least 1".into());
    }

    tracing::info!(
        frequency = options.frequency,
        sample_rate = options.sample_rate,
        channels = options.channels,
        band_count,
        "starting tone analysis"
    );

    let mut pipeline = AnalysisPipeline::new(config)?;
    pipeline.attach_source(options.sample_rate);

    let stop = Arc::new(AtomicBool::new(false));
    let producer = spawn_tone_producer(pipeline.producer(), &options, stop.clone());

    let frame_budget = Duration::from_secs_f64(1.0 / f64::from(options.fps));
    let mut last_frame = Instant::now();
    for frame in 0..options.frames {
        thread::sleep(frame_budget);
        let now = Instant::now();
        let delta = now.duration_since(last_frame).as_secs_f32();
        last_frame = now;

        let bands = pipeline.advance_frame(options.sample_rate, band_count, delta);
        if frame % options.fps as usize == 0 {
            if let Some(loudest) = bands.loudest() {
                tracing::info!(
                    frame,
                    loudest,
                    value = bands.values()[loudest],
                    bass_energy = bands.bass_energy(),
                    "analysed frame"
                );
            }
        }
    }

    stop.store(true, Ordering::Release);
    producer
        .join()
        .map_err(|_| VisualiserError::msg("tone producer thread panicked"))?;
    pipeline.detach_source();

    if let Some(layout) = pipeline.layout() {
        let expected = layout.band_containing(options.frequency as f32);
        tracing::info!(
            sample_rate = layout.sample_rate(),
            band_count = layout.band_count(),
            ?expected,
            loudest = ?pipeline.bands().loudest(),
            "finished tone analysis"
        );
    }

    if options.json {
        println!("{}", serde_json::to_string_pretty(pipeline.bands())?);
    }

    Ok(())
}

/// Plays the role of the audio callback: pushes interleaved blocks at the
/// real-time rate until `stop` is raised. Channel 0 carries the requested
/// tone, the other channels an octave above it.
fn spawn_tone_producer(
    producer: SampleProducer,
    options: &ToneOptions,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    let rate = f64::from(options.sample_rate);
    let channels = options.channels;
    let frequency = options.frequency;
    let block_duration = Duration::from_secs_f64(BLOCK_FRAMES as f64 / rate);

    thread::spawn(move || {
        let mut block = vec![0.0_f32; BLOCK_FRAMES * channels];
        let mut position: u64 = 0;

        while !stop.load(Ordering::Acquire) {
            for frame in block.chunks_exact_mut(channels) {
                let t = position as f64 / rate;
                frame[0] = (0.8 * (2.0 * PI * frequency * t).sin()) as f32;
                for sample in &mut frame[1..] {
                    *sample = (0.5 * (4.0 * PI * frequency * t).sin()) as f32;
                }
                position += 1;
            }

            producer.push_frames(&block, BLOCK_FRAMES, channels);
            thread::sleep(block_duration);
        }
    })
}

fn print_defaults() -> spectral_bars_core::Result<()> {
    println!("{}", AnalysisConfig::default().to_json_pretty()?);
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Spectrum bar analysis driver", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyse a synthetic sine tone pushed from a producer thread.
    Tone(ToneOptions),
    /// Print the default analysis configuration as JSON.
    Defaults,
}

#[derive(Args, Debug)]
struct ToneOptions {
    /// Tone frequency in Hz.
    #[arg(short, long, default_value_t = 440.0)]
    frequency: f64,
    /// Sample rate of the synthetic source.
    #[arg(short, long, default_value_t = 44_100)]
    sample_rate: u32,
    /// Interleaved channels per frame. Only channel 0 is analysed.
    #[arg(short, long, default_value_t = 2)]
    channels: usize,
    /// Band count; defaults to the configured one.
    #[arg(short, long)]
    bands: Option<usize>,
    /// Number of visual frames to run.
    #[arg(long, default_value_t = 180)]
    frames: usize,
    /// Visual frame rate.
    #[arg(long, default_value_t = 60)]
    fps: u32,
    /// Optional JSON analysis configuration.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print the final bands as JSON.
    #[arg(long)]
    json: bool,
}
