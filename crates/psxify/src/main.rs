//! psxify: degrade an image into a retro console rendering.
//!
//! Loads an image file, runs the effects pipeline with configurable
//! parameters, and writes the result. Optional diagnostics show per-stage
//! timing and what each stage did, which is useful for:
//!
//! - Comparing Bayer and PSX dithering on the same source
//! - Tuning pixel size, palette size and noise against each other
//! - Measuring per-stage durations on large sources
//! - Dumping every intermediate buffer for side-by-side inspection
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin psxify -- [OPTIONS] <INPUT> -o <OUTPUT>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod loader;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser, ValueEnum};
use psxify_pipeline::diagnostics::{PipelineDiagnostics, SystemClock};
use psxify_pipeline::{
    DitherType, EffectConfig, FrameLoader, Orchestrator, Pipeline, PipelineError, PipelineResult,
    PipelineStage, RasterBuffer, ResizeFilter, RunOutcome, SimplexNoise,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::loader::FileLoader;

/// Retro console effects for still images.
///
/// Pixelates, palettizes, dithers, wobbles and adds grain to an image the
/// way early 3D consoles did, then writes the result.
#[derive(Parser)]
#[command(name = "psxify", version)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP, GIF).
    input: PathBuf,

    /// Where to write the result; the extension picks the format.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Mosaic size in percent of the output (1 disables pixelation).
    #[arg(long, default_value_t = EffectConfig::DEFAULT_PIXEL_SIZE)]
    pixel_size: u32,

    /// Luminance palette entries (256 disables the palette stage).
    #[arg(long, default_value_t = EffectConfig::DEFAULT_PALETTE_SIZE)]
    palette_size: u32,

    /// Enable ordered dithering.
    #[arg(long)]
    dither: bool,

    /// Dither algorithm.
    #[arg(long, value_enum, default_value_t = Dither::Bayer)]
    dither_type: Dither,

    /// Bayer quantization levels per channel.
    #[arg(long, default_value_t = EffectConfig::DEFAULT_DITHER_DEPTH)]
    dither_depth: u32,

    /// Bayer bias strength.
    #[arg(long, default_value_t = EffectConfig::DEFAULT_DITHER_INTENSITY)]
    dither_intensity: f64,

    /// Enable per-quad vertex wobble.
    #[arg(long)]
    wobble: bool,

    /// Maximum wobble offset in pixels.
    #[arg(long, default_value_t = EffectConfig::DEFAULT_VERTEX_INTENSITY)]
    vertex_intensity: f64,

    /// Enable the affine perspective smear.
    #[arg(long)]
    perspective: bool,

    /// Horizontal stretch added at the bottom row.
    #[arg(long, default_value_t = EffectConfig::DEFAULT_PERSPECTIVE_INTENSITY)]
    perspective_intensity: f64,

    /// Noise frequency and opacity (0 disables the overlay).
    #[arg(long, default_value_t = EffectConfig::DEFAULT_NOISE_SCALE)]
    noise_scale: f64,

    /// Output width bound in pixels (0 for unbounded).
    #[arg(long, default_value_t = EffectConfig::DEFAULT_MAX_WIDTH)]
    max_width: u32,

    /// Output height bound in pixels (0 for unbounded).
    #[arg(long, default_value_t = EffectConfig::DEFAULT_MAX_HEIGHT)]
    max_height: u32,

    /// Filter used when fitting the source into the bounds.
    #[arg(long, value_enum, default_value_t = Filter::Triangle)]
    resize_filter: Filter,

    /// Read the full effect config from a JSON file.
    ///
    /// When provided, all other effect flags are ignored. Missing fields
    /// take their defaults.
    #[arg(long, conflicts_with = "config_json")]
    config: Option<PathBuf>,

    /// Full effect config as a JSON string.
    ///
    /// When provided, all other effect flags are ignored. Missing fields
    /// take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Seed for noise and wobble; runs with the same seed are identical.
    #[arg(long)]
    seed: Option<u64>,

    /// Print a per-stage diagnostics report.
    #[arg(long)]
    report: bool,

    /// Print diagnostics as JSON instead of a human-readable report.
    #[arg(long)]
    json: bool,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Write every intermediate stage buffer as PNG into this directory.
    #[arg(long)]
    stages: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    /// `RUST_LOG` takes precedence when set.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Dither algorithm selection.
#[derive(Clone, Copy, ValueEnum)]
enum Dither {
    /// 8x8 Bayer threshold matrix.
    Bayer,
    /// 2x2 console floor/ceil pattern.
    Psx,
}

/// Resize filter selection.
#[derive(Clone, Copy, ValueEnum)]
enum Filter {
    /// Nearest-neighbor (fastest, blocky).
    Nearest,
    /// Bilinear interpolation (fast, decent quality).
    Triangle,
    /// Bicubic Catmull-Rom (moderate, good quality).
    CatmullRom,
    /// Gaussian (moderate, smooth).
    Gaussian,
    /// Lanczos with 3 lobes (slowest, sharpest).
    Lanczos3,
}

/// Errors surfaced by the command line front end.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {origin}: {source}")]
    ConfigParse {
        origin: String,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize diagnostics: {0}")]
    Serialize(serde_json::Error),

    #[error("run was superseded before it completed")]
    Superseded,
}

/// Build an [`EffectConfig`] from CLI arguments.
///
/// `--config` or `--config-json` replace the individual effect flags
/// entirely.
fn config_from_cli(cli: &Cli) -> Result<EffectConfig, CliError> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|source| CliError::ConfigParse {
            origin: "--config-json".to_string(),
            source,
        });
    }
    if let Some(ref path) = cli.config {
        let text = std::fs::read_to_string(path).map_err(|source| CliError::ConfigRead {
            path: path.clone(),
            source,
        })?;
        return serde_json::from_str(&text).map_err(|source| CliError::ConfigParse {
            origin: path.display().to_string(),
            source,
        });
    }

    Ok(EffectConfig {
        noise_scale: cli.noise_scale,
        pixel_size: cli.pixel_size,
        dithering_enabled: cli.dither,
        dither_depth: cli.dither_depth,
        dither_intensity: cli.dither_intensity,
        dither_type: match cli.dither_type {
            Dither::Bayer => DitherType::Bayer,
            Dither::Psx => DitherType::Psx,
        },
        vertex_wobble_enabled: cli.wobble,
        vertex_intensity: cli.vertex_intensity,
        palette_size: cli.palette_size,
        perspective_enabled: cli.perspective,
        perspective_intensity: cli.perspective_intensity,
        max_width: (cli.max_width > 0).then_some(cli.max_width),
        max_height: (cli.max_height > 0).then_some(cli.max_height),
        resize_filter: match cli.resize_filter {
            Filter::Nearest => ResizeFilter::Nearest,
            Filter::Triangle => ResizeFilter::Triangle,
            Filter::CatmullRom => ResizeFilter::CatmullRom,
            Filter::Gaussian => ResizeFilter::Gaussian,
            Filter::Lanczos3 => ResizeFilter::Lanczos3,
        },
    })
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .without_time(),
        )
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let config = config_from_cli(cli)?;
    let loader = FileLoader::new(&cli.input);
    tracing::info!(input = %loader.path().display(), ?config, "starting");

    let result = if cli.report || cli.json || cli.runs > 1 {
        run_with_diagnostics(cli, &loader, &config)?
    } else if let Some(ref dir) = cli.stages {
        run_dumping_stages(cli, &loader, &config, dir)?
    } else {
        run_once(cli, &loader, &config)?
    };

    if let Some(ref path) = cli.output {
        write_image(&result.buffer, path)?;
        eprintln!(
            "Wrote {} ({}x{})",
            path.display(),
            result.dimensions.width,
            result.dimensions.height,
        );
    }
    Ok(())
}

/// Plain run through the orchestrator.
fn run_once(
    cli: &Cli,
    loader: &FileLoader,
    config: &EffectConfig,
) -> Result<PipelineResult, CliError> {
    let orchestrator = Orchestrator::new(cli.seed);
    match orchestrator.run(loader, config) {
        RunOutcome::Presented { result, .. } => Ok(result),
        RunOutcome::Failed { error, .. } => Err(error.into()),
        RunOutcome::Stale { .. } => Err(CliError::Superseded),
    }
}

fn rng_for(seed: Option<u64>) -> StdRng {
    seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64)
}

fn noise_for(seed: Option<u64>) -> SimplexNoise {
    SimplexNoise::new(seed.unwrap_or_else(rand::random))
}

/// Timed runs with a report per run and a summary across runs.
///
/// Returns the result of the first run. When `--stages` is also given,
/// the first run's intermediates are dumped as well.
fn run_with_diagnostics(
    cli: &Cli,
    loader: &FileLoader,
    config: &EffectConfig,
) -> Result<PipelineResult, CliError> {
    let source = loader.load()?;
    eprintln!(
        "Image: {} ({}x{})",
        cli.input.display(),
        source.width(),
        source.height(),
    );
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    if let Some(ref dir) = cli.stages {
        dump_stages(source.clone(), config, cli.seed, dir)?;
    }

    let noise = noise_for(cli.seed);
    let (first, diagnostics) = timed_run(cli, &source, config, &noise, 0)?;
    let mut all_diagnostics = Vec::with_capacity(cli.runs);
    all_diagnostics.push(diagnostics);

    for run in 1..cli.runs {
        let (_, diagnostics) = timed_run(cli, &source, config, &noise, run)?;
        all_diagnostics.push(diagnostics);
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    Ok(first)
}

/// One instrumented run, printing its report.
fn timed_run(
    cli: &Cli,
    source: &RasterBuffer,
    config: &EffectConfig,
    noise: &SimplexNoise,
    run: usize,
) -> Result<(PipelineResult, PipelineDiagnostics), CliError> {
    if cli.runs > 1 {
        eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
    }

    let mut rng = rng_for(cli.seed);
    let (result, diagnostics) = psxify_pipeline::diagnostics::process_with_diagnostics(
        source.clone(),
        config,
        &mut rng,
        noise,
        &SystemClock,
    )?;

    if cli.json {
        let json = serde_json::to_string_pretty(&diagnostics).map_err(CliError::Serialize)?;
        println!("{json}");
    } else {
        println!("{}", diagnostics.report());
    }

    if cli.runs > 1 {
        eprintln!();
    }
    Ok((result, diagnostics))
}

fn run_dumping_stages(
    cli: &Cli,
    loader: &FileLoader,
    config: &EffectConfig,
    dir: &Path,
) -> Result<PipelineResult, CliError> {
    let source = loader.load()?;
    dump_stages(source, config, cli.seed, dir)
}

/// Drive the pipeline one stage at a time, writing each buffer.
fn dump_stages(
    source: RasterBuffer,
    config: &EffectConfig,
    seed: Option<u64>,
    dir: &Path,
) -> Result<PipelineResult, CliError> {
    std::fs::create_dir_all(dir).map_err(|source| CliError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut rng = rng_for(seed);
    let noise = noise_for(seed);

    let fitted = Pipeline::new(source, config).fit()?;
    save_stage(&fitted, dir)?;
    let pixelated = fitted.pixelate();
    save_stage(&pixelated, dir)?;
    let quantized = pixelated.quantize();
    save_stage(&quantized, dir)?;
    let dithered = quantized.dither();
    save_stage(&dithered, dir)?;
    let distorted = dithered.distort(&mut rng);
    save_stage(&distorted, dir)?;
    let finished = distorted.overlay_noise(&noise);
    save_stage(&finished, dir)?;

    Ok(finished.into_result())
}

fn save_stage<S: PipelineStage>(stage: &S, dir: &Path) -> Result<(), CliError> {
    let path = dir.join(format!("{}-{}.png", S::INDEX, S::NAME));
    write_image(stage.buffer(), &path)?;
    tracing::info!(stage = S::NAME, path = %path.display(), "stage written");
    Ok(())
}

fn write_image(buffer: &RasterBuffer, path: &Path) -> Result<(), CliError> {
    buffer.save(path).map_err(|source| CliError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[PipelineDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<12} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(28));

    let runs = all_diagnostics.len() as f64;
    let Some(first) = all_diagnostics.first() else {
        return;
    };
    for (index, (name, _)) in first.stages().iter().enumerate() {
        let total: f64 = all_diagnostics
            .iter()
            .map(|d| d.stages()[index].1.duration.as_secs_f64() * 1000.0)
            .sum();
        println!("{name:<12} {:>10.3}ms", total / runs);
    }
}
