//! colorizer CLI - Colorize grayscale photographs.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use colorizer::{model::DEFAULT_WEIGHTS, Colorizer, Config, WeightsSource};

/// Colorize a grayscale (or desaturated color) photograph.
#[derive(Parser, Debug)]
#[command(name = "colorizer")]
#[command(version, about, long_about = None)]
struct Args {
    /// Input image path.
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output path. Receives a PNG, or the JSON envelope with --json.
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Model weights: a safetensors file or an http(s) URL to download and cache.
    #[arg(short, long, default_value = DEFAULT_WEIGHTS, value_name = "PATH|URL")]
    weights: WeightsSource,

    /// JSON config file. Flags below override its values.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Resolution the model runs at. Must be a multiple of 4.
    #[arg(long, value_name = "INT")]
    resolution: Option<u32>,

    /// Disable sharpness enhancement of the output.
    #[arg(long)]
    no_sharpen: bool,

    /// Sharpness factor. 1.0 leaves the output unchanged.
    #[arg(long, value_name = "FLOAT")]
    sharpness: Option<f32>,

    /// Write `{"colorized_image": <base64 PNG>}` or `{"error": ...}` instead of a PNG.
    #[arg(long)]
    json: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("colorizer={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(err) = run(&args) {
        tracing::error!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn run(args: &Args) -> Result<()> {
    // Validate input file exists
    if !args.input.exists() {
        anyhow::bail!("Input file does not exist: {}", args.input.display());
    }

    // Build configuration
    let mut config = match &args.config {
        Some(path) => Config::from_json_file(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(resolution) = args.resolution {
        config.input_resolution = resolution;
    }
    if let Some(factor) = args.sharpness {
        config.sharpness_factor = factor;
    }
    if args.no_sharpen {
        config.enhance_sharpness = false;
    }

    // Load the model before touching the image
    let colorizer =
        Colorizer::load(&args.weights, config).context("Failed to initialize colorizer")?;

    if args.json {
        let bytes = std::fs::read(&args.input)
            .with_context(|| format!("Failed to read {}", args.input.display()))?;
        let response = colorizer.respond(&bytes);
        let body = response.to_json().context("Failed to serialize response")?;
        std::fs::write(&args.output, body)
            .with_context(|| format!("Failed to write {}", args.output.display()))?;

        if !response.is_success() {
            anyhow::bail!("Colorization failed, see {}", args.output.display());
        }
    } else {
        colorizer
            .process(&args.input, &args.output)
            .context("Failed to process image")?;
    }

    println!(
        "Successfully processed {} -> {}",
        args.input.display(),
        args.output.display()
    );

    Ok(())
}
