//! emd - tiled denoising for grayscale slice stacks
//!
//! Batch-denoises slices tile by tile, renders ROI previews and reports
//! noise/blur estimates, all through one serialized compute channel.

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use emd_core::Rect;
use std::path::PathBuf;

mod commands;
mod logging;

#[derive(Parser)]
#[command(name = "emd")]
#[command(author, version, about = "Tiled denoising for grayscale slice stacks")]
#[command(long_about = "
Denoises 8/16-bit grayscale slices (PNG/TIFF, one file per slice) with a
selectable algorithm. Large slices are processed in overlapping tiles.

Examples:
  emd algorithms                                  # List algorithms and defaults
  emd estimate slice.tif                          # Noise/blur and suggested settings
  emd denoise s*.tif -o out -a gaussian -p sigma=2
  emd denoise s01.tif s02.tif s03.tif -o out --range 2-3 --tile 512 --margin 32
  emd preview slice.tif --roi 100,100,256,256 -a bilateral -o roi.png
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Number of threads (0 = auto)
    #[arg(short = 'j', long, global = true, default_value = "0")]
    threads: usize,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Denoise a range of slices
    #[command(visible_alias = "d")]
    Denoise(DenoiseArgs),

    /// Denoise a region of interest of one slice
    #[command(visible_alias = "p")]
    Preview(PreviewArgs),

    /// Estimate noise and blur
    #[command(visible_alias = "e")]
    Estimate(EstimateArgs),

    /// List algorithms with their defaults
    #[command(visible_alias = "a")]
    Algorithms(AlgorithmsArgs),
}

/// Algorithm selection shared by denoise and preview.
#[derive(Args, Clone)]
struct AlgorithmArgs {
    /// Algorithm (see `emd algorithms`)
    #[arg(short, long, default_value = "gaussian")]
    algorithm: String,

    /// Parameter override, repeatable (e.g. -p sigma=2)
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Start from defaults derived from the estimated noise level
    #[arg(long)]
    auto_params: bool,
}

#[derive(Args)]
struct DenoiseArgs {
    /// Slice files, in stack order
    #[arg(required = true)]
    input: Vec<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    output_dir: PathBuf,

    #[command(flatten)]
    algorithm: AlgorithmArgs,

    /// Slices to process: current, all, N or A-B (1-based)
    #[arg(short, long, default_value = "all")]
    range: String,

    /// Current slice (1-based); used for normalization and `--range current`
    #[arg(long, default_value = "1")]
    current: usize,

    /// Tile width and height
    #[arg(long)]
    tile: Option<u32>,

    /// Tile width
    #[arg(long)]
    tile_width: Option<u32>,

    /// Tile height
    #[arg(long)]
    tile_height: Option<u32>,

    /// Context pixels around each tile
    #[arg(short, long)]
    margin: Option<u32>,

    /// Use the algorithm's neighbourhood size as margin
    #[arg(long)]
    auto_margin: bool,
}

#[derive(Args)]
struct PreviewArgs {
    /// Input slice
    input: PathBuf,

    /// Region of interest: x,y,width,height
    #[arg(long)]
    roi: Rect,

    /// Output image
    #[arg(short, long)]
    output: PathBuf,

    #[command(flatten)]
    algorithm: AlgorithmArgs,

    /// Largest ROI side
    #[arg(long)]
    max_preview: Option<u32>,
}

#[derive(Args)]
struct EstimateArgs {
    /// Input slice(s)
    #[arg(required = true)]
    input: Vec<PathBuf>,

    /// Also print suggested parameters per algorithm
    #[arg(short, long)]
    suggest: bool,
}

#[derive(Args)]
struct AlgorithmsArgs {
    /// Show parameter keys
    #[arg(short, long)]
    long: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _log_guard = logging::init(cli.verbose, cli.log.as_deref())?;

    // Configure thread pool
    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    match cli.command {
        Commands::Denoise(args) => commands::denoise::run(args, cli.verbose),
        Commands::Preview(args) => commands::preview::run(args, cli.verbose),
        Commands::Estimate(args) => commands::estimate::run(args, cli.verbose),
        Commands::Algorithms(args) => commands::algorithms::run(args),
    }
}
