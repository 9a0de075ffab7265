//! Denoise command
//!
//! Loads the slices into one stack, runs the batch job on a background
//! thread while printing progress, then writes one output per processed
//! slice plus a `<title>_<key>.txt` sidecar with the parameter list.

use std::fs;
use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::DenoiseArgs;
#[allow(unused_imports)]
use tracing::{debug, info, trace};
use anyhow::{Context, Result, bail};
use emd_compute::{BatchJob, DenoiseJob, DenoiseOutcome, EngineConfig, Estimate, JobStatus};
use emd_core::{RangeSelector, SliceRange, SliceSource, SliceStack};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub fn run(args: DenoiseArgs, verbose: u8) -> Result<()> {
    trace!(inputs = args.input.len(), algorithm = %args.algorithm.algorithm, range = %args.range, "denoise::run");

    let slices = args
        .input
        .iter()
        .map(|path| super::load_slice(path))
        .collect::<Result<Vec<_>>>()?;
    let title = args
        .input
        .first()
        .and_then(|p| p.file_stem())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "stack".to_string());
    let mut stack = SliceStack::new(title, slices).context("Input slices do not form a stack")?;
    stack.set_current_slice(args.current)?;

    let selector: RangeSelector = args.range.parse()?;
    let range = SliceRange::resolve(selector, &stack)?;
    let config = engine_config(&args)?;

    let (_channel, engine) = super::start_engine()?;
    let noise = if args.algorithm.auto_params {
        let current = stack.get(stack.current_slice())?;
        let sigma = engine.estimate(current, Estimate::Noise)?;
        info!(noise = sigma, "Estimated noise on current slice");
        Some(sigma)
    } else {
        None
    };
    let params = super::resolve_params(&args.algorithm, noise)?;

    let mut job = DenoiseJob::from_config(&config, range, params);
    if args.auto_margin {
        job = job.with_recommended_margin();
    }
    let (w, h) = stack.dimensions();
    let total = job.total_units(w, h)?;

    info!(%params, %range, tile_w = job.tile_width, tile_h = job.tile_height, margin = job.margin, units = total, "Denoising");
    if verbose > 0 {
        println!(
            "Denoising slices {} of {} with {} ({} tiles, margin {})",
            range,
            stack.title(),
            params,
            total,
            job.margin
        );
    }

    let stack = Arc::new(stack);
    let source: Arc<dyn SliceSource> = stack.clone();
    let mut batch = BatchJob::spawn(engine, source, job)?;
    let mut shown = None;
    loop {
        let (state, finished) = match batch.poll() {
            JobStatus::Running(state) => (state, false),
            JobStatus::Finished(state) => (state, true),
        };
        if verbose > 0 && shown != Some(state.percent()) {
            shown = Some(state.percent());
            eprint!("\r{:3}%", state.percent());
        }
        if finished {
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }
    if verbose > 0 {
        eprintln!();
    }

    let result = match batch.join()? {
        DenoiseOutcome::Completed(result) => result,
        DenoiseOutcome::Cancelled(state) => bail!(
            "Denoising cancelled after {} of {} tiles",
            state.completed_units,
            state.total_units
        ),
    };

    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("Failed to create: {}", args.output_dir.display()))?;

    let key = params.id().key();
    for (slice, index) in result.slices().iter().zip(range.iter()) {
        let output = super::output_path(&args.output_dir, &args.input[index - 1], key);
        super::save_slice(&output, slice)?;
        debug!(slice = index, output = %output.display(), "Wrote slice");
        if verbose > 0 {
            println!("  {} -> {}", args.input[index - 1].display(), output.display());
        }
    }

    let sidecar = args.output_dir.join(format!("{}_{}.txt", stack.title(), key));
    write_info(&sidecar, result.title(), result.info().iter())?;

    println!("{}: {} slice(s) written to {}", result.title(), result.slice_count(), args.output_dir.display());
    Ok(())
}

/// Environment configuration with command line overrides applied.
fn engine_config(args: &DenoiseArgs) -> Result<EngineConfig> {
    let mut config = EngineConfig::from_env();
    if let Some(size) = args.tile {
        config.tile_width = size;
        config.tile_height = size;
    }
    if let Some(w) = args.tile_width {
        config.tile_width = w;
    }
    if let Some(h) = args.tile_height {
        config.tile_height = h;
    }
    if let Some(m) = args.margin {
        config.margin = m;
    }
    config.validate()?;
    Ok(config)
}

fn write_info<'a>(
    path: &std::path::Path,
    title: &str,
    info: impl Iterator<Item = (&'a String, &'a String)>,
) -> Result<()> {
    let mut file = fs::File::create(path)
        .with_context(|| format!("Failed to save: {}", path.display()))?;
    writeln!(file, "title={title}")?;
    for (key, value) in info {
        writeln!(file, "{key}={value}")?;
    }
    Ok(())
}
