//! Preview command
//!
//! Denoises a region of interest of one slice and reports the noise and
//! blur estimates before and after.

use std::sync::Arc;

use crate::PreviewArgs;
#[allow(unused_imports)]
use tracing::{debug, info, trace};
use anyhow::Result;
use emd_compute::{ComputeChannel, CpuKernel, EngineConfig, Previewer};

pub fn run(args: PreviewArgs, verbose: u8) -> Result<()> {
    trace!(input = %args.input.display(), roi = %args.roi, algorithm = %args.algorithm.algorithm, "preview::run");

    let image = super::load_slice(&args.input)?;
    let mut config = EngineConfig::from_env();
    if let Some(max) = args.max_preview {
        config.max_preview_size = max;
    }

    let channel = ComputeChannel::new()?;
    let previewer = Previewer::new(channel.submitter(), Arc::new(CpuKernel::new()), &config)?;
    previewer.set_roi(&image, args.roi)?;

    let source = previewer.source_estimates()?;
    let noise = args.algorithm.auto_params.then_some(source.noise);
    let params = super::resolve_params(&args.algorithm, noise)?;

    if verbose > 0 {
        println!("Previewing {} of {} with {}", args.roi, args.input.display(), params);
    }
    let result = previewer.render(&params)?;
    super::save_slice(&args.output, result.image())?;
    info!(output = %args.output.display(), cached = result.cached, "Preview written");

    println!("{}", params);
    println!("  noise: {:.5} -> {}", source.noise, format_estimate(result.noise()));
    println!("  blur:  {:.5} -> {}", source.blur, format_estimate(result.blur()));
    Ok(())
}

fn format_estimate(value: Option<f32>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.5}"))
}
