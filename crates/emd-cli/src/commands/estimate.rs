//! Estimate command
//!
//! Prints the noise standard deviation and blur metric of each slice and,
//! with `--suggest`, the parameters each algorithm derives from that noise.

use crate::EstimateArgs;
#[allow(unused_imports)]
use tracing::{debug, info, trace};
use anyhow::Result;
use emd_compute::{AlgorithmId, Estimate};

pub fn run(args: EstimateArgs, verbose: u8) -> Result<()> {
    trace!(inputs = args.input.len(), suggest = args.suggest, "estimate::run");

    let (_channel, engine) = super::start_engine()?;
    for path in &args.input {
        let slice = super::load_slice(path)?;
        if verbose > 0 {
            println!("{}: {}x{} {}", path.display(), slice.width(), slice.height(), slice.bit_depth());
        }
        let noise = engine.estimate(&slice, Estimate::Noise)?;
        let blur = engine.estimate(&slice, Estimate::Blur)?;
        debug!(path = %path.display(), noise, blur, "Estimated");

        println!("{}: noise {:.5}, blur {:.5}", path.display(), noise, blur);
        if args.suggest {
            for id in AlgorithmId::ALL {
                println!("  {:<22} {}", id.key(), id.params_for_noise(noise));
            }
        }
    }
    Ok(())
}
