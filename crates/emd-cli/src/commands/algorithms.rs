//! Algorithms command

use crate::AlgorithmsArgs;
use anyhow::Result;
use emd_compute::AlgorithmId;

pub fn run(args: AlgorithmsArgs) -> Result<()> {
    for id in AlgorithmId::ALL {
        let params = id.default_params();
        println!("{:<22} {}", id.key(), params);
        if args.long {
            match params.support_radius() {
                Some(r) => println!("    margin: {r}"),
                None => println!("    margin: configured"),
            }
            for (key, value) in params.parameter_list() {
                println!("    {key} = {value}");
            }
        }
    }
    Ok(())
}
