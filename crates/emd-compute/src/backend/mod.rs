//! Compute backend: kernel port, serialized channel, tiling, batch driver
//! and preview cache.
//!
//! # Architecture
//!
//! ```text
//! DenoiseEngine
//!     +-- Partitioner     (margined tiles, stitching)
//!     +-- Submitter  ──>  ComputeChannel (one worker, FIFO)
//!                              +-- dyn KernelPort
//!                                    +-- CpuKernel (rayon)
//! ```

mod cache;
mod channel;
mod cpu_backend;
mod executor;
mod kernel;
pub mod tiling;

pub use cache::{CacheEntry, CacheKey, PreviewCache};
pub use channel::{ComputeChannel, ComputeHandle, DEFAULT_WORKER_NAME, Submitter};
pub use cpu_backend::CpuKernel;
pub use executor::{
    CancelToken, DenoiseEngine, DenoiseJob, DenoiseOutcome, NoProgress, ProgressSink, ProgressState,
    central_region,
};
pub use kernel::{Estimate, KernelError, KernelPort, NOISE_REGION_MAX};
pub use tiling::{Partitioner, Tile, TileRegion, partition, place, recommended_margin, stitch};
