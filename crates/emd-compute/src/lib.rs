//! Tiled, serialized denoising orchestration.
//!
//! Runs opaque denoising kernels over large grayscale slice stacks:
//! slices are cut into margined tiles, every kernel call is funneled
//! through one serialized compute channel, results are stitched back, and
//! an interactive region-of-interest preview is served from a bounded LRU
//! cache.
//!
//! # Architecture
//!
//! ```text
//! DenoiseEngine (batch, progress, cancellation)      Previewer (ROI, cache)
//!     │                                                  │
//!     ├── Partitioner ──> margined tiles                 ├── PreviewCache (LRU)
//!     │                                                  │
//!     └──────────────> Submitter ──> ComputeChannel <────┘
//!                                        │  (one worker, FIFO)
//!                                        └── KernelPort
//!                                              └── CpuKernel (rayon)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use emd_compute::{ComputeChannel, CpuKernel, DenoiseEngine, DenoiseJob, EngineConfig, CancelToken};
//!
//! let channel = ComputeChannel::new()?;
//! let engine = DenoiseEngine::new(channel.submitter(), Arc::new(CpuKernel::new()));
//! let job = DenoiseJob::from_config(&EngineConfig::from_env(), range, params);
//! let outcome = engine.denoise(&stack, &job, &|p| println!("{}%", p.percent()), &CancelToken::new())?;
//! ```

pub mod algorithm;
pub mod backend;
pub mod config;
pub mod job;
pub mod normalize;
pub mod preview;

pub use algorithm::{AlgorithmId, AlgorithmParams, SampleScale};
pub use backend::{
    CacheEntry, CacheKey, CancelToken, ComputeChannel, ComputeHandle, CpuKernel, DenoiseEngine,
    DenoiseJob, DenoiseOutcome, Estimate, KernelError, KernelPort, NoProgress, Partitioner,
    PreviewCache, ProgressSink, ProgressState, Submitter, Tile, TileRegion,
};
pub use config::EngineConfig;
pub use job::{BatchJob, JobStatus};
pub use normalize::Normalizer;
pub use preview::{PreviewResult, Previewer, SourceEstimates};

use emd_core::Rect;
use thiserror::Error;

/// Denoising errors.
///
/// Cancellation is not an error; see [`DenoiseOutcome::Cancelled`].
#[derive(Error, Debug)]
pub enum DenoiseError {
    /// A kernel returned a result whose size differs from its input tile.
    #[error(
        "tile at ({grid_x}, {grid_y}) came back {actual_width}x{actual_height}, expected {expected_width}x{expected_height}"
    )]
    TileGeometryViolation {
        grid_x: u32,
        grid_y: u32,
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    /// A kernel call failed during a batch job.
    #[error("kernel failed on slice {slice}, tile {tile} at ({grid_x}, {grid_y}): {source}")]
    Kernel {
        slice: usize,
        tile: usize,
        grid_x: u32,
        grid_y: u32,
        source: KernelError,
    },

    /// A kernel call outside a batch job (preview, estimate) failed.
    #[error("compute failed: {0}")]
    Compute(#[from] KernelError),

    /// Preview cache built with a non-positive capacity.
    #[error("preview cache capacity must be positive, got {0}")]
    CacheCapacityMisconfigured(usize),

    #[error("invalid tile size {width}x{height}")]
    InvalidTileSize { width: u32, height: u32 },

    /// Region of interest empty, outside the image, or over the preview limit.
    #[error("invalid region of interest {roi} on {width}x{height} image: {reason}")]
    InvalidRoi { roi: Rect, width: u32, height: u32, reason: String },

    /// A preview was requested before any region of interest was set.
    #[error("no preview region selected")]
    NoRoi,

    #[error("invalid {algorithm} parameter '{name}': {reason}")]
    InvalidParameter { algorithm: &'static str, name: String, reason: String },

    #[error("unknown algorithm '{0}'")]
    UnknownAlgorithm(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to spawn worker thread")]
    WorkerSpawn(#[source] std::io::Error),

    /// The background job thread died without reporting an outcome.
    #[error("background job terminated abnormally")]
    JobPanicked,

    #[error(transparent)]
    Core(#[from] emd_core::Error),
}

pub type DenoiseResult<T> = Result<T, DenoiseError>;
