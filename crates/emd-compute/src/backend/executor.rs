//! Batch denoising driver.
//!
//! Runs one algorithm over a range of slices, tile by tile, with every
//! kernel call going through the compute channel.
//!
//! # Architecture
//!
//! ```text
//! DenoiseEngine::denoise
//!     │
//!     ├── Normalizer::from_reference(current slice)   once per job
//!     ├── Partitioner ──> tiles_per_slice             fixed before the loop
//!     │
//!     └── for slice in range, for tile in slice:
//!             cancel? ──> DenoiseOutcome::Cancelled
//!             Submitter::submit(KernelPort::invoke) ──> wait
//!             stitch ──> place ──> ProgressSink::report
//! ```
//!
//! Cancellation is observed before each tile. A tile already submitted
//! runs to completion, so cancelling after tile `k` leaves at most `k + 1`
//! tiles done. Any kernel or geometry failure abandons the whole job; no
//! partial stack is returned.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;

use emd_core::{Image, Rect, SliceRange, SliceSource, SliceStack};
use tracing::{debug, info, trace};

use super::channel::Submitter;
use super::kernel::{Estimate, KernelPort, NOISE_REGION_MAX};
use super::tiling::{Partitioner, place, recommended_margin, stitch};
use crate::algorithm::AlgorithmParams;
use crate::config::EngineConfig;
use crate::normalize::Normalizer;
use crate::{DenoiseError, DenoiseResult};

// =============================================================================
// Progress & Cancellation
// =============================================================================

/// Tiles done out of tiles planned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressState {
    /// Tiles finished so far.
    pub completed_units: usize,
    /// Tiles in the whole job, fixed at start.
    pub total_units: usize,
}

impl ProgressState {
    /// Completed share in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.total_units == 0 {
            1.0
        } else {
            self.completed_units as f64 / self.total_units as f64
        }
    }

    /// Completed share as a whole percentage.
    pub fn percent(&self) -> u32 {
        (self.fraction() * 100.0).floor() as u32
    }

    /// True once every planned tile is done.
    pub fn is_complete(&self) -> bool {
        self.completed_units >= self.total_units
    }
}

/// Receiver of progress updates, one per completed tile.
pub trait ProgressSink: Send + Sync {
    fn report(&self, state: ProgressState);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressState) + Send + Sync,
{
    fn report(&self, state: ProgressState) {
        self(state)
    }
}

impl ProgressSink for Sender<ProgressState> {
    fn report(&self, state: ProgressState) {
        // A dropped receiver just means nobody is watching.
        let _ = self.send(state);
    }
}

/// Sink that drops every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _state: ProgressState) {}
}

/// Cooperative cancellation flag, shared by clones.
#[derive(Debug, Default, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the job to stop before its next tile. Idempotent.
    pub fn request_cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Job
// =============================================================================

/// What to denoise and how to tile it.
#[derive(Debug, Clone)]
pub struct DenoiseJob {
    /// Slices to process.
    pub range: SliceRange,
    /// Core tile width.
    pub tile_width: u32,
    /// Core tile height.
    pub tile_height: u32,
    /// Context pixels on each side of a tile.
    pub margin: u32,
    /// Algorithm and its parameters.
    pub params: AlgorithmParams,
}

impl DenoiseJob {
    /// Job using the tiling from `config`.
    pub fn from_config(config: &EngineConfig, range: SliceRange, params: AlgorithmParams) -> Self {
        Self {
            range,
            tile_width: config.tile_width,
            tile_height: config.tile_height,
            margin: config.margin,
            params,
        }
    }

    /// Replaces the margin with the algorithm's neighbourhood support,
    /// keeping the current margin for unbounded algorithms.
    pub fn with_recommended_margin(mut self) -> Self {
        self.margin = recommended_margin(&self.params, self.margin);
        self
    }

    /// Tiles per slice times slices in range, for a `width x height` source.
    pub fn total_units(&self, width: u32, height: u32) -> DenoiseResult<usize> {
        let p = Partitioner::new(width, height, self.tile_width, self.tile_height, self.margin)?;
        Ok(p.tiles_per_slice() * self.range.len())
    }
}

/// How a job ended.
#[derive(Debug)]
pub enum DenoiseOutcome {
    /// Every slice was denoised.
    Completed(SliceStack),
    /// The job stopped early; no output exists.
    Cancelled(ProgressState),
}

impl DenoiseOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Result stack, if the job completed.
    pub fn into_stack(self) -> Option<SliceStack> {
        match self {
            Self::Completed(stack) => Some(stack),
            Self::Cancelled(_) => None,
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Drives batch jobs and one-off estimates through a compute channel.
#[derive(Clone)]
pub struct DenoiseEngine {
    submitter: Submitter,
    kernel: Arc<dyn KernelPort>,
}

impl DenoiseEngine {
    pub fn new(submitter: Submitter, kernel: Arc<dyn KernelPort>) -> Self {
        Self { submitter, kernel }
    }

    /// Kernel this engine calls.
    pub fn kernel(&self) -> &Arc<dyn KernelPort> {
        &self.kernel
    }

    /// Channel this engine submits to.
    pub fn submitter(&self) -> &Submitter {
        &self.submitter
    }

    /// Denoises `job.range` of `source`.
    ///
    /// The result stack is titled `"<source title> [<algorithm>]"`, keeps
    /// the source's display range and carries the parameter list as
    /// metadata.
    pub fn denoise(
        &self,
        source: &dyn SliceSource,
        job: &DenoiseJob,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> DenoiseResult<DenoiseOutcome> {
        trace!(source = source.title(), range = %job.range, "denoise");
        job.params.validate()?;

        let count = source.slice_count();
        if job.range.last() > count {
            return Err(emd_core::Error::InvalidSliceRange {
                first: job.range.first(),
                last: job.range.last(),
                count,
            }
            .into());
        }

        let reference = source.slice(source.current_slice())?;
        let normalizer = Normalizer::from_reference(&reference);
        let partitioner = Partitioner::for_image(&reference, job.tile_width, job.tile_height, job.margin)?;
        drop(reference);

        let mut state = ProgressState {
            completed_units: 0,
            total_units: partitioner.tiles_per_slice() * job.range.len(),
        };
        info!(
            algorithm = %job.params.id(),
            kernel = self.kernel.name(),
            slices = job.range.len(),
            tiles = state.total_units,
            margin = job.margin,
            "denoise job started"
        );

        let mut output = Vec::with_capacity(job.range.len());
        for index in job.range.iter() {
            let slice = source.slice(index)?;
            let mut canvas = Image::blank(slice.width(), slice.height(), slice.bit_depth())?;

            for tile in partitioner.tiles(&slice) {
                if cancel.is_cancelled() {
                    info!(done = state.completed_units, total = state.total_units, "denoise job cancelled");
                    return Ok(DenoiseOutcome::Cancelled(state));
                }
                let tile = tile?;
                let region = tile.region;

                let kernel = Arc::clone(&self.kernel);
                let params = job.params;
                let pixels = tile.pixels;
                let result = self
                    .submitter
                    .submit(move || kernel.invoke(&pixels, &params, &normalizer))
                    .wait()
                    .map_err(|source| DenoiseError::Kernel {
                        slice: index,
                        tile: region.index,
                        grid_x: region.grid_x,
                        grid_y: region.grid_y,
                        source,
                    })?;

                let cropped = stitch(&region, &result)?;
                place(&mut canvas, &region, &cropped)?;

                state.completed_units += 1;
                debug!(slice = index, tile = region.index, done = state.completed_units, "tile done");
                progress.report(state);
            }
            output.push(canvas);
        }

        let mut stack = SliceStack::new(format!("{} [{}]", source.title(), job.params.id().name()), output)?;
        stack.set_display_range(source.display_range());
        for (key, value) in job.params.parameter_list() {
            stack.set_info(key, value);
        }
        info!(tiles = state.completed_units, "denoise job finished");
        Ok(DenoiseOutcome::Completed(stack))
    }

    /// Runs an estimator on the channel and waits for it.
    ///
    /// The noise estimator only looks at the centred
    /// [`NOISE_REGION_MAX`]-sided region of large images.
    pub fn estimate(&self, image: &Image, kind: Estimate) -> DenoiseResult<f32> {
        let sample = match kind {
            Estimate::Noise => central_region(image, NOISE_REGION_MAX)?,
            Estimate::Blur => image.clone(),
        };
        let kernel = Arc::clone(&self.kernel);
        let value = self.submitter.submit(move || kernel.estimate(&sample, kind)).wait()?;
        trace!(?kind, value, "estimate");
        Ok(value)
    }
}

impl std::fmt::Debug for DenoiseEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DenoiseEngine")
            .field("kernel", &self.kernel.name())
            .field("submitter", &self.submitter)
            .finish()
    }
}

/// Centred crop of at most `max x max` pixels.
pub fn central_region(image: &Image, max: u32) -> DenoiseResult<Image> {
    let (w, h) = image.dimensions();
    if w <= max && h <= max {
        return Ok(image.clone());
    }
    let cw = w.min(max);
    let ch = h.min(max);
    Ok(image.crop(Rect::new((w - cw) / 2, (h - ch) / 2, cw, ch))?)
}
