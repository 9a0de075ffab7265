//! Kernel port: the boundary to the numeric denoising kernels.
//!
//! A [`KernelPort`] runs one algorithm on one block of pixels. It is
//! assumed to be non-reentrant (one shared GPU context, one native
//! runtime handle), so callers never invoke it directly from several
//! threads; every call goes through a [`ComputeChannel`](super::ComputeChannel).
//!
//! Failures are reported through [`KernelError`] instead of a zeroed
//! buffer, so a missing kernel and a rejected parameter are told apart.

use emd_core::Image;
use thiserror::Error;

use crate::algorithm::AlgorithmParams;
use crate::normalize::Normalizer;

/// Failure reported by a kernel call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// The kernel or a resource it needs is not available.
    #[error("missing resource: {0}")]
    MissingResource(String),

    /// The kernel rejected a parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The kernel ran and failed.
    #[error("kernel failed: {0}")]
    Failed(String),

    /// The unit of work panicked on the compute worker.
    #[error("kernel panicked: {0}")]
    Panicked(String),

    /// The compute channel shut down before the unit ran.
    #[error("compute channel disconnected")]
    Disconnected,
}

/// Side of the centred region noise is estimated on.
pub const NOISE_REGION_MAX: u32 = 2048;

/// Image statistic computed by a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Estimate {
    /// Noise standard deviation for intensities in `[0, 1]`.
    Noise,
    /// No-reference blur metric in `[0, 1]` (higher is blurrier).
    Blur,
}

/// Synchronous, non-reentrant denoising kernel.
pub trait KernelPort: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &str;

    /// Runs the algorithm selected by `params` on `tile`.
    ///
    /// `normalizer` maps stored samples to the kernel's working scale and
    /// back; it is shared by all tiles of a job. The result must have the
    /// same width, height and bit depth as `tile`.
    fn invoke(
        &self,
        tile: &Image,
        params: &AlgorithmParams,
        normalizer: &Normalizer,
    ) -> Result<Image, KernelError>;

    /// Computes an image statistic. Samples are scaled by the full range of
    /// the bit depth.
    fn estimate(&self, image: &Image, kind: Estimate) -> Result<f32, KernelError> {
        let _ = image;
        Err(KernelError::MissingResource(format!("{} has no {kind:?} estimator", self.name())))
    }
}
