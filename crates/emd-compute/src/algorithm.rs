//! Denoising algorithm catalogue.
//!
//! The set of algorithms is closed: [`AlgorithmId`] names one, and
//! [`AlgorithmParams`] carries the matching immutable parameter snapshot.
//! Parameter values compare and hash structurally (floats by bit pattern),
//! so a snapshot can be used directly as half of a preview cache key.
//!
//! Every parameter struct provides:
//! - documented valid ranges (`*_RANGE` constants) and [`validate`](AlgorithmParams::validate)
//! - defaults, and defaults suggested from a noise estimate
//! - a key/value list attached to results as metadata
//! - a one-line summary via `Display`
//!
//! ```rust
//! use emd_compute::algorithm::{AlgorithmId, AlgorithmParams};
//!
//! let mut params = AlgorithmId::Gaussian.default_params();
//! params.set("sigma", "2.5").unwrap();
//! assert!(params.validate().is_ok());
//! assert_eq!(params.to_string(), "Gaussian: sigma 2.5");
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::RangeInclusive;
use std::str::FromStr;

use crate::{DenoiseError, DenoiseResult};

/// Key prefix for parameter metadata attached to results.
pub const PARAM_PREFIX: &str = "emd.";

/// Scale kernels expect normalized samples in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleScale {
    /// `[0, 1]`.
    Unit,
    /// `[0, 255]`.
    Byte,
}

impl SampleScale {
    /// Upper bound of the scale.
    pub fn max(self) -> f32 {
        match self {
            Self::Unit => 1.0,
            Self::Byte => 255.0,
        }
    }
}

// =============================================================================
// Algorithm identity
// =============================================================================

/// Identity of a denoising algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AlgorithmId {
    /// Gaussian smoothing.
    Gaussian,
    /// Edge-preserving bilateral filter.
    Bilateral,
    /// Perona-Malik anisotropic diffusion.
    AnisotropicDiffusion,
    /// Bayesian least squares with Gaussian scale mixtures.
    BlsGsm,
    /// Wavelet coefficient thresholding.
    WaveletThresholding,
    /// Non-local means.
    NonLocalMeans,
    /// Non-local means for spatially correlated noise.
    NonLocalMeansSc,
    /// Non-local means for spatially correlated, signal-dependent noise.
    NonLocalMeansScd,
    /// Total variation regularization.
    TotalVariation,
    /// Tikhonov regularization, optionally with deconvolution.
    Tikhonov,
}

impl AlgorithmId {
    /// Every algorithm, in presentation order.
    pub const ALL: [AlgorithmId; 10] = [
        Self::Gaussian,
        Self::Bilateral,
        Self::AnisotropicDiffusion,
        Self::BlsGsm,
        Self::WaveletThresholding,
        Self::NonLocalMeans,
        Self::NonLocalMeansSc,
        Self::NonLocalMeansScd,
        Self::TotalVariation,
        Self::Tikhonov,
    ];

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Gaussian => "Gaussian",
            Self::Bilateral => "Bilateral",
            Self::AnisotropicDiffusion => "Anisotropic Diffusion",
            Self::BlsGsm => "BLS-GSM",
            Self::WaveletThresholding => "Wavelet Thresholding",
            Self::NonLocalMeans => "Non-Local Means",
            Self::NonLocalMeansSc => "Non-Local Means SC",
            Self::NonLocalMeansScd => "Non-Local Means SCD",
            Self::TotalVariation => "Total Variation",
            Self::Tikhonov => "Tikhonov",
        }
    }

    /// Lowercase key used in metadata and on the command line.
    pub fn key(self) -> &'static str {
        match self {
            Self::Gaussian => "gaussian",
            Self::Bilateral => "bilateral",
            Self::AnisotropicDiffusion => "anisotropicdiffusion",
            Self::BlsGsm => "blsgsm",
            Self::WaveletThresholding => "waveletthresholding",
            Self::NonLocalMeans => "nonlocalmeans",
            Self::NonLocalMeansSc => "nonlocalmeanssc",
            Self::NonLocalMeansScd => "nonlocalmeansscd",
            Self::TotalVariation => "totalvariation",
            Self::Tikhonov => "tikhonov",
        }
    }

    /// Scale the kernel expects normalized samples in.
    pub fn working_scale(self) -> SampleScale {
        match self {
            Self::NonLocalMeansSc | Self::NonLocalMeansScd => SampleScale::Byte,
            _ => SampleScale::Unit,
        }
    }

    /// Default parameter snapshot.
    pub fn default_params(self) -> AlgorithmParams {
        match self {
            Self::Gaussian => AlgorithmParams::Gaussian(GaussianParams::default()),
            Self::Bilateral => AlgorithmParams::Bilateral(BilateralParams::default()),
            Self::AnisotropicDiffusion => {
                AlgorithmParams::AnisotropicDiffusion(AnisotropicDiffusionParams::default())
            }
            Self::BlsGsm => AlgorithmParams::BlsGsm(BlsGsmParams::default()),
            Self::WaveletThresholding => {
                AlgorithmParams::WaveletThresholding(WaveletThresholdingParams::default())
            }
            Self::NonLocalMeans => AlgorithmParams::NonLocalMeans(NonLocalMeansParams::default()),
            Self::NonLocalMeansSc => {
                AlgorithmParams::NonLocalMeansSc(NonLocalMeansScParams::default())
            }
            Self::NonLocalMeansScd => {
                AlgorithmParams::NonLocalMeansScd(NonLocalMeansScdParams::default())
            }
            Self::TotalVariation => AlgorithmParams::TotalVariation(TotalVariationParams::default()),
            Self::Tikhonov => AlgorithmParams::Tikhonov(TikhonovParams::default()),
        }
    }

    /// Parameters suggested for an image with the given noise standard
    /// deviation (intensities in `[0, 1]`).
    pub fn params_for_noise(self, noise: f32) -> AlgorithmParams {
        let noise = noise.max(0.0);
        match self {
            Self::Gaussian => AlgorithmParams::Gaussian(GaussianParams::for_noise(noise)),
            Self::AnisotropicDiffusion => {
                AlgorithmParams::AnisotropicDiffusion(AnisotropicDiffusionParams::for_noise(noise))
            }
            Self::BlsGsm => AlgorithmParams::BlsGsm(BlsGsmParams::for_noise(noise)),
            Self::WaveletThresholding => {
                AlgorithmParams::WaveletThresholding(WaveletThresholdingParams::for_noise(noise))
            }
            other => other.default_params(),
        }
    }
}

impl fmt::Display for AlgorithmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AlgorithmId {
    type Err = DenoiseError;

    fn from_str(s: &str) -> DenoiseResult<Self> {
        let norm: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let id = match norm.as_str() {
            "gauss" | "gaussian" => Self::Gaussian,
            "bilateral" => Self::Bilateral,
            "ad" | "anisotropic" | "anisotropicdiffusion" => Self::AnisotropicDiffusion,
            "blsgsm" => Self::BlsGsm,
            "wavelet" | "waveletthresholding" => Self::WaveletThresholding,
            "nlm" | "nlms" | "nonlocalmeans" => Self::NonLocalMeans,
            "nlmsc" | "nlmssc" | "nonlocalmeanssc" => Self::NonLocalMeansSc,
            "nlmscd" | "nlmsscd" | "nonlocalmeansscd" => Self::NonLocalMeansScd,
            "tv" | "totalvariation" => Self::TotalVariation,
            "tikhonov" => Self::Tikhonov,
            _ => {
                return Err(DenoiseError::UnknownAlgorithm(s.to_string()));
            }
        };
        Ok(id)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Implements `PartialEq`, `Eq` and `Hash` over a key built from the
/// fields; floats go through `to_bits`.
macro_rules! structural_eq {
    ($ty:ty, |$p:ident| $key:expr) => {
        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                let key = |$p: &Self| $key;
                key(self) == key(other)
            }
        }

        impl Eq for $ty {}

        impl Hash for $ty {
            fn hash<H: Hasher>(&self, state: &mut H) {
                let key = |$p: &Self| $key;
                key(self).hash(state);
            }
        }
    };
}

fn check_range<T>(algorithm: AlgorithmId, name: &str, value: T, range: &RangeInclusive<T>) -> DenoiseResult<()>
where
    T: PartialOrd + fmt::Display,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(DenoiseError::InvalidParameter {
            algorithm: algorithm.name(),
            name: name.to_string(),
            reason: format!("{} outside [{}, {}]", value, range.start(), range.end()),
        })
    }
}

fn parse_value<T: FromStr>(algorithm: AlgorithmId, name: &str, value: &str) -> DenoiseResult<T> {
    value.trim().parse().map_err(|_| DenoiseError::InvalidParameter {
        algorithm: algorithm.name(),
        name: name.to_string(),
        reason: format!("cannot parse '{value}'"),
    })
}

fn unknown_key(algorithm: AlgorithmId, name: &str) -> DenoiseError {
    DenoiseError::InvalidParameter {
        algorithm: algorithm.name(),
        name: name.to_string(),
        reason: "no such parameter".to_string(),
    }
}

fn list(algorithm: AlgorithmId, entries: &[(&str, String)]) -> Vec<(String, String)> {
    let mut out = vec![(format!("{PARAM_PREFIX}algorithm"), algorithm.key().to_string())];
    out.extend(
        entries
            .iter()
            .map(|(k, v)| (format!("{PARAM_PREFIX}{}.{k}", algorithm.key()), v.clone())),
    );
    out
}

fn clamp_to(value: f32, range: &RangeInclusive<f32>) -> f32 {
    value.clamp(*range.start(), *range.end())
}

// =============================================================================
// Gaussian
// =============================================================================

/// Gaussian smoothing.
#[derive(Debug, Clone, Copy)]
pub struct GaussianParams {
    /// Standard deviation in pixels.
    pub sigma: f32,
}

structural_eq!(GaussianParams, |p| p.sigma.to_bits());

impl GaussianParams {
    /// Valid `sigma` values.
    pub const SIGMA_RANGE: RangeInclusive<f32> = 0.5..=5.0;

    /// Sigma from a linear fit against the noise level.
    pub fn for_noise(noise: f32) -> Self {
        let sigma = 8.061_676 * noise + 0.534_878_7;
        Self { sigma: clamp_to(sigma, &Self::SIGMA_RANGE) }
    }

    fn validate(&self) -> DenoiseResult<()> {
        check_range(AlgorithmId::Gaussian, "sigma", self.sigma, &Self::SIGMA_RANGE)
    }

    fn set(&mut self, key: &str, value: &str) -> DenoiseResult<()> {
        match key {
            "sigma" => self.sigma = parse_value(AlgorithmId::Gaussian, key, value)?,
            _ => return Err(unknown_key(AlgorithmId::Gaussian, key)),
        }
        Ok(())
    }
}

impl Default for GaussianParams {
    fn default() -> Self {
        Self { sigma: 1.5 }
    }
}

impl fmt::Display for GaussianParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sigma {}", self.sigma)
    }
}

// =============================================================================
// Bilateral
// =============================================================================

/// Bilateral filter.
#[derive(Debug, Clone, Copy)]
pub struct BilateralParams {
    /// Range (intensity) smoothing strength.
    pub h: f32,
    /// Spatial radius in pixels.
    pub radius: u32,
}

structural_eq!(BilateralParams, |p| (p.h.to_bits(), p.radius));

impl BilateralParams {
    /// Valid `h` values.
    pub const H_RANGE: RangeInclusive<f32> = 0.0..=5.0;
    /// Valid `radius` values.
    pub const RADIUS_RANGE: RangeInclusive<u32> = 1..=10;

    fn validate(&self) -> DenoiseResult<()> {
        check_range(AlgorithmId::Bilateral, "h", self.h, &Self::H_RANGE)?;
        check_range(AlgorithmId::Bilateral, "radius", self.radius, &Self::RADIUS_RANGE)
    }

    fn set(&mut self, key: &str, value: &str) -> DenoiseResult<()> {
        let id = AlgorithmId::Bilateral;
        match key {
            "h" => self.h = parse_value(id, key, value)?,
            "r" | "radius" => self.radius = parse_value(id, key, value)?,
            _ => return Err(unknown_key(id, key)),
        }
        Ok(())
    }
}

impl Default for BilateralParams {
    fn default() -> Self {
        Self { h: 1.9, radius: 6 }
    }
}

impl fmt::Display for BilateralParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h {}; radius {}", self.h, self.radius)
    }
}

// =============================================================================
// Anisotropic diffusion
// =============================================================================

/// Perona-Malik anisotropic diffusion.
#[derive(Debug, Clone, Copy)]
pub struct AnisotropicDiffusionParams {
    /// Edge-stopping constant.
    pub diffusion_factor: f32,
    /// Number of explicit iterations.
    pub num_iterations: u32,
    /// Time step per iteration.
    pub step_size: f32,
}

structural_eq!(AnisotropicDiffusionParams, |p| (
    p.diffusion_factor.to_bits(),
    p.num_iterations,
    p.step_size.to_bits()
));

impl AnisotropicDiffusionParams {
    /// Valid `diffusion_factor` values.
    pub const DIFFUSION_FACTOR_RANGE: RangeInclusive<f32> = 0.001..=1.5;
    /// Valid `num_iterations` values.
    pub const NUM_ITERATIONS_RANGE: RangeInclusive<u32> = 1..=40;
    /// Valid `step_size` values. Above 0.25 the explicit scheme is unstable.
    pub const STEP_SIZE_RANGE: RangeInclusive<f32> = 0.01..=0.25;

    /// Diffusion factor from a quadratic fit against the noise level.
    pub fn for_noise(noise: f32) -> Self {
        let k = 2.777_899_7 * noise * noise + 1.541_288_5 * noise;
        Self {
            diffusion_factor: clamp_to(k.max(0.001), &Self::DIFFUSION_FACTOR_RANGE),
            ..Self::default()
        }
    }

    fn validate(&self) -> DenoiseResult<()> {
        let id = AlgorithmId::AnisotropicDiffusion;
        check_range(id, "diffusion_factor", self.diffusion_factor, &Self::DIFFUSION_FACTOR_RANGE)?;
        check_range(id, "num_iterations", self.num_iterations, &Self::NUM_ITERATIONS_RANGE)?;
        check_range(id, "step_size", self.step_size, &Self::STEP_SIZE_RANGE)
    }

    fn set(&mut self, key: &str, value: &str) -> DenoiseResult<()> {
        let id = AlgorithmId::AnisotropicDiffusion;
        match key {
            "diffusion_factor" | "k" => self.diffusion_factor = parse_value(id, key, value)?,
            "num_iterations" | "iterations" => self.num_iterations = parse_value(id, key, value)?,
            "step_size" | "step" => self.step_size = parse_value(id, key, value)?,
            _ => return Err(unknown_key(id, key)),
        }
        Ok(())
    }
}

impl Default for AnisotropicDiffusionParams {
    fn default() -> Self {
        Self { diffusion_factor: 0.5, num_iterations: 5, step_size: 0.2 }
    }
}

impl fmt::Display for AnisotropicDiffusionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "diffusion factor {}; {} iterations; step size {}",
            self.diffusion_factor, self.num_iterations, self.step_size
        )
    }
}

// =============================================================================
// BLS-GSM
// =============================================================================

/// Bayesian least squares Gaussian scale mixture in a steerable pyramid.
#[derive(Debug, Clone, Copy)]
pub struct BlsGsmParams {
    /// Noise standard deviation assumed by the model.
    pub sigma: f32,
    /// Pyramid depth.
    pub scales: u32,
}

structural_eq!(BlsGsmParams, |p| (p.sigma.to_bits(), p.scales));

impl BlsGsmParams {
    /// Valid `sigma` values.
    pub const SIGMA_RANGE: RangeInclusive<f32> = 0.001..=0.5;
    /// Valid `scales` values.
    pub const SCALES_RANGE: RangeInclusive<u32> = 3..=7;

    /// The model sigma is the measured noise level itself.
    pub fn for_noise(noise: f32) -> Self {
        Self { sigma: clamp_to(noise, &Self::SIGMA_RANGE), ..Self::default() }
    }

    fn validate(&self) -> DenoiseResult<()> {
        check_range(AlgorithmId::BlsGsm, "sigma", self.sigma, &Self::SIGMA_RANGE)?;
        check_range(AlgorithmId::BlsGsm, "scales", self.scales, &Self::SCALES_RANGE)
    }

    fn set(&mut self, key: &str, value: &str) -> DenoiseResult<()> {
        let id = AlgorithmId::BlsGsm;
        match key {
            "sigma" => self.sigma = parse_value(id, key, value)?,
            "scales" => self.scales = parse_value(id, key, value)?,
            _ => return Err(unknown_key(id, key)),
        }
        Ok(())
    }
}

impl Default for BlsGsmParams {
    fn default() -> Self {
        Self { sigma: 0.25, scales: 4 }
    }
}

impl fmt::Display for BlsGsmParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sigma {}; {} scales", self.sigma, self.scales)
    }
}

// =============================================================================
// Wavelet thresholding
// =============================================================================

/// Soft thresholding of wavelet detail coefficients.
#[derive(Debug, Clone, Copy)]
pub struct WaveletThresholdingParams {
    /// Threshold on normalized coefficients.
    pub threshold: f32,
}

structural_eq!(WaveletThresholdingParams, |p| p.threshold.to_bits());

impl WaveletThresholdingParams {
    /// Valid `threshold` values.
    pub const THRESHOLD_RANGE: RangeInclusive<f32> = 0.0..=2.0;

    /// Threshold from a quadratic fit against the noise level.
    pub fn for_noise(noise: f32) -> Self {
        let t = (6.836_609 * noise * noise + 2.343_185_4 * noise - 0.005_471_23) / 8.0;
        Self { threshold: clamp_to(t.max(0.001), &Self::THRESHOLD_RANGE) }
    }

    fn validate(&self) -> DenoiseResult<()> {
        check_range(
            AlgorithmId::WaveletThresholding,
            "threshold",
            self.threshold,
            &Self::THRESHOLD_RANGE,
        )
    }

    fn set(&mut self, key: &str, value: &str) -> DenoiseResult<()> {
        let id = AlgorithmId::WaveletThresholding;
        match key {
            "threshold" | "t" => self.threshold = parse_value(id, key, value)?,
            _ => return Err(unknown_key(id, key)),
        }
        Ok(())
    }
}

impl Default for WaveletThresholdingParams {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

impl fmt::Display for WaveletThresholdingParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "threshold {}", self.threshold)
    }
}

// =============================================================================
// Non-local means
// =============================================================================

/// Optional deconvolution step after non-local means.
#[derive(Debug, Clone, Copy)]
pub struct DeconvolutionParams {
    /// Trade-off between denoising and deconvolution.
    pub lambda: f32,
    /// Number of iterations.
    pub num_iterations: u32,
}

structural_eq!(DeconvolutionParams, |p| (p.lambda.to_bits(), p.num_iterations));

impl DeconvolutionParams {
    /// Valid `lambda` values.
    pub const LAMBDA_RANGE: RangeInclusive<f32> = 0.0..=5.0;
    /// Valid `num_iterations` values.
    pub const NUM_ITERATIONS_RANGE: RangeInclusive<u32> = 5..=30;
}

impl Default for DeconvolutionParams {
    fn default() -> Self {
        Self { lambda: 0.3, num_iterations: 20 }
    }
}

/// Length of the fixed noise decorrelation filter.
pub const DECORRELATION_FILTER_TAPS: u32 = 25;

/// Non-local means.
#[derive(Debug, Clone, Copy)]
pub struct NonLocalMeansParams {
    /// Filtering strength.
    pub h: f32,
    /// Half size of the compared blocks.
    pub half_block_size: u32,
    /// Half size of the search window.
    pub half_search_size: u32,
    /// Decorrelate noise before filtering.
    pub decorrelation: bool,
    /// Deconvolution step, if enabled.
    pub deconvolution: Option<DeconvolutionParams>,
}

structural_eq!(NonLocalMeansParams, |p| (
    p.h.to_bits(),
    p.half_block_size,
    p.half_search_size,
    p.decorrelation,
    p.deconvolution
));

impl NonLocalMeansParams {
    /// Valid `h` values.
    pub const H_RANGE: RangeInclusive<f32> = 0.001..=3.0;
    /// Valid `half_block_size` values.
    pub const HALF_BLOCK_SIZE_RANGE: RangeInclusive<u32> = 1..=10;
    /// Valid `half_search_size` values.
    pub const HALF_SEARCH_SIZE_RANGE: RangeInclusive<u32> = 1..=20;

    fn validate(&self) -> DenoiseResult<()> {
        let id = AlgorithmId::NonLocalMeans;
        check_range(id, "h", self.h, &Self::H_RANGE)?;
        check_range(id, "half_block_size", self.half_block_size, &Self::HALF_BLOCK_SIZE_RANGE)?;
        check_range(id, "half_search_size", self.half_search_size, &Self::HALF_SEARCH_SIZE_RANGE)?;
        if let Some(d) = &self.deconvolution {
            check_range(id, "deconvolution.lambda", d.lambda, &DeconvolutionParams::LAMBDA_RANGE)?;
            check_range(
                id,
                "deconvolution.num_iterations",
                d.num_iterations,
                &DeconvolutionParams::NUM_ITERATIONS_RANGE,
            )?;
        }
        Ok(())
    }

    fn set(&mut self, key: &str, value: &str) -> DenoiseResult<()> {
        let id = AlgorithmId::NonLocalMeans;
        match key {
            "h" => self.h = parse_value(id, key, value)?,
            "half_block_size" | "block" => self.half_block_size = parse_value(id, key, value)?,
            "half_search_size" | "search" => self.half_search_size = parse_value(id, key, value)?,
            "decorrelation" => self.decorrelation = parse_value(id, key, value)?,
            "deconvolution" => {
                let on: bool = parse_value(id, key, value)?;
                self.deconvolution = match (on, self.deconvolution) {
                    (true, Some(d)) => Some(d),
                    (true, None) => Some(DeconvolutionParams::default()),
                    (false, _) => None,
                };
            }
            "deconvolution.lambda" | "lambda" => {
                let d = self.deconvolution.get_or_insert_with(DeconvolutionParams::default);
                d.lambda = parse_value(id, key, value)?;
            }
            "deconvolution.num_iterations" | "iterations" => {
                let d = self.deconvolution.get_or_insert_with(DeconvolutionParams::default);
                d.num_iterations = parse_value(id, key, value)?;
            }
            _ => return Err(unknown_key(id, key)),
        }
        Ok(())
    }
}

impl Default for NonLocalMeansParams {
    fn default() -> Self {
        Self {
            h: 2.0,
            half_block_size: 4,
            half_search_size: 5,
            decorrelation: false,
            deconvolution: None,
        }
    }
}

impl fmt::Display for NonLocalMeansParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "h {}; half block size {}; half search size {}; {}decorrelation",
            self.h,
            self.half_block_size,
            self.half_search_size,
            if self.decorrelation { "" } else { "no " }
        )?;
        match &self.deconvolution {
            Some(d) => write!(f, "; deconvolution lambda {} ({} iterations)", d.lambda, d.num_iterations),
            None => f.write_str("; no deconvolution"),
        }
    }
}

/// Non-local means for spatially correlated noise.
///
/// Search and block sizes are fixed; only the strength is tunable.
#[derive(Debug, Clone, Copy)]
pub struct NonLocalMeansScParams {
    /// Filtering strength, on `[0, 255]` intensities.
    pub h: f32,
}

structural_eq!(NonLocalMeansScParams, |p| p.h.to_bits());

impl NonLocalMeansScParams {
    /// Valid `h` values.
    pub const H_RANGE: RangeInclusive<f32> = 0.01..=50.0;
    /// Fixed half search window size.
    pub const HALF_SEARCH_SIZE: u32 = 5;
    /// Fixed half block size.
    pub const HALF_BLOCK_SIZE: u32 = 4;

    fn validate(&self) -> DenoiseResult<()> {
        check_range(AlgorithmId::NonLocalMeansSc, "h", self.h, &Self::H_RANGE)
    }

    fn set(&mut self, key: &str, value: &str) -> DenoiseResult<()> {
        let id = AlgorithmId::NonLocalMeansSc;
        match key {
            "h" => self.h = parse_value(id, key, value)?,
            _ => return Err(unknown_key(id, key)),
        }
        Ok(())
    }
}

impl Default for NonLocalMeansScParams {
    fn default() -> Self {
        Self { h: 13.5 }
    }
}

impl fmt::Display for NonLocalMeansScParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h {}", self.h)
    }
}

/// Non-local means for spatially correlated, signal-dependent noise.
#[derive(Debug, Clone, Copy)]
pub struct NonLocalMeansScdParams {
    /// Filtering strength, on `[0, 255]` intensities.
    pub h: f32,
    /// Noise level at zero signal.
    pub sigma0: f32,
    /// Run a deconvolution step after filtering.
    pub deconvolution: bool,
    /// Deconvolution trade-off.
    pub lambda: f32,
    /// Deconvolution iterations.
    pub num_iterations: u32,
}

structural_eq!(NonLocalMeansScdParams, |p| (
    p.h.to_bits(),
    p.sigma0.to_bits(),
    p.deconvolution,
    p.lambda.to_bits(),
    p.num_iterations
));

impl NonLocalMeansScdParams {
    /// Valid `h` values.
    pub const H_RANGE: RangeInclusive<f32> = 0.01..=75.0;
    /// Valid `sigma0` values.
    pub const SIGMA0_RANGE: RangeInclusive<f32> = 0.01..=100.0;
    /// Valid `lambda` values.
    pub const LAMBDA_RANGE: RangeInclusive<f32> = 0.01..=50.0;
    /// Valid `num_iterations` values.
    pub const NUM_ITERATIONS_RANGE: RangeInclusive<u32> = 1..=100;

    fn validate(&self) -> DenoiseResult<()> {
        let id = AlgorithmId::NonLocalMeansScd;
        check_range(id, "h", self.h, &Self::H_RANGE)?;
        check_range(id, "sigma0", self.sigma0, &Self::SIGMA0_RANGE)?;
        if self.deconvolution {
            check_range(id, "lambda", self.lambda, &Self::LAMBDA_RANGE)?;
            check_range(id, "num_iterations", self.num_iterations, &Self::NUM_ITERATIONS_RANGE)?;
        }
        Ok(())
    }

    fn set(&mut self, key: &str, value: &str) -> DenoiseResult<()> {
        let id = AlgorithmId::NonLocalMeansScd;
        match key {
            "h" => self.h = parse_value(id, key, value)?,
            "sigma0" => self.sigma0 = parse_value(id, key, value)?,
            "deconvolution" => self.deconvolution = parse_value(id, key, value)?,
            "lambda" => self.lambda = parse_value(id, key, value)?,
            "num_iterations" | "iterations" => self.num_iterations = parse_value(id, key, value)?,
            _ => return Err(unknown_key(id, key)),
        }
        Ok(())
    }
}

impl Default for NonLocalMeansScdParams {
    fn default() -> Self {
        Self { h: 40.0, sigma0: 20.0, deconvolution: false, lambda: 0.3, num_iterations: 25 }
    }
}

impl fmt::Display for NonLocalMeansScdParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h {}; sigma0 {}", self.h, self.sigma0)?;
        if self.deconvolution {
            write!(f, "; deconvolution lambda {} ({} iterations)", self.lambda, self.num_iterations)
        } else {
            f.write_str("; no deconvolution")
        }
    }
}

// =============================================================================
// Variational methods
// =============================================================================

/// Total variation regularization.
#[derive(Debug, Clone, Copy)]
pub struct TotalVariationParams {
    /// Regularization weight.
    pub lambda: f32,
    /// Number of iterations.
    pub num_iterations: u32,
    /// Step size.
    pub alpha: f32,
}

structural_eq!(TotalVariationParams, |p| (
    p.lambda.to_bits(),
    p.num_iterations,
    p.alpha.to_bits()
));

impl TotalVariationParams {
    /// Valid `lambda` values.
    pub const LAMBDA_RANGE: RangeInclusive<f32> = 0.01..=1.0;
    /// Valid `num_iterations` values.
    pub const NUM_ITERATIONS_RANGE: RangeInclusive<u32> = 1..=200;
    /// Valid `alpha` values.
    pub const ALPHA_RANGE: RangeInclusive<f32> = 0.01..=1.0;

    fn validate(&self) -> DenoiseResult<()> {
        let id = AlgorithmId::TotalVariation;
        check_range(id, "lambda", self.lambda, &Self::LAMBDA_RANGE)?;
        check_range(id, "num_iterations", self.num_iterations, &Self::NUM_ITERATIONS_RANGE)?;
        check_range(id, "alpha", self.alpha, &Self::ALPHA_RANGE)
    }

    fn set(&mut self, key: &str, value: &str) -> DenoiseResult<()> {
        let id = AlgorithmId::TotalVariation;
        match key {
            "lambda" => self.lambda = parse_value(id, key, value)?,
            "num_iterations" | "iterations" => self.num_iterations = parse_value(id, key, value)?,
            "alpha" => self.alpha = parse_value(id, key, value)?,
            _ => return Err(unknown_key(id, key)),
        }
        Ok(())
    }
}

impl Default for TotalVariationParams {
    fn default() -> Self {
        Self { lambda: 0.05, num_iterations: 100, alpha: 0.01 }
    }
}

impl fmt::Display for TotalVariationParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lambda {}; {} iterations; alpha {}", self.lambda, self.num_iterations, self.alpha)
    }
}

/// Tikhonov regularization, optionally combined with Gaussian deconvolution.
#[derive(Debug, Clone, Copy)]
pub struct TikhonovParams {
    /// Deconvolve with a Gaussian point spread function.
    pub deconvolution: bool,
    /// Regularization weight without deconvolution.
    pub lambda1: f32,
    /// Regularization weight with deconvolution.
    pub lambda2: f32,
    /// Point spread function sigma, used with deconvolution.
    pub sigma: f32,
    /// Number of iterations.
    pub num_iterations: u32,
}

structural_eq!(TikhonovParams, |p| (
    p.deconvolution,
    p.lambda1.to_bits(),
    p.lambda2.to_bits(),
    p.sigma.to_bits(),
    p.num_iterations
));

impl TikhonovParams {
    /// Valid `lambda1`/`lambda2` values.
    pub const LAMBDA_RANGE: RangeInclusive<f32> = 0.02..=8.0;
    /// Valid `sigma` values.
    pub const SIGMA_RANGE: RangeInclusive<f32> = 0.01..=5.0;
    /// Valid `num_iterations` values.
    pub const NUM_ITERATIONS_RANGE: RangeInclusive<u32> = 1..=100;

    /// Weight in effect for the current mode.
    pub fn lambda(&self) -> f32 {
        if self.deconvolution { self.lambda2 } else { self.lambda1 }
    }

    fn validate(&self) -> DenoiseResult<()> {
        let id = AlgorithmId::Tikhonov;
        check_range(id, "lambda1", self.lambda1, &Self::LAMBDA_RANGE)?;
        check_range(id, "lambda2", self.lambda2, &Self::LAMBDA_RANGE)?;
        check_range(id, "sigma", self.sigma, &Self::SIGMA_RANGE)?;
        check_range(id, "num_iterations", self.num_iterations, &Self::NUM_ITERATIONS_RANGE)
    }

    fn set(&mut self, key: &str, value: &str) -> DenoiseResult<()> {
        let id = AlgorithmId::Tikhonov;
        match key {
            "deconvolution" => self.deconvolution = parse_value(id, key, value)?,
            "lambda" if self.deconvolution => self.lambda2 = parse_value(id, key, value)?,
            "lambda" => self.lambda1 = parse_value(id, key, value)?,
            "lambda1" => self.lambda1 = parse_value(id, key, value)?,
            "lambda2" => self.lambda2 = parse_value(id, key, value)?,
            "sigma" => self.sigma = parse_value(id, key, value)?,
            "num_iterations" | "iterations" => self.num_iterations = parse_value(id, key, value)?,
            _ => return Err(unknown_key(id, key)),
        }
        Ok(())
    }
}

impl Default for TikhonovParams {
    fn default() -> Self {
        Self { deconvolution: false, lambda1: 0.5, lambda2: 1.5, sigma: 1.5, num_iterations: 50 }
    }
}

impl fmt::Display for TikhonovParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.deconvolution {
            write!(
                f,
                "deconvolution; lambda {}; sigma {}; {} iterations",
                self.lambda2, self.sigma, self.num_iterations
            )
        } else {
            write!(f, "no deconvolution; lambda {}; {} iterations", self.lambda1, self.num_iterations)
        }
    }
}

// =============================================================================
// Tagged union
// =============================================================================

/// Parameter snapshot for one algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmParams {
    /// See [`GaussianParams`].
    Gaussian(GaussianParams),
    /// See [`BilateralParams`].
    Bilateral(BilateralParams),
    /// See [`AnisotropicDiffusionParams`].
    AnisotropicDiffusion(AnisotropicDiffusionParams),
    /// See [`BlsGsmParams`].
    BlsGsm(BlsGsmParams),
    /// See [`WaveletThresholdingParams`].
    WaveletThresholding(WaveletThresholdingParams),
    /// See [`NonLocalMeansParams`].
    NonLocalMeans(NonLocalMeansParams),
    /// See [`NonLocalMeansScParams`].
    NonLocalMeansSc(NonLocalMeansScParams),
    /// See [`NonLocalMeansScdParams`].
    NonLocalMeansScd(NonLocalMeansScdParams),
    /// See [`TotalVariationParams`].
    TotalVariation(TotalVariationParams),
    /// See [`TikhonovParams`].
    Tikhonov(TikhonovParams),
}

impl AlgorithmParams {
    /// Algorithm these parameters belong to.
    pub fn id(&self) -> AlgorithmId {
        match self {
            Self::Gaussian(_) => AlgorithmId::Gaussian,
            Self::Bilateral(_) => AlgorithmId::Bilateral,
            Self::AnisotropicDiffusion(_) => AlgorithmId::AnisotropicDiffusion,
            Self::BlsGsm(_) => AlgorithmId::BlsGsm,
            Self::WaveletThresholding(_) => AlgorithmId::WaveletThresholding,
            Self::NonLocalMeans(_) => AlgorithmId::NonLocalMeans,
            Self::NonLocalMeansSc(_) => AlgorithmId::NonLocalMeansSc,
            Self::NonLocalMeansScd(_) => AlgorithmId::NonLocalMeansScd,
            Self::TotalVariation(_) => AlgorithmId::TotalVariation,
            Self::Tikhonov(_) => AlgorithmId::Tikhonov,
        }
    }

    /// Checks every value against its documented range.
    pub fn validate(&self) -> DenoiseResult<()> {
        match self {
            Self::Gaussian(p) => p.validate(),
            Self::Bilateral(p) => p.validate(),
            Self::AnisotropicDiffusion(p) => p.validate(),
            Self::BlsGsm(p) => p.validate(),
            Self::WaveletThresholding(p) => p.validate(),
            Self::NonLocalMeans(p) => p.validate(),
            Self::NonLocalMeansSc(p) => p.validate(),
            Self::NonLocalMeansScd(p) => p.validate(),
            Self::TotalVariation(p) => p.validate(),
            Self::Tikhonov(p) => p.validate(),
        }
    }

    /// Sets one parameter from text, e.g. `("sigma", "2.0")`.
    ///
    /// The value is parsed but not range-checked; call
    /// [`validate`](Self::validate) once all values are set.
    pub fn set(&mut self, key: &str, value: &str) -> DenoiseResult<()> {
        let key = key.trim().to_ascii_lowercase();
        match self {
            Self::Gaussian(p) => p.set(&key, value),
            Self::Bilateral(p) => p.set(&key, value),
            Self::AnisotropicDiffusion(p) => p.set(&key, value),
            Self::BlsGsm(p) => p.set(&key, value),
            Self::WaveletThresholding(p) => p.set(&key, value),
            Self::NonLocalMeans(p) => p.set(&key, value),
            Self::NonLocalMeansSc(p) => p.set(&key, value),
            Self::NonLocalMeansScd(p) => p.set(&key, value),
            Self::TotalVariation(p) => p.set(&key, value),
            Self::Tikhonov(p) => p.set(&key, value),
        }
    }

    /// Key/value list describing the parameters, keys prefixed with
    /// [`PARAM_PREFIX`].
    pub fn parameter_list(&self) -> Vec<(String, String)> {
        let id = self.id();
        match self {
            Self::Gaussian(p) => list(id, &[("sigma", p.sigma.to_string())]),
            Self::Bilateral(p) => {
                list(id, &[("h", p.h.to_string()), ("radius", p.radius.to_string())])
            }
            Self::AnisotropicDiffusion(p) => list(
                id,
                &[
                    ("diffusionfactor", p.diffusion_factor.to_string()),
                    ("numiterations", p.num_iterations.to_string()),
                    ("stepsize", p.step_size.to_string()),
                ],
            ),
            Self::BlsGsm(p) => {
                list(id, &[("sigma", p.sigma.to_string()), ("scales", p.scales.to_string())])
            }
            Self::WaveletThresholding(p) => list(id, &[("threshold", p.threshold.to_string())]),
            Self::NonLocalMeans(p) => {
                let mut entries = vec![
                    ("h", p.h.to_string()),
                    ("halfblocksize", p.half_block_size.to_string()),
                    ("halfsearchsize", p.half_search_size.to_string()),
                    ("decorrelation", p.decorrelation.to_string()),
                    ("deconvolution", p.deconvolution.is_some().to_string()),
                ];
                if let Some(d) = &p.deconvolution {
                    entries.push(("deconvolution.lambda", d.lambda.to_string()));
                    entries.push(("deconvolution.numiterations", d.num_iterations.to_string()));
                }
                list(id, &entries)
            }
            Self::NonLocalMeansSc(p) => list(id, &[("h", p.h.to_string())]),
            Self::NonLocalMeansScd(p) => {
                let mut entries = vec![
                    ("h", p.h.to_string()),
                    ("sigma0", p.sigma0.to_string()),
                    ("deconvolution", p.deconvolution.to_string()),
                ];
                if p.deconvolution {
                    entries.push(("lambda", p.lambda.to_string()));
                    entries.push(("numiterations", p.num_iterations.to_string()));
                }
                list(id, &entries)
            }
            Self::TotalVariation(p) => list(
                id,
                &[
                    ("lambda", p.lambda.to_string()),
                    ("numiterations", p.num_iterations.to_string()),
                    ("alpha", p.alpha.to_string()),
                ],
            ),
            Self::Tikhonov(p) => {
                let mut entries = vec![
                    ("deconvolution", p.deconvolution.to_string()),
                    ("lambda", p.lambda().to_string()),
                    ("numiterations", p.num_iterations.to_string()),
                ];
                if p.deconvolution {
                    entries.push(("sigma", p.sigma.to_string()));
                }
                list(id, &entries)
            }
        }
    }

    /// Neighbourhood radius the kernel reads around each output pixel, if
    /// it is bounded.
    ///
    /// Iterative methods report their iteration count, since each step
    /// spreads information by one pixel.
    pub fn support_radius(&self) -> Option<u32> {
        let decorrelation_radius = DECORRELATION_FILTER_TAPS / 2;
        match self {
            Self::Gaussian(p) => Some((3.0 * p.sigma).ceil() as u32),
            Self::Bilateral(p) => Some(p.radius),
            Self::AnisotropicDiffusion(p) => Some(p.num_iterations),
            Self::BlsGsm(p) => Some(1 << (p.scales + 1)),
            Self::WaveletThresholding(_) => Some(16),
            Self::NonLocalMeans(p) => {
                let base = p.half_block_size + p.half_search_size;
                Some(if p.decorrelation { base + decorrelation_radius } else { base })
            }
            Self::NonLocalMeansSc(_) => Some(
                NonLocalMeansScParams::HALF_BLOCK_SIZE
                    + NonLocalMeansScParams::HALF_SEARCH_SIZE
                    + decorrelation_radius,
            ),
            Self::NonLocalMeansScd(_) => Some(
                NonLocalMeansScParams::HALF_BLOCK_SIZE
                    + NonLocalMeansScParams::HALF_SEARCH_SIZE
                    + decorrelation_radius,
            ),
            Self::TotalVariation(p) => Some(p.num_iterations),
            Self::Tikhonov(p) if p.deconvolution => Some((3.0 * p.sigma).ceil() as u32),
            Self::Tikhonov(p) => Some(p.num_iterations),
        }
    }
}

impl fmt::Display for AlgorithmParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.id())?;
        match self {
            Self::Gaussian(p) => fmt::Display::fmt(p, f),
            Self::Bilateral(p) => fmt::Display::fmt(p, f),
            Self::AnisotropicDiffusion(p) => fmt::Display::fmt(p, f),
            Self::BlsGsm(p) => fmt::Display::fmt(p, f),
            Self::WaveletThresholding(p) => fmt::Display::fmt(p, f),
            Self::NonLocalMeans(p) => fmt::Display::fmt(p, f),
            Self::NonLocalMeansSc(p) => fmt::Display::fmt(p, f),
            Self::NonLocalMeansScd(p) => fmt::Display::fmt(p, f),
            Self::TotalVariation(p) => fmt::Display::fmt(p, f),
            Self::Tikhonov(p) => fmt::Display::fmt(p, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_defaults_validate() {
        for id in AlgorithmId::ALL {
            let params = id.default_params();
            assert_eq!(params.id(), id);
            params.validate().unwrap_or_else(|e| panic!("{id}: {e}"));
        }
    }

    #[test]
    fn test_structural_eq_and_hash() {
        let a = AlgorithmParams::Gaussian(GaussianParams { sigma: 2.0 });
        let b = AlgorithmParams::Gaussian(GaussianParams { sigma: 2.0 });
        let c = AlgorithmParams::Gaussian(GaussianParams { sigma: 2.1 });
        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
        assert!(!set.contains(&c));
        assert_ne!(
            AlgorithmParams::BlsGsm(BlsGsmParams { sigma: 0.25, scales: 4 }),
            AlgorithmParams::BlsGsm(BlsGsmParams { sigma: 0.25, scales: 5 })
        );
    }

    #[test]
    fn test_set_and_validate() {
        let mut p = AlgorithmId::Bilateral.default_params();
        p.set("radius", "3").unwrap();
        p.set("H", "0.7").unwrap();
        assert_eq!(p, AlgorithmParams::Bilateral(BilateralParams { h: 0.7, radius: 3 }));

        p.set("radius", "40").unwrap();
        assert!(matches!(p.validate(), Err(DenoiseError::InvalidParameter { .. })));
        assert!(p.set("sigma", "1").is_err());
        assert!(p.set("radius", "abc").is_err());
    }

    #[test]
    fn test_for_noise_clamped() {
        match AlgorithmId::Gaussian.params_for_noise(0.05) {
            AlgorithmParams::Gaussian(p) => assert!((p.sigma - 0.938).abs() < 1e-3),
            other => panic!("unexpected {other:?}"),
        }
        match AlgorithmId::Gaussian.params_for_noise(10.0) {
            AlgorithmParams::Gaussian(p) => assert_eq!(p.sigma, 5.0),
            other => panic!("unexpected {other:?}"),
        }
        match AlgorithmId::WaveletThresholding.params_for_noise(0.0) {
            AlgorithmParams::WaveletThresholding(p) => assert_eq!(p.threshold, 0.001),
            other => panic!("unexpected {other:?}"),
        }
        for id in AlgorithmId::ALL {
            id.params_for_noise(0.08).validate().unwrap();
        }
    }

    #[test]
    fn test_parameter_list_prefix() {
        let list = AlgorithmParams::Tikhonov(TikhonovParams::default()).parameter_list();
        assert_eq!(list[0], ("emd.algorithm".to_string(), "tikhonov".to_string()));
        assert!(list.iter().any(|(k, v)| k == "emd.tikhonov.lambda" && v == "0.5"));
        assert!(!list.iter().any(|(k, _)| k == "emd.tikhonov.sigma"));
    }

    #[test]
    fn test_parse_id() {
        assert_eq!("nlm".parse::<AlgorithmId>().unwrap(), AlgorithmId::NonLocalMeans);
        assert_eq!("Non-Local Means SCD".parse::<AlgorithmId>().unwrap(), AlgorithmId::NonLocalMeansScd);
        assert_eq!("BLS-GSM".parse::<AlgorithmId>().unwrap(), AlgorithmId::BlsGsm);
        assert!("median".parse::<AlgorithmId>().is_err());
        for id in AlgorithmId::ALL {
            assert_eq!(id.key().parse::<AlgorithmId>().unwrap(), id);
        }
    }

    #[test]
    fn test_support_radius() {
        let g = AlgorithmParams::Gaussian(GaussianParams { sigma: 1.5 });
        assert_eq!(g.support_radius(), Some(5));
        assert_eq!(AlgorithmId::TotalVariation.default_params().support_radius(), Some(100));
        assert_eq!(AlgorithmId::Tikhonov.default_params().support_radius(), Some(50));
    }
}
