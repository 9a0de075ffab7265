//! CPU reference kernels using rayon for parallelization.
//!
//! Implements a subset of the catalogue (Gaussian, bilateral, anisotropic
//! diffusion, total variation, Tikhonov without deconvolution) plus both
//! estimators. Other algorithms report [`KernelError::MissingResource`] so
//! callers can fall back to another [`KernelPort`].
//!
//! Borders are clamped to the edge, so a tile only matches the untiled
//! result when its margin covers the algorithm's support.

use emd_core::Image;
use rayon::prelude::*;

use super::kernel::{Estimate, KernelError, KernelPort};
use crate::algorithm::{
    AlgorithmParams, AnisotropicDiffusionParams, BilateralParams, GaussianParams, SampleScale,
    TikhonovParams, TotalVariationParams,
};
use crate::normalize::Normalizer;

/// Consistency constant turning a median absolute deviation into a
/// Gaussian standard deviation.
const MAD_TO_SIGMA: f32 = 1.4826;

/// Averaging filter length of the blur metric.
const BLUR_FILTER_LEN: usize = 9;

/// Single-channel float image with clamped reads.
struct Plane {
    data: Vec<f32>,
    width: usize,
    height: usize,
}

impl Plane {
    fn new(data: Vec<f32>, width: usize, height: usize) -> Self {
        Self { data, width, height }
    }

    #[inline]
    fn at(&self, x: isize, y: isize) -> f32 {
        let xc = x.clamp(0, self.width as isize - 1) as usize;
        let yc = y.clamp(0, self.height as isize - 1) as usize;
        self.data[yc * self.width + xc]
    }

    /// Builds a new plane by evaluating `f(x, y)` for every pixel, rows in
    /// parallel.
    fn map_rows<F>(&self, f: F) -> Plane
    where
        F: Fn(usize, usize) -> f32 + Sync,
    {
        let mut out = vec![0.0f32; self.data.len()];
        out.par_chunks_mut(self.width).enumerate().for_each(|(y, row)| {
            for (x, v) in row.iter_mut().enumerate() {
                *v = f(x, y);
            }
        });
        Plane::new(out, self.width, self.height)
    }
}

/// rayon-backed [`KernelPort`].
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuKernel;

impl CpuKernel {
    pub fn new() -> Self {
        Self
    }
}

impl KernelPort for CpuKernel {
    fn name(&self) -> &str {
        "CPU"
    }

    fn invoke(
        &self,
        tile: &Image,
        params: &AlgorithmParams,
        normalizer: &Normalizer,
    ) -> Result<Image, KernelError> {
        if tile.bit_depth() != normalizer.bit_depth() {
            return Err(KernelError::InvalidParameter(format!(
                "tile is {}, normalizer expects {}",
                tile.bit_depth(),
                normalizer.bit_depth()
            )));
        }
        let scale = params.id().working_scale();
        let (w, h) = (tile.width() as usize, tile.height() as usize);
        let src = Plane::new(normalizer.normalize(tile, scale), w, h);

        let out = match params {
            AlgorithmParams::Gaussian(p) => gaussian(&src, p),
            AlgorithmParams::Bilateral(p) => bilateral(&src, p),
            AlgorithmParams::AnisotropicDiffusion(p) => anisotropic_diffusion(src, p),
            AlgorithmParams::TotalVariation(p) => total_variation(src, p),
            AlgorithmParams::Tikhonov(p) if !p.deconvolution => tikhonov(src, p),
            other => {
                return Err(KernelError::MissingResource(format!(
                    "no CPU kernel for {}",
                    describe(other)
                )));
            }
        };

        normalizer
            .denormalize(&out.data, tile.width(), tile.height(), scale)
            .map_err(|e| KernelError::Failed(e.to_string()))
    }

    fn estimate(&self, image: &Image, kind: Estimate) -> Result<f32, KernelError> {
        let full = Normalizer::full_range(image.bit_depth());
        let plane = Plane::new(
            full.normalize(image, SampleScale::Unit),
            image.width() as usize,
            image.height() as usize,
        );
        Ok(match kind {
            Estimate::Noise => noise_mad(&plane),
            Estimate::Blur => blur_metric(&plane),
        })
    }
}

fn describe(params: &AlgorithmParams) -> String {
    match params {
        AlgorithmParams::Tikhonov(_) => "Tikhonov deconvolution".to_string(),
        other => other.id().name().to_string(),
    }
}

// =============================================================================
// Filters
// =============================================================================

fn gaussian_kernel(sigma: f32) -> (Vec<f32>, isize) {
    let r = (3.0 * sigma).ceil().max(1.0) as isize;
    let mut kernel: Vec<f32> = (-r..=r)
        .map(|i| {
            let x = i as f32;
            (-x * x / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    for k in &mut kernel {
        *k /= sum;
    }
    (kernel, r)
}

fn gaussian(src: &Plane, p: &GaussianParams) -> Plane {
    let (kernel, r) = gaussian_kernel(p.sigma);

    // Horizontal pass
    let temp = src.map_rows(|x, y| {
        kernel
            .iter()
            .enumerate()
            .map(|(ki, k)| src.at(x as isize + ki as isize - r, y as isize) * k)
            .sum()
    });

    // Vertical pass
    temp.map_rows(|x, y| {
        kernel
            .iter()
            .enumerate()
            .map(|(ki, k)| temp.at(x as isize, y as isize + ki as isize - r) * k)
            .sum()
    })
}

/// Spatial sigma is half the radius; range sigma is `h / 10` in unit
/// intensities.
fn bilateral(src: &Plane, p: &BilateralParams) -> Plane {
    let r = p.radius as isize;
    let spatial = (p.radius as f32 / 2.0).max(0.5);
    let range = (p.h / 10.0).max(1e-4);
    let inv_2s2 = 1.0 / (2.0 * spatial * spatial);
    let inv_2r2 = 1.0 / (2.0 * range * range);

    src.map_rows(|x, y| {
        let (xi, yi) = (x as isize, y as isize);
        let centre = src.at(xi, yi);
        let mut acc = 0.0;
        let mut norm = 0.0;
        for dy in -r..=r {
            for dx in -r..=r {
                let v = src.at(xi + dx, yi + dy);
                let d2 = (dx * dx + dy * dy) as f32;
                let diff = v - centre;
                let w = (-d2 * inv_2s2 - diff * diff * inv_2r2).exp();
                acc += v * w;
                norm += w;
            }
        }
        acc / norm
    })
}

/// Perona-Malik diffusion with the `1 / (1 + (|grad| / K)^2)` conductance.
fn anisotropic_diffusion(mut u: Plane, p: &AnisotropicDiffusionParams) -> Plane {
    let k2 = p.diffusion_factor * p.diffusion_factor;
    let g = |d: f32| 1.0 / (1.0 + d * d / k2);
    for _ in 0..p.num_iterations {
        u = u.map_rows(|x, y| {
            let (xi, yi) = (x as isize, y as isize);
            let c = u.at(xi, yi);
            let n = u.at(xi, yi - 1) - c;
            let s = u.at(xi, yi + 1) - c;
            let e = u.at(xi + 1, yi) - c;
            let w = u.at(xi - 1, yi) - c;
            c + p.step_size * (g(n) * n + g(s) * s + g(e) * e + g(w) * w)
        });
    }
    u
}

/// Gradient descent on `lambda * TV(u) + |u - f|^2 / 2`.
fn total_variation(f: Plane, p: &TotalVariationParams) -> Plane {
    const EPS2: f32 = 1e-4;
    let mut u = Plane::new(f.data.clone(), f.width, f.height);
    for _ in 0..p.num_iterations {
        // Normalized forward-difference gradient field.
        let px = u.map_rows(|x, y| {
            let (xi, yi) = (x as isize, y as isize);
            let gx = u.at(xi + 1, yi) - u.at(xi, yi);
            let gy = u.at(xi, yi + 1) - u.at(xi, yi);
            gx / (gx * gx + gy * gy + EPS2).sqrt()
        });
        let py = u.map_rows(|x, y| {
            let (xi, yi) = (x as isize, y as isize);
            let gx = u.at(xi + 1, yi) - u.at(xi, yi);
            let gy = u.at(xi, yi + 1) - u.at(xi, yi);
            gy / (gx * gx + gy * gy + EPS2).sqrt()
        });
        u = u.map_rows(|x, y| {
            let (xi, yi) = (x as isize, y as isize);
            let div = px.at(xi, yi) - px.at(xi - 1, yi) + py.at(xi, yi) - py.at(xi, yi - 1);
            let c = u.at(xi, yi);
            c - p.alpha * ((c - f.at(xi, yi)) - p.lambda * div)
        });
    }
    u
}

/// Gradient descent on `|u - f|^2 / 2 + lambda * |grad u|^2 / 2`.
fn tikhonov(f: Plane, p: &TikhonovParams) -> Plane {
    let lambda = p.lambda1;
    let step = 1.0 / (1.0 + 8.0 * lambda);
    let mut u = Plane::new(f.data.clone(), f.width, f.height);
    for _ in 0..p.num_iterations {
        u = u.map_rows(|x, y| {
            let (xi, yi) = (x as isize, y as isize);
            let c = u.at(xi, yi);
            let lap = u.at(xi - 1, yi) + u.at(xi + 1, yi) + u.at(xi, yi - 1) + u.at(xi, yi + 1)
                - 4.0 * c;
            c - step * ((c - f.at(xi, yi)) - lambda * lap)
        });
    }
    u
}

// =============================================================================
// Estimators
// =============================================================================

/// Robust noise sigma from the finest diagonal Haar detail band.
fn noise_mad(img: &Plane) -> f32 {
    let (bw, bh) = (img.width / 2, img.height / 2);
    if bw == 0 || bh == 0 {
        return 0.0;
    }
    let mut detail: Vec<f32> = (0..bh)
        .into_par_iter()
        .flat_map_iter(|by| {
            (0..bw).map(move |bx| {
                let (x, y) = (2 * bx, 2 * by);
                let i = y * img.width + x;
                let a = img.data[i];
                let b = img.data[i + 1];
                let c = img.data[i + img.width];
                let d = img.data[i + img.width + 1];
                ((a - b - c + d) / 2.0).abs()
            })
        })
        .collect();
    median(&mut detail) * MAD_TO_SIGMA
}

fn median(data: &mut [f32]) -> f32 {
    if data.is_empty() {
        return 0.0;
    }
    let mid = data.len() / 2;
    let (_, m, _) = data.select_nth_unstable_by(mid, f32::total_cmp);
    *m
}

/// No-reference blur metric (Crete-Roffet et al.): compares neighbour
/// differences before and after a strong 1-D blur. Ranges from 0 (sharp)
/// to 1 (blurry); the larger of the horizontal and vertical scores wins.
fn blur_metric(img: &Plane) -> f32 {
    let half = (BLUR_FILTER_LEN / 2) as isize;
    let inv = 1.0 / BLUR_FILTER_LEN as f32;
    let blur_h = img.map_rows(|x, y| {
        (-half..=half).map(|k| img.at(x as isize + k, y as isize)).sum::<f32>() * inv
    });
    let blur_v = img.map_rows(|x, y| {
        (-half..=half).map(|k| img.at(x as isize, y as isize + k)).sum::<f32>() * inv
    });

    let score = |dx: isize, dy: isize, blurred: &Plane| -> f32 {
        let (mut s_f, mut s_v) = (0.0f64, 0.0f64);
        for y in dy as usize..img.height {
            for x in dx as usize..img.width {
                let (xi, yi) = (x as isize, y as isize);
                let d_f = (img.at(xi, yi) - img.at(xi - dx, yi - dy)).abs();
                let d_b = (blurred.at(xi, yi) - blurred.at(xi - dx, yi - dy)).abs();
                s_f += d_f as f64;
                s_v += (d_f - d_b).max(0.0) as f64;
            }
        }
        if s_f <= f64::EPSILON { 1.0 } else { ((s_f - s_v) / s_f) as f32 }
    };

    score(1, 0, &blur_h).max(score(0, 1, &blur_v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::AlgorithmId;
    use emd_core::BitDepth;

    fn noisy(w: u32, h: u32, seed: u32) -> Image {
        let mut state = seed;
        let data = (0..w * h)
            .map(|i| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                let n = (state >> 24) as i32 - 128;
                (128 + n / 4 + ((i % w) as i32 / 8)).clamp(0, 255) as u8
            })
            .collect();
        Image::from_u8(w, h, data).unwrap()
    }

    #[test]
    fn test_gaussian_preserves_flat() {
        let img = Image::from_u8(17, 9, vec![100; 17 * 9]).unwrap();
        let n = Normalizer::from_reference(&img);
        let out = CpuKernel.invoke(&img, &AlgorithmId::Gaussian.default_params(), &n).unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn test_filters_keep_geometry_and_reduce_noise() {
        let img = noisy(48, 40, 7);
        let n = Normalizer::from_reference(&img);
        let before = CpuKernel.estimate(&img, Estimate::Noise).unwrap();
        for id in [
            AlgorithmId::Gaussian,
            AlgorithmId::Bilateral,
            AlgorithmId::AnisotropicDiffusion,
            AlgorithmId::TotalVariation,
            AlgorithmId::Tikhonov,
        ] {
            let out = CpuKernel.invoke(&img, &id.default_params(), &n).unwrap();
            assert_eq!(out.dimensions(), img.dimensions(), "{id}");
            assert_eq!(out.bit_depth(), BitDepth::Eight);
            let after = CpuKernel.estimate(&out, Estimate::Noise).unwrap();
            assert!(after < before, "{id}: {after} !< {before}");
        }
    }

    #[test]
    fn test_missing_kernels() {
        let img = noisy(8, 8, 1);
        let n = Normalizer::from_reference(&img);
        let err = CpuKernel.invoke(&img, &AlgorithmId::BlsGsm.default_params(), &n).unwrap_err();
        assert!(matches!(err, KernelError::MissingResource(_)));

        let mut deconv = AlgorithmId::Tikhonov.default_params();
        deconv.set("deconvolution", "true").unwrap();
        assert!(matches!(
            CpuKernel.invoke(&img, &deconv, &n),
            Err(KernelError::MissingResource(_))
        ));
    }

    #[test]
    fn test_depth_mismatch_rejected() {
        let img = noisy(8, 8, 1);
        let n = Normalizer::full_range(BitDepth::Sixteen);
        assert!(matches!(
            CpuKernel.invoke(&img, &AlgorithmId::Gaussian.default_params(), &n),
            Err(KernelError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_noise_estimate_flat_is_zero() {
        let img = Image::from_u16(32, 32, vec![1234; 1024]).unwrap();
        assert_eq!(CpuKernel.estimate(&img, Estimate::Noise).unwrap(), 0.0);
    }

    #[test]
    fn test_blur_metric_orders_images() {
        let img = noisy(64, 64, 3);
        let n = Normalizer::from_reference(&img);
        let mut params = AlgorithmId::Gaussian.default_params();
        params.set("sigma", "3").unwrap();
        let blurred = CpuKernel.invoke(&img, &params, &n).unwrap();
        let sharp_score = CpuKernel.estimate(&img, Estimate::Blur).unwrap();
        let blur_score = CpuKernel.estimate(&blurred, Estimate::Blur).unwrap();
        assert!((0.0..=1.0).contains(&sharp_score));
        assert!(blur_score > sharp_score);
    }
}
