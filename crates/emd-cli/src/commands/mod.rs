//! CLI command implementations

pub mod algorithms;
pub mod denoise;
pub mod estimate;
pub mod preview;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use emd_compute::{AlgorithmId, AlgorithmParams, ComputeChannel, CpuKernel, DenoiseEngine};
use emd_core::{Image, PixelBuffer};
use image::{DynamicImage, ImageBuffer, Luma};
use tracing::warn;

use crate::AlgorithmArgs;

/// Load a slice as 8- or 16-bit grayscale.
///
/// Color files are converted to luma; anything wider than 8 bits per
/// channel becomes 16-bit.
pub fn load_slice(path: &Path) -> Result<Image> {
    let decoded = image::open(path)
        .with_context(|| format!("Failed to load: {}", path.display()))?;

    let slice = match decoded {
        DynamicImage::ImageLuma8(buf) => Image::from_u8(buf.width(), buf.height(), buf.into_raw()),
        DynamicImage::ImageLuma16(buf) => Image::from_u16(buf.width(), buf.height(), buf.into_raw()),
        other => {
            let color = other.color();
            warn!(path = %path.display(), ?color, "Converting to grayscale");
            if color.bytes_per_pixel() > color.channel_count() {
                let buf = other.into_luma16();
                Image::from_u16(buf.width(), buf.height(), buf.into_raw())
            } else {
                let buf = other.into_luma8();
                Image::from_u8(buf.width(), buf.height(), buf.into_raw())
            }
        }
    };
    slice.with_context(|| format!("Failed to load: {}", path.display()))
}

/// Save a slice; the format follows the file extension.
pub fn save_slice(path: &Path, slice: &Image) -> Result<()> {
    let (w, h) = slice.dimensions();
    let saved = match slice.pixels() {
        PixelBuffer::U8(data) => {
            ImageBuffer::<Luma<u8>, Vec<u8>>::from_raw(w, h, data.clone()).map(|buf| buf.save(path))
        }
        PixelBuffer::U16(data) => {
            ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w, h, data.clone()).map(|buf| buf.save(path))
        }
    };
    match saved {
        Some(result) => result.with_context(|| format!("Failed to save: {}", path.display())),
        None => bail!("Slice buffer does not match {}x{}", w, h),
    }
}

/// Resolve `-a`/`-p` into a validated parameter snapshot.
///
/// With `noise` set the overrides apply on top of the noise-derived
/// defaults instead of the plain ones.
pub fn resolve_params(args: &AlgorithmArgs, noise: Option<f32>) -> Result<AlgorithmParams> {
    let id: AlgorithmId = args.algorithm.parse()?;
    let mut params = match noise {
        Some(sigma) => id.params_for_noise(sigma),
        None => id.default_params(),
    };
    for pair in &args.params {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Invalid parameter '{}', expected KEY=VALUE", pair);
        };
        params.set(key.trim(), value.trim())?;
    }
    params.validate()?;
    Ok(params)
}

/// Start a compute channel with the CPU kernels.
///
/// The channel must outlive every engine built from its submitter.
pub fn start_engine() -> Result<(ComputeChannel, DenoiseEngine)> {
    let channel = ComputeChannel::new().context("Failed to start compute channel")?;
    let engine = DenoiseEngine::new(channel.submitter(), Arc::new(CpuKernel::new()));
    Ok((channel, engine))
}

/// `<dir>/<stem>_<key>.<ext>`; unknown extensions fall back to PNG.
pub fn output_path(dir: &Path, input: &Path, key: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "slice".to_string());
    let ext = match input.extension().and_then(|e| e.to_str()) {
        Some(e) if matches!(e.to_ascii_lowercase().as_str(), "png" | "tif" | "tiff") => e.to_string(),
        _ => "png".to_string(),
    };
    dir.join(format!("{stem}_{key}.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn algorithm(name: &str, params: &[&str]) -> AlgorithmArgs {
        AlgorithmArgs {
            algorithm: name.to_string(),
            params: params.iter().map(|s| s.to_string()).collect(),
            auto_params: false,
        }
    }

    #[test]
    fn test_resolve_params_overrides() {
        let params = resolve_params(&algorithm("gauss", &["sigma=3.5"]), None).unwrap();
        let mut expected = AlgorithmId::Gaussian.default_params();
        expected.set("sigma", "3.5").unwrap();
        assert_eq!(params, expected);
    }

    #[test]
    fn test_resolve_params_rejects_bad_input() {
        assert!(resolve_params(&algorithm("median", &[]), None).is_err());
        assert!(resolve_params(&algorithm("gaussian", &["sigma"]), None).is_err());
        assert!(resolve_params(&algorithm("gaussian", &["radius=2"]), None).is_err());
    }

    #[test]
    fn test_output_path() {
        let dir = Path::new("out");
        assert_eq!(
            output_path(dir, Path::new("in/s01.TIF"), "gaussian"),
            Path::new("out/s01_gaussian.TIF")
        );
        assert_eq!(
            output_path(dir, Path::new("s01.jpg"), "tv"),
            Path::new("out/s01_tv.png")
        );
    }

    #[test]
    fn test_save_and_load_16bit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.png");
        let data: Vec<u16> = (0..12 * 5).map(|i| i * 1000).collect();
        let slice = Image::from_u16(12, 5, data).unwrap();

        save_slice(&path, &slice).unwrap();
        assert_eq!(load_slice(&path).unwrap(), slice);
    }
}
