//! Sample normalization.
//!
//! Kernels work on `f32` samples in a fixed working scale (see
//! [`SampleScale`]). 8-bit images map `[0, 255]` linearly. 16-bit images
//! rarely use their full range, so they map the 2%..98% percentile window
//! of a reference slice, clamped; if the percentiles coincide the full
//! 16-bit range is used instead.
//!
//! One [`Normalizer`] is built per job from the source's current slice and
//! shared by every tile, so tiles of one slice (and all slices of a stack)
//! are mapped consistently.

use emd_core::{BitDepth, Image, PixelBuffer};

use crate::algorithm::SampleScale;

/// Lower percentile for 16-bit windows.
pub const LO_PERCENTILE: u32 = 2;
/// Upper percentile for 16-bit windows.
pub const HI_PERCENTILE: u32 = 98;

/// Mapping between stored samples and a working scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalizer {
    depth: BitDepth,
    lo: f32,
    hi: f32,
}

impl Normalizer {
    /// Builds the mapping for images like `reference`.
    pub fn from_reference(reference: &Image) -> Self {
        match reference.pixels() {
            PixelBuffer::U8(_) => Self { depth: BitDepth::Eight, lo: 0.0, hi: 255.0 },
            PixelBuffer::U16(data) => {
                let (lo, hi) = percentile_window(data);
                Self { depth: BitDepth::Sixteen, lo: lo as f32, hi: hi as f32 }
            }
        }
    }

    /// Identity-range mapping for a bit depth (`[0, max]`).
    pub fn full_range(depth: BitDepth) -> Self {
        Self { depth, lo: 0.0, hi: depth.max_value() as f32 }
    }

    /// Bit depth of the images this normalizer maps.
    pub fn bit_depth(&self) -> BitDepth {
        self.depth
    }

    /// Stored value mapped to 0.
    pub fn lo(&self) -> f32 {
        self.lo
    }

    /// Stored value mapped to the top of the working scale.
    pub fn hi(&self) -> f32 {
        self.hi
    }

    /// Converts `image` to working-scale floats, clamped to the scale.
    pub fn normalize(&self, image: &Image, scale: SampleScale) -> Vec<f32> {
        let top = scale.max();
        let factor = top / (self.hi - self.lo);
        let map = |s: f32| ((s - self.lo) * factor).clamp(0.0, top);
        match image.pixels() {
            PixelBuffer::U8(v) => v.iter().map(|&s| map(s as f32)).collect(),
            PixelBuffer::U16(v) => v.iter().map(|&s| map(s as f32)).collect(),
        }
    }

    /// Converts working-scale floats back to stored samples, rounding and
    /// clipping to the bit depth.
    pub fn denormalize(
        &self,
        data: &[f32],
        width: u32,
        height: u32,
        scale: SampleScale,
    ) -> emd_core::Result<Image> {
        let factor = (self.hi - self.lo) / scale.max();
        let max = self.depth.max_value() as f32;
        let map = |v: f32| (v * factor + self.lo).round().clamp(0.0, max);
        let pixels = match self.depth {
            BitDepth::Eight => PixelBuffer::U8(data.iter().map(|&v| map(v) as u8).collect()),
            BitDepth::Sixteen => PixelBuffer::U16(data.iter().map(|&v| map(v) as u16).collect()),
        };
        Image::from_buffer(width, height, pixels)
    }
}

fn percentile_window(data: &[u16]) -> (u32, u32) {
    let mut hist = vec![0u32; 1 << 16];
    for &s in data {
        hist[s as usize] += 1;
    }
    let lo = ith_percentile(&hist, data.len(), LO_PERCENTILE);
    let hi = ith_percentile(&hist, data.len(), HI_PERCENTILE);
    if lo == hi { (0, u16::MAX as u32) } else { (lo, hi) }
}

/// Smallest intensity `i` such that at least `percentile`% of the pixels
/// lie strictly below it.
fn ith_percentile(hist: &[u32], count: usize, percentile: u32) -> u32 {
    let target = (percentile as u64 * count as u64).div_ceil(100);
    let mut cumul = 0u64;
    for (i, &n) in hist.iter().enumerate() {
        if cumul >= target {
            return i as u32;
        }
        cumul += n as u64;
    }
    (hist.len() - 1) as u32
}
