//! Grayscale image buffer.
//!
//! [`Image`] owns a row-major buffer of `width * height` samples at either
//! 8 or 16 bits. Every transformation (crop, kernel output) yields a new
//! image; [`Image::paste`] is only meant for canvases owned by the caller,
//! e.g. the output slice a tiled job is assembling.
//!
//! ```rust
//! use emd_core::{Image, Rect};
//!
//! let img = Image::from_u8(4, 2, vec![0, 1, 2, 3, 4, 5, 6, 7]).unwrap();
//! let right = img.crop(Rect::new(2, 0, 2, 2)).unwrap();
//! assert_eq!(right.as_u8(), Some(&[2, 3, 6, 7][..]));
//! ```

use std::fmt;

use crate::{BitDepth, Error, Rect, Result};

/// Sample storage for an [`Image`].
#[derive(Clone, PartialEq, Eq)]
pub enum PixelBuffer {
    /// 8-bit samples.
    U8(Vec<u8>),
    /// 16-bit samples.
    U16(Vec<u16>),
}

impl PixelBuffer {
    /// Zero-filled buffer of `len` samples.
    pub fn zeroed(depth: BitDepth, len: usize) -> Self {
        match depth {
            BitDepth::Eight => Self::U8(vec![0; len]),
            BitDepth::Sixteen => Self::U16(vec![0; len]),
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::U16(v) => v.len(),
        }
    }

    /// True if the buffer holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bit depth of the stored samples.
    pub fn bit_depth(&self) -> BitDepth {
        match self {
            Self::U8(_) => BitDepth::Eight,
            Self::U16(_) => BitDepth::Sixteen,
        }
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PixelBuffer::{}({} samples)", self.bit_depth(), self.len())
    }
}

/// Owned grayscale image.
#[derive(Clone, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    pixels: PixelBuffer,
}

impl Image {
    /// Zero-filled image.
    pub fn blank(width: u32, height: u32, depth: BitDepth) -> Result<Self> {
        let len = checked_len(width, height)?;
        Ok(Self { width, height, pixels: PixelBuffer::zeroed(depth, len) })
    }

    /// Wraps an existing buffer, validating its length.
    pub fn from_buffer(width: u32, height: u32, pixels: PixelBuffer) -> Result<Self> {
        let expected = checked_len(width, height)?;
        if pixels.len() != expected {
            return Err(Error::BufferSizeMismatch { expected, actual: pixels.len() });
        }
        Ok(Self { width, height, pixels })
    }

    /// 8-bit image from raw samples.
    pub fn from_u8(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        Self::from_buffer(width, height, PixelBuffer::U8(data))
    }

    /// 16-bit image from raw samples.
    pub fn from_u16(width: u32, height: u32, data: Vec<u16>) -> Result<Self> {
        Self::from_buffer(width, height, PixelBuffer::U16(data))
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)`.
    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Full-image rectangle.
    #[inline]
    pub fn bounds(&self) -> Rect {
        Rect::from_size(self.width, self.height)
    }

    /// Storage bit depth.
    #[inline]
    pub fn bit_depth(&self) -> BitDepth {
        self.pixels.bit_depth()
    }

    /// Underlying sample buffer.
    #[inline]
    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }

    /// Consumes the image, returning its buffer.
    pub fn into_pixels(self) -> PixelBuffer {
        self.pixels
    }

    /// 8-bit samples, if this is an 8-bit image.
    pub fn as_u8(&self) -> Option<&[u8]> {
        match &self.pixels {
            PixelBuffer::U8(v) => Some(v),
            PixelBuffer::U16(_) => None,
        }
    }

    /// 16-bit samples, if this is a 16-bit image.
    pub fn as_u16(&self) -> Option<&[u16]> {
        match &self.pixels {
            PixelBuffer::U16(v) => Some(v),
            PixelBuffer::U8(_) => None,
        }
    }

    /// Sample at `(x, y)` widened to `u32`, or `None` outside the image.
    pub fn sample(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y as usize * self.width as usize + x as usize;
        Some(match &self.pixels {
            PixelBuffer::U8(v) => v[idx] as u32,
            PixelBuffer::U16(v) => v[idx] as u32,
        })
    }

    /// Number of samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    /// Always false for a constructed image; present for API symmetry.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Bytes held by the sample buffer.
    pub fn size_bytes(&self) -> usize {
        self.len() * self.bit_depth().bytes_per_sample()
    }

    /// Smallest and largest sample value.
    pub fn min_max(&self) -> (u32, u32) {
        fn fold<T: Copy + Into<u32>>(data: &[T]) -> (u32, u32) {
            data.iter().fold((u32::MAX, 0), |(lo, hi), &s| {
                let s: u32 = s.into();
                (lo.min(s), hi.max(s))
            })
        }
        match &self.pixels {
            PixelBuffer::U8(v) => fold(v),
            PixelBuffer::U16(v) => fold(v),
        }
    }

    /// Copies `region` into a new image.
    pub fn crop(&self, region: Rect) -> Result<Image> {
        self.check_region(region)?;
        let src_w = self.width as usize;
        let (x, y) = (region.x as usize, region.y as usize);
        let (w, h) = (region.width as usize, region.height as usize);
        let pixels = match &self.pixels {
            PixelBuffer::U8(v) => PixelBuffer::U8(copy_rows(v, src_w, x, y, w, h)),
            PixelBuffer::U16(v) => PixelBuffer::U16(copy_rows(v, src_w, x, y, w, h)),
        };
        Ok(Image { width: region.width, height: region.height, pixels })
    }

    /// Writes `src` into this image with its top-left corner at `(x, y)`.
    pub fn paste(&mut self, src: &Image, x: u32, y: u32) -> Result<()> {
        let region = Rect::new(x, y, src.width, src.height);
        self.check_region(region)?;
        let dst_w = self.width as usize;
        let src_w = src.width as usize;
        match (&mut self.pixels, &src.pixels) {
            (PixelBuffer::U8(dst), PixelBuffer::U8(s)) => {
                paste_rows(dst, dst_w, s, src_w, x as usize, y as usize)
            }
            (PixelBuffer::U16(dst), PixelBuffer::U16(s)) => {
                paste_rows(dst, dst_w, s, src_w, x as usize, y as usize)
            }
            (dst, s) => {
                return Err(Error::BitDepthMismatch {
                    expected: dst.bit_depth(),
                    actual: s.bit_depth(),
                });
            }
        }
        Ok(())
    }

    fn check_region(&self, region: Rect) -> Result<()> {
        if region.is_empty() || !self.bounds().contains_rect(&region) {
            return Err(Error::RegionOutOfBounds {
                x: region.x,
                y: region.y,
                width: region.width,
                height: region.height,
                image_width: self.width,
                image_height: self.height,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bit_depth", &self.bit_depth())
            .finish()
    }
}

fn checked_len(width: u32, height: u32) -> Result<usize> {
    if width == 0 || height == 0 {
        return Err(Error::InvalidDimensions { width, height });
    }
    (width as usize)
        .checked_mul(height as usize)
        .ok_or(Error::InvalidDimensions { width, height })
}

fn copy_rows<T: Copy>(src: &[T], src_w: usize, x: usize, y: usize, w: usize, h: usize) -> Vec<T> {
    let mut out = Vec::with_capacity(w * h);
    for row in y..y + h {
        let start = row * src_w + x;
        out.extend_from_slice(&src[start..start + w]);
    }
    out
}

fn paste_rows<T: Copy>(dst: &mut [T], dst_w: usize, src: &[T], src_w: usize, x: usize, y: usize) {
    for (row, chunk) in src.chunks_exact(src_w).enumerate() {
        let start = (y + row) * dst_w + x;
        dst[start..start + src_w].copy_from_slice(chunk);
    }
}
