//! Sample formats.
//!
//! Slices are grayscale and stored either as 8-bit or 16-bit unsigned
//! integers. Kernels work on `f32` in `[0, 1]`; conversion lives in the
//! compute crate's normalizer.

use std::fmt;

/// Storage bit depth of a grayscale image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitDepth {
    /// 8-bit unsigned samples.
    Eight,
    /// 16-bit unsigned samples.
    Sixteen,
}

impl BitDepth {
    /// Number of bits per sample.
    #[inline]
    pub const fn bits(self) -> u32 {
        match self {
            Self::Eight => 8,
            Self::Sixteen => 16,
        }
    }

    /// Bytes used to store one sample.
    #[inline]
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            Self::Eight => 1,
            Self::Sixteen => 2,
        }
    }

    /// Largest representable sample value.
    #[inline]
    pub const fn max_value(self) -> u32 {
        match self {
            Self::Eight => u8::MAX as u32,
            Self::Sixteen => u16::MAX as u32,
        }
    }
}

impl fmt::Display for BitDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit", self.bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_value() {
        assert_eq!(BitDepth::Eight.max_value(), 255);
        assert_eq!(BitDepth::Sixteen.max_value(), 65535);
        assert_eq!(BitDepth::Sixteen.bytes_per_sample(), 2);
        assert_eq!(BitDepth::Eight.to_string(), "8-bit");
    }
}
