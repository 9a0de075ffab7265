//! Error types for emd-core operations.
//!
//! The [`Error`] enum covers failures that can occur while building images,
//! cutting regions out of them, and addressing slices of a stack.
//!
//! # Usage
//!
//! ```rust
//! use emd_core::{Error, Result};
//!
//! fn check_slice(index: usize, count: usize) -> Result<()> {
//!     if index == 0 || index > count {
//!         return Err(Error::SliceOutOfRange { index, count });
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by image and stack operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Width or height is zero.
    #[error("invalid image dimensions: {width}x{height}")]
    InvalidDimensions {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// Pixel buffer length does not match `width * height`.
    #[error("buffer size mismatch: expected {expected} samples, got {actual}")]
    BufferSizeMismatch {
        /// Expected sample count.
        expected: usize,
        /// Actual sample count.
        actual: usize,
    },

    /// A region does not lie inside the image.
    #[error("region {x},{y} {width}x{height} outside {image_width}x{image_height} image")]
    RegionOutOfBounds {
        /// Region origin x.
        x: u32,
        /// Region origin y.
        y: u32,
        /// Region width.
        width: u32,
        /// Region height.
        height: u32,
        /// Image width.
        image_width: u32,
        /// Image height.
        image_height: u32,
    },

    /// Two images that must share a bit depth do not.
    #[error("bit depth mismatch: expected {expected}, got {actual}")]
    BitDepthMismatch {
        /// Bit depth of the destination.
        expected: crate::BitDepth,
        /// Bit depth of the source.
        actual: crate::BitDepth,
    },

    /// Slice index is outside `[1, count]`.
    #[error("slice {index} out of range 1..={count}")]
    SliceOutOfRange {
        /// Requested 1-based index.
        index: usize,
        /// Number of slices in the stack.
        count: usize,
    },

    /// A slice range whose bounds are reversed or outside the stack.
    #[error("invalid slice range {first}-{last} for a stack of {count} slices")]
    InvalidSliceRange {
        /// First slice (1-based).
        first: usize,
        /// Last slice (1-based).
        last: usize,
        /// Number of slices in the stack.
        count: usize,
    },

    /// Slices of a stack disagree on geometry or bit depth.
    #[error("slice {index} is {found}, stack expects {expected}")]
    SliceGeometryMismatch {
        /// 1-based index of the offending slice.
        index: usize,
        /// Expected `WxH@depth` description.
        expected: String,
        /// Found `WxH@depth` description.
        found: String,
    },

    /// A stack needs at least one slice.
    #[error("stack has no slices")]
    EmptyStack,

    /// Unparsable textual value (slice range, rectangle).
    #[error("cannot parse {what} from '{input}'")]
    Parse {
        /// What was being parsed.
        what: &'static str,
        /// Offending input.
        input: String,
    },
}
