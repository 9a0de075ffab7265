//! # emd-core
//!
//! Core types for tiled slice denoising.
//!
//! - [`Image`], [`PixelBuffer`] - owned 8/16-bit grayscale buffers
//! - [`BitDepth`] - sample storage format
//! - [`Rect`] - pixel regions (tiles, regions of interest)
//! - [`SliceSource`], [`SliceStack`] - 1-based stacks of slices
//! - [`SliceRange`], [`RangeSelector`] - validated slice selections
//!
//! ## Crate Structure
//!
//! ```text
//! emd-core (this crate)
//!    ^
//!    |
//!    +-- emd-compute (tiling, compute channel, engine, preview cache)
//!    +-- emd-cli (command-line driver)
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod format;
pub mod image;
pub mod rect;
pub mod stack;

pub use error::*;
pub use format::BitDepth;
pub use image::{Image, PixelBuffer};
pub use rect::Rect;
pub use stack::{DisplayRange, RangeSelector, SliceRange, SliceSource, SliceStack};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        BitDepth, DisplayRange, Error, Image, PixelBuffer, RangeSelector, Rect, Result,
        SliceRange, SliceSource, SliceStack,
    };
}
