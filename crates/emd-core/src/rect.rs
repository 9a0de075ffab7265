//! Rectangle type for image regions.
//!
//! Coordinates follow the usual image convention: origin at the top-left
//! corner, x to the right, y downward. Rectangles are half-open, so a
//! rectangle at `(x, y)` with size `w x h` covers `[x, x+w) x [y, y+h)`.
//!
//! ```rust
//! use emd_core::Rect;
//!
//! let roi = Rect::new(10, 20, 100, 50);
//! assert!(roi.contains(15, 25));
//! assert!(Rect::from_size(512, 512).contains_rect(&roi));
//! ```

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Rect {
    /// Creates a rectangle from origin and size.
    #[inline]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle at the origin covering `width x height`.
    #[inline]
    pub const fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Exclusive right edge.
    #[inline]
    pub const fn right(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    /// Exclusive bottom edge.
    #[inline]
    pub const fn bottom(&self) -> u64 {
        self.y as u64 + self.height as u64
    }

    /// Number of pixels covered.
    #[inline]
    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// True if the rectangle covers no pixels.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Checks whether the point lies inside.
    #[inline]
    pub fn contains(&self, px: u32, py: u32) -> bool {
        px >= self.x && py >= self.y && (px as u64) < self.right() && (py as u64) < self.bottom()
    }

    /// Checks whether `other` lies entirely inside this rectangle.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Overlapping part of two rectangles, if any.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 as u64 || y1 <= y0 as u64 {
            return None;
        }
        Some(Rect::new(x0, y0, (x1 - x0 as u64) as u32, (y1 - y0 as u64) as u32))
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{} {}x{}", self.x, self.y, self.width, self.height)
    }
}

/// Parses `x,y,w,h`.
impl FromStr for Rect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parse_err = || Error::Parse { what: "rectangle", input: s.to_string() };
        let parts: Vec<u32> = s
            .split(',')
            .map(|p| p.trim().parse::<u32>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| parse_err())?;
        match parts.as_slice() {
            [x, y, w, h] => Ok(Rect::new(*x, *y, *w, *h)),
            _ => Err(parse_err()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains() {
        let r = Rect::new(10, 10, 5, 5);
        assert!(r.contains(10, 10));
        assert!(r.contains(14, 14));
        assert!(!r.contains(15, 10));
        assert!(!r.contains(9, 12));
    }

    #[test]
    fn test_intersect() {
        let a = Rect::new(0, 0, 100, 100);
        let b = Rect::new(50, 60, 100, 100);
        assert_eq!(a.intersect(&b), Some(Rect::new(50, 60, 50, 40)));
        assert_eq!(a.intersect(&Rect::new(100, 0, 10, 10)), None);
    }

    #[test]
    fn test_contains_rect_no_overflow() {
        let image = Rect::from_size(64, 64);
        assert!(!image.contains_rect(&Rect::new(u32::MAX, 0, 2, 2)));
        assert!(image.contains_rect(&Rect::new(32, 32, 32, 32)));
    }

    #[test]
    fn test_parse() {
        assert_eq!("1,2,3,4".parse::<Rect>().unwrap(), Rect::new(1, 2, 3, 4));
        assert_eq!(" 8, 8, 64 ,64".parse::<Rect>().unwrap(), Rect::new(8, 8, 64, 64));
        assert!("1,2,3".parse::<Rect>().is_err());
        assert!("a,b,c,d".parse::<Rect>().is_err());
    }
}
