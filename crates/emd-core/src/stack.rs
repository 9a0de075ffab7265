//! Slice stacks and slice ranges.
//!
//! A stack is an ordered set of same-sized grayscale slices addressed with
//! 1-based indices, as in microscopy viewers. [`SliceSource`] is the
//! read-only view the denoising engine needs; [`SliceStack`] is the
//! in-memory implementation used for inputs and results.
//!
//! ```rust
//! use emd_core::{Image, SliceRange, SliceSource, SliceStack, RangeSelector};
//!
//! let slices = (0..10).map(|_| Image::from_u8(2, 2, vec![0; 4]).unwrap()).collect();
//! let stack = SliceStack::new("cells", slices).unwrap();
//! let range = SliceRange::resolve(RangeSelector::Explicit(2, 4), &stack).unwrap();
//! assert_eq!(range.len(), 3);
//! assert_eq!(range.iter().collect::<Vec<_>>(), vec![2, 3, 4]);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use crate::{BitDepth, Error, Image, Result};

/// Intensity window a viewer maps to black and white.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayRange {
    /// Value shown as black.
    pub min: f64,
    /// Value shown as white.
    pub max: f64,
}

impl DisplayRange {
    /// Creates a display range.
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Full range of a bit depth.
    pub fn full(depth: BitDepth) -> Self {
        Self::new(0.0, depth.max_value() as f64)
    }
}

/// Read-only access to a stack of slices.
///
/// Indices are 1-based.
pub trait SliceSource: Send + Sync {
    /// Number of slices.
    fn slice_count(&self) -> usize;

    /// Returns slice `index` (1-based).
    fn slice(&self, index: usize) -> Result<Image>;

    /// 1-based index of the slice currently shown to the user.
    fn current_slice(&self) -> usize;

    /// Display window of the source.
    fn display_range(&self) -> DisplayRange;

    /// Human-readable name.
    fn title(&self) -> &str {
        "untitled"
    }
}

/// In-memory stack of same-sized slices.
#[derive(Debug, Clone)]
pub struct SliceStack {
    title: String,
    slices: Vec<Image>,
    current: usize,
    display_range: DisplayRange,
    info: BTreeMap<String, String>,
}

impl SliceStack {
    /// Builds a stack, checking all slices share geometry and bit depth.
    ///
    /// The display range defaults to the min/max of the first slice.
    pub fn new(title: impl Into<String>, slices: Vec<Image>) -> Result<Self> {
        let first = slices.first().ok_or(Error::EmptyStack)?;
        let describe = |img: &Image| format!("{}x{}@{}", img.width(), img.height(), img.bit_depth());
        let expected = describe(first);
        for (i, img) in slices.iter().enumerate().skip(1) {
            if img.dimensions() != first.dimensions() || img.bit_depth() != first.bit_depth() {
                return Err(Error::SliceGeometryMismatch {
                    index: i + 1,
                    expected,
                    found: describe(img),
                });
            }
        }
        let (lo, hi) = first.min_max();
        Ok(Self {
            title: title.into(),
            display_range: DisplayRange::new(lo as f64, hi as f64),
            slices,
            current: 1,
            info: BTreeMap::new(),
        })
    }

    /// Single-slice stack.
    pub fn single(title: impl Into<String>, image: Image) -> Self {
        let (lo, hi) = image.min_max();
        Self {
            title: title.into(),
            slices: vec![image],
            current: 1,
            display_range: DisplayRange::new(lo as f64, hi as f64),
            info: BTreeMap::new(),
        }
    }

    /// Selects the current slice (1-based).
    pub fn set_current_slice(&mut self, index: usize) -> Result<()> {
        check_index(index, self.slices.len())?;
        self.current = index;
        Ok(())
    }

    /// Overrides the display range.
    pub fn set_display_range(&mut self, range: DisplayRange) {
        self.display_range = range;
    }

    /// Renames the stack.
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    /// Free-form metadata attached to the stack.
    pub fn info(&self) -> &BTreeMap<String, String> {
        &self.info
    }

    /// Adds or replaces a metadata entry.
    pub fn set_info(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.info.insert(key.into(), value.into());
    }

    /// Borrows slice `index` (1-based) without copying.
    pub fn get(&self, index: usize) -> Result<&Image> {
        check_index(index, self.slices.len())?;
        Ok(&self.slices[index - 1])
    }

    /// All slices in order.
    pub fn slices(&self) -> &[Image] {
        &self.slices
    }

    /// Consumes the stack, returning its slices.
    pub fn into_slices(self) -> Vec<Image> {
        self.slices
    }

    /// `(width, height)` shared by every slice.
    pub fn dimensions(&self) -> (u32, u32) {
        self.slices[0].dimensions()
    }

    /// Bit depth shared by every slice.
    pub fn bit_depth(&self) -> BitDepth {
        self.slices[0].bit_depth()
    }
}

impl SliceSource for SliceStack {
    fn slice_count(&self) -> usize {
        self.slices.len()
    }

    fn slice(&self, index: usize) -> Result<Image> {
        self.get(index).cloned()
    }

    fn current_slice(&self) -> usize {
        self.current
    }

    fn display_range(&self) -> DisplayRange {
        self.display_range
    }

    fn title(&self) -> &str {
        &self.title
    }
}

fn check_index(index: usize, count: usize) -> Result<()> {
    if index == 0 || index > count {
        return Err(Error::SliceOutOfRange { index, count });
    }
    Ok(())
}

/// How the user picked the slices to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeSelector {
    /// Only the slice currently shown.
    Current,
    /// Every slice of the stack.
    All,
    /// Inclusive 1-based range `first..=last`.
    Explicit(usize, usize),
}

impl fmt::Display for RangeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Current => f.write_str("current"),
            Self::All => f.write_str("all"),
            Self::Explicit(a, b) if a == b => write!(f, "{a}"),
            Self::Explicit(a, b) => write!(f, "{a}-{b}"),
        }
    }
}

/// Parses `current`, `all`, `N` or `A-B`.
impl FromStr for RangeSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let parse_err = || Error::Parse { what: "slice range", input: s.to_string() };
        match s.to_ascii_lowercase().as_str() {
            "current" | "cur" => return Ok(Self::Current),
            "all" => return Ok(Self::All),
            _ => {}
        }
        let num = |p: &str| p.trim().parse::<usize>().map_err(|_| parse_err());
        match s.split_once('-') {
            Some((a, b)) => Ok(Self::Explicit(num(a)?, num(b)?)),
            None => {
                let n = num(s)?;
                Ok(Self::Explicit(n, n))
            }
        }
    }
}

/// A validated, inclusive range of 1-based slice indices.
///
/// Bounds always lie within `[1, slice_count]` of the source it was
/// resolved against; a `Current` range has `first == last`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SliceRange {
    kind: RangeSelector,
    first: usize,
    last: usize,
}

impl SliceRange {
    /// The current slice of `source`.
    pub fn current<S: SliceSource + ?Sized>(source: &S) -> Result<Self> {
        Self::resolve(RangeSelector::Current, source)
    }

    /// Every slice of `source`.
    pub fn all<S: SliceSource + ?Sized>(source: &S) -> Result<Self> {
        Self::resolve(RangeSelector::All, source)
    }

    /// Slices `first..=last` of `source`.
    pub fn explicit<S: SliceSource + ?Sized>(source: &S, first: usize, last: usize) -> Result<Self> {
        Self::resolve(RangeSelector::Explicit(first, last), source)
    }

    /// Resolves a selector against a source, validating bounds.
    pub fn resolve<S: SliceSource + ?Sized>(selector: RangeSelector, source: &S) -> Result<Self> {
        let count = source.slice_count();
        let (first, last) = match selector {
            RangeSelector::Current => (source.current_slice(), source.current_slice()),
            RangeSelector::All => (1, count),
            RangeSelector::Explicit(a, b) => (a, b),
        };
        if first == 0 || first > last || last > count {
            return Err(Error::InvalidSliceRange { first, last, count });
        }
        Ok(Self { kind: selector, first, last })
    }

    /// Selector this range was resolved from.
    pub fn kind(&self) -> RangeSelector {
        self.kind
    }

    /// First slice (1-based).
    pub fn first(&self) -> usize {
        self.first
    }

    /// Last slice (1-based, inclusive).
    pub fn last(&self) -> usize {
        self.last
    }

    /// Number of slices in the range.
    pub fn len(&self) -> usize {
        self.last - self.first + 1
    }

    /// Never empty once resolved.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Ascending slice indices.
    pub fn iter(&self) -> RangeInclusive<usize> {
        self.first..=self.last
    }
}

impl fmt::Display for SliceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{} ({})", self.first, self.last, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(n: usize) -> SliceStack {
        let slices = (0..n)
            .map(|i| Image::from_u8(3, 2, vec![i as u8; 6]).unwrap())
            .collect();
        SliceStack::new("test", slices).unwrap()
    }

    #[test]
    fn test_resolve_current_and_all() {
        let mut s = stack(5);
        s.set_current_slice(4).unwrap();
        let cur = SliceRange::current(&s).unwrap();
        assert_eq!((cur.first(), cur.last()), (4, 4));
        let all = SliceRange::all(&s).unwrap();
        assert_eq!((all.first(), all.last(), all.len()), (1, 5, 5));
    }

    #[test]
    fn test_explicit_bounds() {
        let s = stack(10);
        assert!(SliceRange::explicit(&s, 0, 3).is_err());
        assert!(SliceRange::explicit(&s, 4, 3).is_err());
        assert!(SliceRange::explicit(&s, 9, 11).is_err());
        let r = SliceRange::explicit(&s, 10, 10).unwrap();
        assert_eq!(r.iter().collect::<Vec<_>>(), vec![10]);
    }

    #[test]
    fn test_selector_parse() {
        assert_eq!("all".parse::<RangeSelector>().unwrap(), RangeSelector::All);
        assert_eq!("Current".parse::<RangeSelector>().unwrap(), RangeSelector::Current);
        assert_eq!("7".parse::<RangeSelector>().unwrap(), RangeSelector::Explicit(7, 7));
        assert_eq!("2-4".parse::<RangeSelector>().unwrap(), RangeSelector::Explicit(2, 4));
        assert!("2-x".parse::<RangeSelector>().is_err());
        assert_eq!(RangeSelector::Explicit(2, 4).to_string(), "2-4");
    }

    #[test]
    fn test_stack_rejects_mixed_geometry() {
        let a = Image::from_u8(2, 2, vec![0; 4]).unwrap();
        let b = Image::from_u8(2, 3, vec![0; 6]).unwrap();
        assert!(matches!(
            SliceStack::new("mixed", vec![a, b]),
            Err(Error::SliceGeometryMismatch { index: 2, .. })
        ));
        assert_eq!(SliceStack::new("empty", vec![]).unwrap_err(), Error::EmptyStack);
    }

    #[test]
    fn test_slice_access() {
        let s = stack(3);
        assert_eq!(s.slice(2).unwrap().sample(0, 0), Some(1));
        assert!(s.slice(0).is_err());
        assert!(s.slice(4).is_err());
    }
}
