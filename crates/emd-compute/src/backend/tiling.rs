//! Tile partitioning and stitching.
//!
//! Large slices are cut into a row-major grid of tiles so a kernel with a
//! bounded neighbourhood can run tile by tile. Each tile is grown by a
//! margin of context pixels, clamped at the image edges, and the margin is
//! cut away again when the result is stitched back.
//!
//! ```text
//!        left        core         right
//!       +----+-------------------+----+
//!  top  |    |                   |    |
//!       +----+-------------------+----+
//!       |    | (grid_x, grid_y)  |    |
//!       |    |  width x height   |    |
//!       +----+-------------------+----+
//! bottom|    |                   |    |
//!       +----+-------------------+----+
//! ```
//!
//! The last tile of a row or column keeps whatever is left of the image;
//! it is never padded.
//!
//! ```rust
//! use emd_compute::backend::tiling::Partitioner;
//!
//! let p = Partitioner::new(512, 512, 256, 256, 8).unwrap();
//! assert_eq!(p.tiles_per_slice(), 4);
//! let first = p.regions().next().unwrap();
//! assert_eq!((first.left, first.right, first.top, first.bottom), (0, 8, 0, 8));
//! ```

use emd_core::{Image, Rect};

use crate::algorithm::AlgorithmParams;
use crate::{DenoiseError, DenoiseResult};

/// Geometry of one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileRegion {
    /// Row-major index of the tile in its slice.
    pub index: usize,
    /// X of the core region in source pixels.
    pub grid_x: u32,
    /// Y of the core region in source pixels.
    pub grid_y: u32,
    /// Core width, without margins.
    pub width: u32,
    /// Core height, without margins.
    pub height: u32,
    /// Context rows above the core.
    pub top: u32,
    /// Context columns left of the core.
    pub left: u32,
    /// Context rows below the core.
    pub bottom: u32,
    /// Context columns right of the core.
    pub right: u32,
}

impl TileRegion {
    /// Core region in source coordinates.
    pub fn core(&self) -> Rect {
        Rect::new(self.grid_x, self.grid_y, self.width, self.height)
    }

    /// Core region grown by the margins, in source coordinates.
    pub fn padded(&self) -> Rect {
        Rect::new(
            self.grid_x - self.left,
            self.grid_y - self.top,
            self.padded_width(),
            self.padded_height(),
        )
    }

    /// Width including margins.
    pub fn padded_width(&self) -> u32 {
        self.left + self.width + self.right
    }

    /// Height including margins.
    pub fn padded_height(&self) -> u32 {
        self.top + self.height + self.bottom
    }

    /// Core region relative to the padded buffer.
    pub fn core_in_padded(&self) -> Rect {
        Rect::new(self.left, self.top, self.width, self.height)
    }
}

/// A tile's geometry plus its padded pixels.
#[derive(Debug, Clone)]
pub struct Tile {
    /// Where the tile sits.
    pub region: TileRegion,
    /// Pixels of [`TileRegion::padded`].
    pub pixels: Image,
}

/// Stateless tiling of a `width x height` image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partitioner {
    width: u32,
    height: u32,
    tile_width: u32,
    tile_height: u32,
    margin: u32,
}

impl Partitioner {
    /// Creates a partitioner. Tile sizes must be positive; a tile larger
    /// than the image degenerates to one tile with no margins.
    pub fn new(width: u32, height: u32, tile_width: u32, tile_height: u32, margin: u32) -> DenoiseResult<Self> {
        if tile_width == 0 || tile_height == 0 {
            return Err(DenoiseError::InvalidTileSize { width: tile_width, height: tile_height });
        }
        if width == 0 || height == 0 {
            return Err(emd_core::Error::InvalidDimensions { width, height }.into());
        }
        Ok(Self { width, height, tile_width, tile_height, margin })
    }

    /// Partitioner sized for `image`.
    pub fn for_image(image: &Image, tile_width: u32, tile_height: u32, margin: u32) -> DenoiseResult<Self> {
        Self::new(image.width(), image.height(), tile_width, tile_height, margin)
    }

    /// `(columns, rows)` of the tile grid.
    pub fn grid(&self) -> (u32, u32) {
        (self.width.div_ceil(self.tile_width), self.height.div_ceil(self.tile_height))
    }

    /// Number of tiles covering one slice.
    pub fn tiles_per_slice(&self) -> usize {
        let (cols, rows) = self.grid();
        cols as usize * rows as usize
    }

    /// Configured margin.
    pub fn margin(&self) -> u32 {
        self.margin
    }

    /// Geometry of tile `index` (row-major), if it exists.
    pub fn region(&self, index: usize) -> Option<TileRegion> {
        if index >= self.tiles_per_slice() {
            return None;
        }
        let (cols, _) = self.grid();
        let col = (index % cols as usize) as u32;
        let row = (index / cols as usize) as u32;
        let x = col * self.tile_width;
        let y = row * self.tile_height;
        let w = self.tile_width.min(self.width - x);
        let h = self.tile_height.min(self.height - y);
        Some(TileRegion {
            index,
            grid_x: x,
            grid_y: y,
            width: w,
            height: h,
            top: self.margin.min(y),
            left: self.margin.min(x),
            bottom: self.margin.min(self.height - (y + h)),
            right: self.margin.min(self.width - (x + w)),
        })
    }

    /// Lazy row-major traversal of tile geometry. Each call starts over.
    pub fn regions(&self) -> Regions {
        Regions { partitioner: *self, next: 0 }
    }

    /// Lazy row-major traversal of tiles cut from `image`.
    pub fn tiles<'a>(&self, image: &'a Image) -> Tiles<'a> {
        Tiles { regions: self.regions(), image }
    }
}

/// Iterator over [`TileRegion`]s, see [`Partitioner::regions`].
#[derive(Debug, Clone)]
pub struct Regions {
    partitioner: Partitioner,
    next: usize,
}

impl Iterator for Regions {
    type Item = TileRegion;

    fn next(&mut self) -> Option<TileRegion> {
        let region = self.partitioner.region(self.next)?;
        self.next += 1;
        Some(region)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.partitioner.tiles_per_slice() - self.next;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Regions {}

/// Iterator over [`Tile`]s, see [`Partitioner::tiles`].
#[derive(Debug, Clone)]
pub struct Tiles<'a> {
    regions: Regions,
    image: &'a Image,
}

impl Iterator for Tiles<'_> {
    type Item = DenoiseResult<Tile>;

    fn next(&mut self) -> Option<Self::Item> {
        let region = self.regions.next()?;
        Some(
            self.image
                .crop(region.padded())
                .map(|pixels| Tile { region, pixels })
                .map_err(DenoiseError::from),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.regions.size_hint()
    }
}

/// Partitions `image` into margined tiles.
pub fn partition(image: &Image, tile_width: u32, tile_height: u32, margin: u32) -> DenoiseResult<Tiles<'_>> {
    Ok(Partitioner::for_image(image, tile_width, tile_height, margin)?.tiles(image))
}

/// Cuts the margins off a kernel result.
///
/// `result` must have exactly the padded size of `region`; anything else
/// means the kernel changed the tile geometry and is reported as
/// [`DenoiseError::TileGeometryViolation`].
pub fn stitch(region: &TileRegion, result: &Image) -> DenoiseResult<Image> {
    let expected = (region.padded_width(), region.padded_height());
    if result.dimensions() != expected {
        return Err(DenoiseError::TileGeometryViolation {
            grid_x: region.grid_x,
            grid_y: region.grid_y,
            expected_width: expected.0,
            expected_height: expected.1,
            actual_width: result.width(),
            actual_height: result.height(),
        });
    }
    if region.left == 0 && region.top == 0 && region.right == 0 && region.bottom == 0 {
        return Ok(result.clone());
    }
    Ok(result.crop(region.core_in_padded())?)
}

/// Writes a stitched tile into the output canvas at its grid position.
pub fn place(canvas: &mut Image, region: &TileRegion, cropped: &Image) -> DenoiseResult<()> {
    if cropped.dimensions() != (region.width, region.height) {
        return Err(DenoiseError::TileGeometryViolation {
            grid_x: region.grid_x,
            grid_y: region.grid_y,
            expected_width: region.width,
            expected_height: region.height,
            actual_width: cropped.width(),
            actual_height: cropped.height(),
        });
    }
    canvas.paste(cropped, region.grid_x, region.grid_y)?;
    Ok(())
}

/// Margin covering the neighbourhood `params` reads, or `fallback` when
/// the algorithm has no bounded support.
pub fn recommended_margin(params: &AlgorithmParams, fallback: u32) -> u32 {
    params.support_radius().unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use emd_core::BitDepth;

    fn ramp(w: u32, h: u32) -> Image {
        let data = (0..w * h).map(|i| (i * 7 % 65521) as u16).collect();
        Image::from_u16(w, h, data).unwrap()
    }

    #[test]
    fn test_grid_last_tile_smaller() {
        let p = Partitioner::new(1000, 600, 512, 512, 0).unwrap();
        assert_eq!(p.grid(), (2, 2));
        let regions: Vec<_> = p.regions().collect();
        assert_eq!(regions.len(), 4);
        assert_eq!((regions[1].grid_x, regions[1].width), (512, 488));
        assert_eq!((regions[2].grid_y, regions[2].height), (512, 88));
    }

    #[test]
    fn test_margins_clamped_at_edges() {
        let p = Partitioner::new(100, 100, 40, 40, 16).unwrap();
        let r: Vec<_> = p.regions().collect();
        // corner tile
        assert_eq!((r[0].left, r[0].top, r[0].right, r[0].bottom), (0, 0, 16, 16));
        // centre tile
        assert_eq!((r[4].left, r[4].top, r[4].right, r[4].bottom), (16, 16, 16, 16));
        // last tile is 20x20 and touches both far edges
        assert_eq!((r[8].width, r[8].right, r[8].bottom), (20, 0, 0));
    }

    #[test]
    fn test_margin_smaller_than_distance() {
        let p = Partitioner::new(50, 10, 20, 10, 8).unwrap();
        let r: Vec<_> = p.regions().collect();
        // middle tile core 20..40, right edge distance 10
        assert_eq!((r[1].left, r[1].right), (8, 8));
        // last tile core 40..50
        assert_eq!((r[2].left, r[2].right), (8, 0));
    }

    #[test]
    fn test_tile_larger_than_image() {
        let p = Partitioner::new(30, 20, 64, 64, 8).unwrap();
        let r: Vec<_> = p.regions().collect();
        assert_eq!(r.len(), 1);
        assert_eq!(r[0].padded(), Rect::new(0, 0, 30, 20));
    }

    #[test]
    fn test_regions_restartable() {
        let p = Partitioner::new(70, 33, 16, 16, 3).unwrap();
        let a: Vec<_> = p.regions().collect();
        let b: Vec<_> = p.regions().collect();
        assert_eq!(a, b);
        assert_eq!(p.regions().len(), p.tiles_per_slice());
    }

    #[test]
    fn test_identity_stitch() {
        let src = ramp(77, 45);
        let mut out = Image::blank(77, 45, BitDepth::Sixteen).unwrap();
        for tile in partition(&src, 16, 20, 5).unwrap() {
            let tile = tile.unwrap();
            let cropped = stitch(&tile.region, &tile.pixels).unwrap();
            place(&mut out, &tile.region, &cropped).unwrap();
        }
        assert_eq!(out, src);
    }

    #[test]
    fn test_partition_sweep() {
        let shapes = [
            // (w, h, tw, th, margin)
            (1, 1, 1, 1, 0),
            (7, 5, 1, 1, 2),
            (7, 5, 1, 3, 0),
            (16, 16, 16, 16, 4),
            (30, 20, 64, 64, 8),
            (30, 20, 64, 64, 0),
            (33, 17, 8, 5, 0),
            (33, 17, 8, 5, 3),
            (33, 17, 8, 5, 40),
            (64, 9, 10, 4, 1),
            (100, 3, 32, 32, 16),
        ];
        for (w, h, tw, th, margin) in shapes {
            let ctx = format!("{w}x{h} tile {tw}x{th} margin {margin}");
            let p = Partitioner::new(w, h, tw, th, margin).unwrap();

            let mut hits = vec![0u32; (w * h) as usize];
            for r in p.regions() {
                assert!(r.width > 0 && r.height > 0, "{ctx}: empty core {r:?}");
                assert!(r.left <= r.grid_x && r.left <= margin, "{ctx}: left {r:?}");
                assert!(r.top <= r.grid_y && r.top <= margin, "{ctx}: top {r:?}");
                assert!(r.grid_x + r.width + r.right <= w && r.right <= margin, "{ctx}: right {r:?}");
                assert!(r.grid_y + r.height + r.bottom <= h && r.bottom <= margin, "{ctx}: bottom {r:?}");
                if r.grid_x == 0 {
                    assert_eq!(r.left, 0, "{ctx}");
                }
                if r.grid_y == 0 {
                    assert_eq!(r.top, 0, "{ctx}");
                }
                for y in r.grid_y..r.grid_y + r.height {
                    for x in r.grid_x..r.grid_x + r.width {
                        hits[(y * w + x) as usize] += 1;
                    }
                }
            }
            assert!(hits.iter().all(|&n| n == 1), "{ctx}: cores overlap or leave gaps");

            let data = (0..w * h).map(|i| (i * 13 % 251) as u8).collect();
            let src = Image::from_u8(w, h, data).unwrap();
            let mut out = Image::blank(w, h, BitDepth::Eight).unwrap();
            for tile in partition(&src, tw, th, margin).unwrap() {
                let tile = tile.unwrap();
                let cropped = stitch(&tile.region, &tile.pixels).unwrap();
                place(&mut out, &tile.region, &cropped).unwrap();
            }
            assert_eq!(out, src, "{ctx}: identity stitch");
        }
    }

    #[test]
    fn test_stitch_rejects_resized_result() {
        let p = Partitioner::new(64, 64, 32, 32, 4).unwrap();
        let region = p.region(0).unwrap();
        let wrong = Image::blank(32, 32, BitDepth::Eight).unwrap();
        assert!(matches!(
            stitch(&region, &wrong),
            Err(DenoiseError::TileGeometryViolation { expected_width: 36, actual_width: 32, .. })
        ));
    }

    #[test]
    fn test_zero_tile_size() {
        assert!(matches!(
            Partitioner::new(10, 10, 0, 5, 0),
            Err(DenoiseError::InvalidTileSize { .. })
        ));
    }
}
