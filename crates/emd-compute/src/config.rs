//! Engine configuration.
//!
//! # Environment Variables
//!
//! - `EMD_TILE_SIZE` - Tile width and height
//! - `EMD_TILE_WIDTH` - Tile width (overrides `EMD_TILE_SIZE`)
//! - `EMD_TILE_HEIGHT` - Tile height (overrides `EMD_TILE_SIZE`)
//! - `EMD_TILE_MARGIN` - Context pixels around each tile
//! - `EMD_PREVIEW_CACHE` - Preview cache capacity in entries
//! - `EMD_MAX_PREVIEW` - Largest preview side in pixels
//!
//! Unparsable values are ignored with a warning.

use std::env;

use tracing::warn;

use crate::{DenoiseError, DenoiseResult};

/// Default tile side.
pub const DEFAULT_TILE_SIZE: u32 = 1024;

/// Default tile margin.
pub const DEFAULT_MARGIN: u32 = 16;

/// Default preview cache capacity.
pub const DEFAULT_PREVIEW_CACHE: usize = 100;

/// Default largest preview side; also the side of the region the noise
/// estimator samples.
pub const DEFAULT_MAX_PREVIEW: u32 = 2048;

/// Tiling and preview settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Core tile width.
    pub tile_width: u32,
    /// Core tile height.
    pub tile_height: u32,
    /// Context pixels added on each side of a tile.
    pub margin: u32,
    /// Preview cache capacity in entries.
    pub preview_cache_capacity: usize,
    /// Largest width or height of a preview region.
    pub max_preview_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tile_width: DEFAULT_TILE_SIZE,
            tile_height: DEFAULT_TILE_SIZE,
            margin: DEFAULT_MARGIN,
            preview_cache_capacity: DEFAULT_PREVIEW_CACHE,
            max_preview_size: DEFAULT_MAX_PREVIEW,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `EMD_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| env::var(key).ok())
    }

    /// Applies overrides from a key lookup. Bad values keep the current
    /// setting.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(size) = positive(&lookup, "EMD_TILE_SIZE") {
            self.tile_width = size;
            self.tile_height = size;
        }
        if let Some(w) = positive(&lookup, "EMD_TILE_WIDTH") {
            self.tile_width = w;
        }
        if let Some(h) = positive(&lookup, "EMD_TILE_HEIGHT") {
            self.tile_height = h;
        }
        if let Some(m) = parsed(&lookup, "EMD_TILE_MARGIN") {
            self.margin = m;
        }
        if let Some(c) = positive(&lookup, "EMD_PREVIEW_CACHE") {
            self.preview_cache_capacity = c;
        }
        if let Some(p) = positive(&lookup, "EMD_MAX_PREVIEW") {
            self.max_preview_size = p;
        }
        self
    }

    /// Checks that tile sizes, cache capacity and preview limit are positive.
    pub fn validate(&self) -> DenoiseResult<()> {
        if self.tile_width == 0 || self.tile_height == 0 {
            return Err(DenoiseError::InvalidTileSize { width: self.tile_width, height: self.tile_height });
        }
        if self.preview_cache_capacity == 0 {
            return Err(DenoiseError::CacheCapacityMisconfigured(0));
        }
        if self.max_preview_size == 0 {
            return Err(DenoiseError::InvalidConfig("max preview size must be positive".into()));
        }
        Ok(())
    }
}

// =============================================================================
// Environment Variable Helpers
// =============================================================================

fn parsed<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}

fn positive<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr + PartialEq + Default,
    F: Fn(&str) -> Option<String>,
{
    let v: T = parsed(lookup, key)?;
    if v == T::default() {
        warn!(key, "ignoring zero setting");
        return None;
    }
    Some(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let c = EngineConfig::default();
        assert_eq!((c.tile_width, c.tile_height, c.margin), (1024, 1024, 16));
        assert_eq!((c.preview_cache_capacity, c.max_preview_size), (100, 2048));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let c = EngineConfig::default().with_overrides(lookup(&[
            ("EMD_TILE_SIZE", "512"),
            ("EMD_TILE_HEIGHT", "256"),
            ("EMD_TILE_MARGIN", "0"),
            ("EMD_PREVIEW_CACHE", " 8 "),
        ]));
        assert_eq!((c.tile_width, c.tile_height, c.margin), (512, 256, 0));
        assert_eq!(c.preview_cache_capacity, 8);
        assert_eq!(c.max_preview_size, DEFAULT_MAX_PREVIEW);
    }

    #[test]
    fn test_bad_values_ignored() {
        let c = EngineConfig::default().with_overrides(lookup(&[
            ("EMD_TILE_WIDTH", "wide"),
            ("EMD_TILE_HEIGHT", "0"),
            ("EMD_PREVIEW_CACHE", "-3"),
        ]));
        assert_eq!(c, EngineConfig::default());
    }

    #[test]
    fn test_validate() {
        let c = EngineConfig { tile_width: 0, ..EngineConfig::default() };
        assert!(matches!(c.validate(), Err(DenoiseError::InvalidTileSize { .. })));
        let c = EngineConfig { preview_cache_capacity: 0, ..EngineConfig::default() };
        assert!(matches!(c.validate(), Err(DenoiseError::CacheCapacityMisconfigured(0))));
    }
}
