//! Interactive region-of-interest previews.
//!
//! A [`Previewer`] holds one noisy ROI and renders it with whatever
//! parameters the user is trying. Renders are served from a
//! [`PreviewCache`] when possible; a miss runs the kernel once on the whole
//! ROI (no tiling, no margin) and then the noise and blur estimators on the
//! result, all through the compute channel.
//!
//! The cache is keyed by parameters only, so [`Previewer::set_roi`] clears
//! it.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use emd_core::{Image, Rect};
use tracing::{debug, trace};

use crate::algorithm::{AlgorithmId, AlgorithmParams};
use crate::backend::{
    CacheEntry, CacheKey, DenoiseEngine, Estimate, KernelPort, PreviewCache, Submitter,
};
use crate::config::EngineConfig;
use crate::normalize::Normalizer;
use crate::{DenoiseError, DenoiseResult};

/// A rendered preview.
#[derive(Debug, Clone)]
pub struct PreviewResult {
    /// Preview image and its estimates.
    pub entry: Arc<CacheEntry>,
    /// Whether it came from the cache.
    pub cached: bool,
}

impl PreviewResult {
    pub fn image(&self) -> &Image {
        &self.entry.preview
    }

    pub fn noise(&self) -> Option<f32> {
        self.entry.noise_estimate
    }

    pub fn blur(&self) -> Option<f32> {
        self.entry.blur_estimate
    }
}

/// Noise and blur of the noisy ROI.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceEstimates {
    pub noise: f32,
    pub blur: f32,
}

struct Roi {
    image: Arc<Image>,
    normalizer: Normalizer,
    estimates: Option<SourceEstimates>,
}

/// Cached ROI renderer.
#[derive(Clone)]
pub struct Previewer {
    engine: DenoiseEngine,
    cache: Arc<PreviewCache>,
    roi: Arc<Mutex<Option<Roi>>>,
    max_size: u32,
}

impl Previewer {
    pub fn new(submitter: Submitter, kernel: Arc<dyn KernelPort>, config: &EngineConfig) -> DenoiseResult<Self> {
        config.validate()?;
        Ok(Self {
            engine: DenoiseEngine::new(submitter, kernel),
            cache: Arc::new(PreviewCache::new(config.preview_cache_capacity)?),
            roi: Arc::new(Mutex::new(None)),
            max_size: config.max_preview_size,
        })
    }

    /// Extracts `rect` from `image` as the new ROI and clears the cache.
    ///
    /// Empty regions, regions leaving the image and regions wider or taller
    /// than the preview limit are rejected.
    pub fn set_roi(&self, image: &Image, rect: Rect) -> DenoiseResult<()> {
        let invalid = |reason: String| DenoiseError::InvalidRoi {
            roi: rect,
            width: image.width(),
            height: image.height(),
            reason,
        };
        if rect.is_empty() {
            return Err(invalid("region is empty".into()));
        }
        if !image.bounds().contains_rect(&rect) {
            return Err(invalid("region leaves the image".into()));
        }
        if rect.width > self.max_size || rect.height > self.max_size {
            return Err(invalid(format!("region exceeds {0}x{0} preview limit", self.max_size)));
        }

        let crop = image.crop(rect)?;
        let normalizer = Normalizer::from_reference(&crop);
        // Swap and clear under the ROI lock; `render` stores under it too.
        let mut roi = self.lock_roi();
        *roi = Some(Roi { image: Arc::new(crop), normalizer, estimates: None });
        self.cache.clear();
        drop(roi);
        debug!(roi = %rect, "preview roi set");
        Ok(())
    }

    /// The current noisy ROI.
    pub fn roi(&self) -> Option<Arc<Image>> {
        self.lock_roi().as_ref().map(|r| Arc::clone(&r.image))
    }

    /// Renders the ROI with `params`.
    pub fn render(&self, params: &AlgorithmParams) -> DenoiseResult<PreviewResult> {
        trace!(%params, "preview::render");
        params.validate()?;
        let key = CacheKey::new(*params);
        if let Some(entry) = self.cache.get(&key) {
            return Ok(PreviewResult { entry, cached: true });
        }

        let (roi, normalizer) = self.current()?;
        let (width, height) = roi.dimensions();
        let kernel = Arc::clone(self.engine.kernel());
        let input = Arc::clone(&roi);
        let params_copy = *params;
        let preview = self
            .engine
            .submitter()
            .submit(move || kernel.invoke(&input, &params_copy, &normalizer))
            .wait()?;
        if preview.dimensions() != (width, height) {
            return Err(DenoiseError::TileGeometryViolation {
                grid_x: 0,
                grid_y: 0,
                expected_width: width,
                expected_height: height,
                actual_width: preview.width(),
                actual_height: preview.height(),
            });
        }

        let noise = self.engine.estimate(&preview, Estimate::Noise).ok();
        let blur = self.engine.estimate(&preview, Estimate::Blur).ok();
        let entry = CacheEntry::new(preview).with_estimates(noise, blur);

        // The ROI may have been replaced while the kernel ran. Holding the
        // lock across the put keeps `set_roi` from clearing in between.
        let current = self.lock_roi();
        let entry = if current.as_ref().is_some_and(|r| Arc::ptr_eq(&r.image, &roi)) {
            self.cache.put(key, entry)
        } else {
            debug!("preview roi changed during render, result not cached");
            Arc::new(entry)
        };
        drop(current);
        Ok(PreviewResult { entry, cached: false })
    }

    /// Renders on a helper thread and hands the outcome to `sink` there.
    pub fn render_with<F>(&self, params: AlgorithmParams, sink: F) -> DenoiseResult<JoinHandle<()>>
    where
        F: FnOnce(DenoiseResult<PreviewResult>) + Send + 'static,
    {
        let this = self.clone();
        thread::Builder::new()
            .name("emd-preview".to_string())
            .spawn(move || sink(this.render(&params)))
            .map_err(DenoiseError::WorkerSpawn)
    }

    /// Noise and blur of the noisy ROI, computed once per ROI.
    pub fn source_estimates(&self) -> DenoiseResult<SourceEstimates> {
        if let Some(est) = self.lock_roi().as_ref().and_then(|r| r.estimates) {
            return Ok(est);
        }
        let (roi, _) = self.current()?;
        let est = SourceEstimates {
            noise: self.engine.estimate(&roi, Estimate::Noise)?,
            blur: self.engine.estimate(&roi, Estimate::Blur)?,
        };
        if let Some(r) = self.lock_roi().as_mut() {
            if Arc::ptr_eq(&r.image, &roi) {
                r.estimates = Some(est);
            }
        }
        Ok(est)
    }

    /// Defaults for `id` tuned to the ROI's noise level.
    pub fn suggest_params(&self, id: AlgorithmId) -> DenoiseResult<AlgorithmParams> {
        Ok(id.params_for_noise(self.source_estimates()?.noise))
    }

    pub fn cache(&self) -> &PreviewCache {
        &self.cache
    }

    fn current(&self) -> DenoiseResult<(Arc<Image>, Normalizer)> {
        self.lock_roi()
            .as_ref()
            .map(|r| (Arc::clone(&r.image), r.normalizer))
            .ok_or(DenoiseError::NoRoi)
    }

    fn lock_roi(&self) -> std::sync::MutexGuard<'_, Option<Roi>> {
        self.roi.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Previewer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Previewer")
            .field("engine", &self.engine)
            .field("cache", &self.cache)
            .field("max_size", &self.max_size)
            .finish()
    }
}
