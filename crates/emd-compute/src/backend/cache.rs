//! LRU cache for interactive previews.
//!
//! Maps an algorithm plus an exact parameter snapshot to the preview it
//! produced, so dragging a slider back to an earlier value does not run
//! the kernel again. The cache is keyed only by algorithm and parameters,
//! not by image content: the owner must call [`PreviewCache::clear`]
//! whenever the source image or region of interest changes.
//!
//! Capacity is a fixed entry count. Recency is refreshed by both
//! [`get`](PreviewCache::get) and [`put`](PreviewCache::put); inserting
//! past capacity evicts the least recently used entry. All operations take
//! one internal lock, so they are atomic with respect to each other.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use emd_core::Image;
use tracing::trace;

use crate::algorithm::{AlgorithmId, AlgorithmParams};
use crate::{DenoiseError, DenoiseResult};

/// Key identifying a cached preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Algorithm that produced the preview.
    pub algorithm: AlgorithmId,
    /// Exact parameter snapshot.
    pub params: AlgorithmParams,
}

impl CacheKey {
    /// Key for a parameter snapshot.
    pub fn new(params: AlgorithmParams) -> Self {
        Self { algorithm: params.id(), params }
    }
}

/// Cached preview plus the metrics computed alongside it.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Denoised region of interest.
    pub preview: Image,
    /// Bytes held by `preview`.
    pub size_bytes: usize,
    /// Noise estimate of `preview`, if computed.
    pub noise_estimate: Option<f32>,
    /// Blur estimate of `preview`, if computed.
    pub blur_estimate: Option<f32>,
}

impl CacheEntry {
    /// Entry without metrics.
    pub fn new(preview: Image) -> Self {
        let size_bytes = preview.size_bytes();
        Self { preview, size_bytes, noise_estimate: None, blur_estimate: None }
    }

    /// Attaches noise and blur estimates.
    pub fn with_estimates(mut self, noise: Option<f32>, blur: Option<f32>) -> Self {
        self.noise_estimate = noise;
        self.blur_estimate = blur;
        self
    }
}

struct LruStore {
    entries: HashMap<CacheKey, Arc<CacheEntry>>,
    /// Access order for eviction (front = oldest).
    access_order: VecDeque<CacheKey>,
    total_bytes: usize,
    hits: u64,
    misses: u64,
}

impl LruStore {
    fn touch(&mut self, key: &CacheKey) {
        self.access_order.retain(|k| k != key);
        self.access_order.push_back(*key);
    }

    fn evict_lru(&mut self) -> Option<CacheKey> {
        let key = self.access_order.pop_front()?;
        if let Some(entry) = self.entries.remove(&key) {
            self.total_bytes = self.total_bytes.saturating_sub(entry.size_bytes);
        }
        Some(key)
    }
}

/// Bounded, thread-safe LRU store of previews.
pub struct PreviewCache {
    store: Mutex<LruStore>,
    capacity: usize,
}

impl PreviewCache {
    /// Creates a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> DenoiseResult<Self> {
        if capacity == 0 {
            return Err(DenoiseError::CacheCapacityMisconfigured(capacity));
        }
        Ok(Self {
            store: Mutex::new(LruStore {
                entries: HashMap::with_capacity(capacity),
                access_order: VecDeque::with_capacity(capacity),
                total_bytes: 0,
                hits: 0,
                misses: 0,
            }),
            capacity,
        })
    }

    /// Looks up a preview and marks it most recently used.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        let mut store = self.lock();
        match store.entries.get(key).cloned() {
            Some(entry) => {
                store.hits += 1;
                store.touch(key);
                Some(entry)
            }
            None => {
                store.misses += 1;
                None
            }
        }
    }

    /// Stores a preview, replacing any entry under the same key and
    /// evicting the least recently used entry if capacity is exceeded.
    /// Returns the shared entry as stored.
    pub fn put(&self, key: CacheKey, entry: CacheEntry) -> Arc<CacheEntry> {
        let mut store = self.lock();
        let size = entry.size_bytes;
        let entry = Arc::new(entry);
        if let Some(old) = store.entries.insert(key, Arc::clone(&entry)) {
            store.total_bytes = store.total_bytes.saturating_sub(old.size_bytes);
        }
        store.total_bytes += size;
        store.touch(&key);
        while store.entries.len() > self.capacity {
            if let Some(evicted) = store.evict_lru() {
                trace!(algorithm = %evicted.algorithm, "preview evicted");
            } else {
                break;
            }
        }
        entry
    }

    /// Drops every entry. Statistics are kept.
    pub fn clear(&self) {
        let mut store = self.lock();
        store.entries.clear();
        store.access_order.clear();
        store.total_bytes = 0;
    }

    // =========================================================================
    // Stats
    // =========================================================================

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes held by cached previews.
    pub fn size_bytes(&self) -> usize {
        self.lock().total_bytes
    }

    /// Cache hit count.
    pub fn hits(&self) -> u64 {
        self.lock().hits
    }

    /// Cache miss count.
    pub fn misses(&self) -> u64 {
        self.lock().misses
    }

    /// Cache hit ratio (0.0 - 1.0).
    pub fn hit_ratio(&self) -> f64 {
        let store = self.lock();
        let total = store.hits + store.misses;
        if total == 0 { 0.0 } else { store.hits as f64 / total as f64 }
    }

    fn lock(&self) -> MutexGuard<'_, LruStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for PreviewCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::GaussianParams;

    fn key(sigma: f32) -> CacheKey {
        CacheKey::new(AlgorithmParams::Gaussian(GaussianParams { sigma }))
    }

    fn entry(v: u8) -> CacheEntry {
        CacheEntry::new(Image::from_u8(2, 2, vec![v; 4]).unwrap())
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            PreviewCache::new(0),
            Err(DenoiseError::CacheCapacityMisconfigured(0))
        ));
    }

    #[test]
    fn test_put_get() {
        let cache = PreviewCache::new(4).unwrap();
        cache.put(key(1.0), entry(9).with_estimates(Some(0.1), None));
        let hit = cache.get(&key(1.0)).unwrap();
        assert_eq!(hit.preview.sample(0, 0), Some(9));
        assert_eq!(hit.noise_estimate, Some(0.1));
        assert!(cache.get(&key(2.0)).is_none());
        assert_eq!(cache.size_bytes(), 4);
    }

    #[test]
    fn test_evicts_exactly_lru() {
        let cache = PreviewCache::new(3).unwrap();
        cache.put(key(1.0), entry(1));
        cache.put(key(2.0), entry(2));
        cache.put(key(3.0), entry(3));
        cache.put(key(4.0), entry(4));

        assert_eq!(cache.len(), 3);
        assert!(cache.get(&key(1.0)).is_none());
        assert!(cache.get(&key(2.0)).is_some());
        assert!(cache.get(&key(3.0)).is_some());
        assert!(cache.get(&key(4.0)).is_some());
    }

    #[test]
    fn test_get_refreshes_recency() {
        let cache = PreviewCache::new(3).unwrap();
        cache.put(key(1.0), entry(1));
        cache.put(key(2.0), entry(2));
        cache.put(key(3.0), entry(3));

        let _ = cache.get(&key(1.0));
        cache.put(key(4.0), entry(4));

        assert!(cache.get(&key(1.0)).is_some());
        assert!(cache.get(&key(2.0)).is_none());
    }

    #[test]
    fn test_put_refreshes_recency() {
        let cache = PreviewCache::new(2).unwrap();
        cache.put(key(1.0), entry(1));
        cache.put(key(2.0), entry(2));
        cache.put(key(1.0), entry(11));
        cache.put(key(3.0), entry(3));

        assert_eq!(cache.get(&key(1.0)).unwrap().preview.sample(0, 0), Some(11));
        assert!(cache.get(&key(2.0)).is_none());
        assert_eq!(cache.size_bytes(), 8);
    }

    #[test]
    fn test_entry_outlives_eviction() {
        let cache = PreviewCache::new(1).unwrap();
        cache.put(key(1.0), entry(5));
        let held = cache.get(&key(1.0)).unwrap();
        cache.put(key(2.0), entry(6));
        assert!(cache.get(&key(1.0)).is_none());
        assert_eq!(held.preview.sample(1, 1), Some(5));
    }

    #[test]
    fn test_clear_and_stats() {
        let cache = PreviewCache::new(8).unwrap();
        cache.put(key(1.0), entry(1));
        let _ = cache.get(&key(1.0)); // hit
        let _ = cache.get(&key(1.0)); // hit
        let _ = cache.get(&key(3.0)); // miss
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get(&key(1.0)).is_none());
        assert_eq!(cache.hits(), 2);
        assert_eq!(cache.misses(), 2);
        assert!((cache.hit_ratio() - 0.5).abs() < 1e-9);
    }
}
