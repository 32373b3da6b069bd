use crate::transport::TileImage;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1024) {
    Some(capacity) => capacity,
    None => NonZeroUsize::MIN,
};

/// In-memory image cache keyed by the full tile URL, using LRU eviction.
///
/// Render parameters are part of the URL, so images fetched under different
/// parameters never alias each other.
#[derive(Debug)]
pub struct ImageCache {
    cache: Arc<Mutex<LruCache<String, TileImage>>>,
}

impl ImageCache {
    /// Create a new cache with the given capacity; zero falls back to the default.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(DEFAULT_CAPACITY);
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    pub fn get(&self, url: &str) -> Option<TileImage> {
        self.cache.lock().ok()?.get(url).cloned()
    }

    pub fn insert(&self, url: String, image: TileImage) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(url, image);
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.cache
            .lock()
            .ok()
            .map(|cache| cache.contains(url))
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().ok().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.cache
            .lock()
            .ok()
            .map(|cache| cache.cap().get())
            .unwrap_or(0)
    }
}

impl Clone for ImageCache {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

impl Default for ImageCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY.get())
    }
}
