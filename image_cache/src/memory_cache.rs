use std::{
    num::NonZeroUsize,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use lru::LruCache;
use metrics::put_metric;
use tracing::debug;

use crate::{decoded::CachedImage, traits::CacheMethod};

const DEFAULT_MAX_ENTRIES: usize = 256;
const DEFAULT_MAX_BYTES: usize = 256 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub max_bytes: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_bytes: Some(DEFAULT_MAX_BYTES),
        }
    }
}

struct Entries {
    images: LruCache<String, Arc<CachedImage>>,
    bytes: usize,
}

/// Bounded in-memory image store. Least recently used entries go first once
/// either the entry count or the byte budget is exceeded.
pub struct MemoryCache {
    max_bytes: Option<usize>,
    entries: Mutex<Entries>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl MemoryCache {
    pub fn new(config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);

        Self {
            max_bytes: config.max_bytes,
            entries: Mutex::new(Entries {
                images: LruCache::new(capacity),
                bytes: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        // entries stay consistent even if a holder panicked, nothing inside can panic midway
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CacheMethod for MemoryCache {
    fn get_item(&self, cache_key: &str) -> Option<Arc<CachedImage>> {
        self.lock().images.get(cache_key).cloned()
    }

    fn insert_item(&self, cache_key: &str, image: Arc<CachedImage>) {
        let mut entries = self.lock();

        entries.bytes += image.byte_size();

        if let Some((replaced_key, replaced)) = entries.images.push(cache_key.to_string(), image) {
            entries.bytes -= replaced.byte_size();

            if replaced_key != cache_key {
                debug!("Evicted {} from memory cache", replaced_key);
                put_metric!(Metrics::ImageCacheEviction, 1);
            }
        }

        let Some(max_bytes) = self.max_bytes else {
            return;
        };

        // the newest entry is kept even when it alone is over budget
        while entries.bytes > max_bytes && entries.images.len() > 1 {
            let Some((evicted_key, evicted)) = entries.images.pop_lru() else {
                break;
            };

            entries.bytes -= evicted.byte_size();
            debug!("Evicted {} from memory cache", evicted_key);
            put_metric!(Metrics::ImageCacheEviction, 1);
        }
    }

    fn len(&self) -> usize {
        self.lock().images.len()
    }
}

#[cfg(test)]
impl MemoryCache {
    fn total_bytes(&self) -> usize {
        self.lock().bytes
    }

    fn contains(&self, cache_key: &str) -> bool {
        self.lock().images.contains(cache_key)
    }
}
