use std::sync::Arc;

use crate::decoded::CachedImage;

/// Storage for decoded images keyed by normalized URL.
///
/// Every operation is synchronous and must not block on I/O. A miss is always
/// possible, entries can be dropped at any time.
pub trait CacheMethod: Send + Sync {
    fn get_item(&self, cache_key: &str) -> Option<Arc<CachedImage>>;
    fn insert_item(&self, cache_key: &str, image: Arc<CachedImage>);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
