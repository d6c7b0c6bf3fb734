use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use fetcher::{FetcherConfig, FetcherError, HttpFetcher};
use tracing::debug;

use crate::{
    loader::{ImageLoader, ImagePipeline},
    memory_cache::{CacheConfig, MemoryCache},
    traits::CacheMethod,
};

struct RegistryInner {
    pipeline: ImagePipeline,
    // keyed by the caller's URL string exactly as given, entries live as long as the registry
    loaders: Mutex<HashMap<String, Arc<ImageLoader>>>,
}

/// Hands out one shared [`ImageLoader`] per URL string so that every surface
/// showing the same image shares a single download.
///
/// Cloning is cheap and every clone shares the same loaders and cache.
#[derive(Clone)]
pub struct ImageRegistry {
    inner: Arc<RegistryInner>,
}

impl ImageRegistry {
    pub fn new(pipeline: ImagePipeline) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                pipeline,
                loaders: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Registry backed by the retrying HTTP client and a bounded memory cache.
    pub fn with_http(
        fetcher_config: FetcherConfig,
        cache_config: CacheConfig,
    ) -> Result<Self, FetcherError> {
        let transport = Arc::new(HttpFetcher::new(fetcher_config)?);
        let cache = Arc::new(MemoryCache::new(cache_config));

        Ok(Self::new(ImagePipeline::new(cache, transport)))
    }

    pub fn loader_for(&self, url: &str) -> Arc<ImageLoader> {
        let mut loaders = self.lock();

        if let Some(loader) = loaders.get(url) {
            return loader.clone();
        }

        debug!("Creating image loader for {}", url);

        let loader = ImageLoader::new(Some(url.to_string()), self.inner.pipeline.clone());
        loaders.insert(url.to_string(), loader.clone());

        loader
    }

    /// Like [`ImageRegistry::loader_for`], except missing or blank URLs get a
    /// fresh loader that is never registered and shows nothing.
    pub fn loader_for_optional(&self, url: Option<&str>) -> Arc<ImageLoader> {
        match url {
            Some(url) if !url.is_empty() => self.loader_for(url),
            _ => ImageLoader::new(None, self.inner.pipeline.clone()),
        }
    }

    pub fn cache(&self) -> &Arc<dyn CacheMethod> {
        self.inner.pipeline.cache()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<ImageLoader>>> {
        self.inner
            .loaders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
