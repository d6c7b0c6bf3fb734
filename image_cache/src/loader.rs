use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError, Weak};

use fetcher::{Request, Transport};
use metrics::put_metric;
use reqwest::header::ACCEPT;
use tokio::{
    runtime::{Builder, Handle, Runtime},
    sync::watch,
    task::AbortHandle,
};
use tracing::{debug, warn};

use crate::{
    decoded::{CachedImage, ImageDecoder, RasterDecoder},
    errors::ImageLoadError,
    key::NormalizedUrl,
    state::LoadState,
    traits::CacheMethod,
};

const IMAGE_ACCEPT: &str = "image/*";

// used when a pipeline is built outside of any Tokio runtime
static BACKGROUND_RUNTIME: LazyLock<Runtime> = LazyLock::new(|| {
    Builder::new_multi_thread()
        .thread_name("image-loader")
        .enable_all()
        .build()
        .expect("Expect image loader runtime to build")
});

/// The collaborators every loader shares: where images are cached, how they
/// are downloaded and how they are decoded, and the runtime downloads run on.
#[derive(Clone)]
pub struct ImagePipeline {
    cache: Arc<dyn CacheMethod>,
    transport: Arc<dyn Transport>,
    decoder: Arc<dyn ImageDecoder>,
    runtime: Handle,
}

impl ImagePipeline {
    /// Downloads run on the runtime current at construction, or on a shared
    /// background runtime when there is none.
    pub fn new(cache: Arc<dyn CacheMethod>, transport: Arc<dyn Transport>) -> Self {
        let runtime =
            Handle::try_current().unwrap_or_else(|_| BACKGROUND_RUNTIME.handle().clone());

        Self {
            cache,
            transport,
            decoder: Arc::new(RasterDecoder),
            runtime,
        }
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn ImageDecoder>) -> Self {
        self.decoder = decoder;

        self
    }

    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = runtime;

        self
    }

    pub fn cache(&self) -> &Arc<dyn CacheMethod> {
        &self.cache
    }

    async fn download_image(&self, url: &NormalizedUrl) -> Result<CachedImage, ImageLoadError> {
        let request = Request::builder()
            .set_url(url.url().as_str())
            .add_header(ACCEPT.as_str(), IMAGE_ACCEPT)
            .build();

        let response = self.transport.get(request).await.inspect_err(|_| {
            put_metric!(Metrics::ImageFetchFailed, 1);
        })?;

        let mime_type = response.content_type().map(str::to_string);
        let raw = response.raw_bytes;
        let decoder = self.decoder.clone();

        // decoding is CPU bound, keep it off the async workers
        let decoded = tokio::task::spawn_blocking(move || {
            let image = decoder.decode(&raw);
            (raw, image)
        })
        .await;

        let (raw, image) = decoded.map_err(|err| ImageLoadError::DecodeFailed(err.to_string()))?;
        let image = image.inspect_err(|_| {
            put_metric!(Metrics::ImageDecodeFailed, 1);
        })?;

        put_metric!(Metrics::ImageFetched, 1);

        Ok(CachedImage::new(url.key(), mime_type, raw, image))
    }
}

#[derive(Default)]
struct Attempt {
    // bumped for every started, cancelled or reset attempt so late results can be told apart
    generation: u64,
    task: Option<AbortHandle>,
}

/// Drives fetch, decode and cache for a single URL and publishes its progress.
///
/// Loaders are shared through `Arc`, any number of surfaces can subscribe to the
/// same one and all of them observe the same transitions.
pub struct ImageLoader {
    source: Option<String>,
    pipeline: ImagePipeline,
    state: watch::Sender<LoadState>,
    attempt: Mutex<Attempt>,
}

impl ImageLoader {
    pub fn new(source: Option<String>, pipeline: ImagePipeline) -> Arc<Self> {
        let initial = match source {
            Some(_) => LoadState::Idle,
            None => LoadState::Empty,
        };

        Arc::new(Self {
            source,
            pipeline,
            state: watch::Sender::new(initial),
            attempt: Mutex::new(Attempt::default()),
        })
    }

    pub fn state(&self) -> LoadState {
        self.state.borrow().clone()
    }

    pub fn image(&self) -> Option<Arc<CachedImage>> {
        self.state.borrow().image().cloned()
    }

    pub fn subscribe(&self) -> watch::Receiver<LoadState> {
        self.state.subscribe()
    }

    /// Waits until the loader is no longer `Loading` and returns that state.
    ///
    /// Returns straight away for a loader that was never asked to load.
    pub async fn wait(&self) -> LoadState {
        let mut receiver = self.subscribe();

        match receiver.wait_for(|state| !state.is_loading()).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }

    /// Starts loading unless a load is already running or already succeeded.
    ///
    /// Never fails, the outcome is published through the loader state. Safe to
    /// call from any thread, the download runs on the pipeline's runtime.
    pub fn load(self: &Arc<Self>) {
        let Some(source) = self.source.as_deref() else {
            return;
        };

        let mut attempt = self.lock_attempt();

        if matches!(*self.state.borrow(), LoadState::Loading | LoadState::Loaded(_)) {
            debug!("Load already running or finished for {}", source);
            return;
        }

        let url = match NormalizedUrl::parse(source) {
            Ok(url) => url,
            Err(err) => {
                warn!("{}", err);
                self.state.send_replace(LoadState::Failed(err));
                return;
            }
        };

        if let Some(image) = self.pipeline.cache.get_item(url.key()) {
            debug!("Memory cache hit for {}", url.key());
            put_metric!(Metrics::ImageCacheHit, 1);

            self.state.send_replace(LoadState::Loaded(image));
            return;
        }

        debug!("Memory cache miss, downloading {}", url.key());
        put_metric!(Metrics::ImageCacheMiss, 1);

        attempt.generation += 1;
        let generation = attempt.generation;

        self.state.send_replace(LoadState::Loading);

        let loader = Arc::downgrade(self);
        let pipeline = self.pipeline.clone();

        let task = self.pipeline.runtime.spawn(async move {
            let outcome = pipeline.download_image(&url).await;

            Self::finish(loader, generation, &url, outcome);
        });

        attempt.task = Some(task.abort_handle());
    }

    /// Aborts an in-flight load and goes back to `Idle`. Returns whether anything was running.
    pub fn cancel(&self) -> bool {
        let mut attempt = self.lock_attempt();

        let Some(task) = attempt.task.take() else {
            return false;
        };

        task.abort();
        attempt.generation += 1;
        self.state.send_replace(LoadState::Idle);

        true
    }

    /// Forgets the current outcome so the next `load()` starts over.
    pub fn reset(&self) {
        let mut attempt = self.lock_attempt();

        if let Some(task) = attempt.task.take() {
            task.abort();
        }
        attempt.generation += 1;

        if self.source.is_some() {
            self.state.send_replace(LoadState::Idle);
        }
    }

    fn finish(
        loader: Weak<Self>,
        generation: u64,
        url: &NormalizedUrl,
        outcome: Result<CachedImage, ImageLoadError>,
    ) {
        let Some(loader) = loader.upgrade() else {
            debug!("Loader for {} dropped before download finished", url.key());
            return;
        };

        let mut attempt = loader.lock_attempt();

        if attempt.generation != generation {
            debug!("Discarding stale download for {}", url.key());
            return;
        }
        attempt.task = None;

        match outcome {
            Ok(image) => {
                let image = Arc::new(image);

                loader.pipeline.cache.insert_item(url.key(), image.clone());
                loader.state.send_replace(LoadState::Loaded(image));
            }
            Err(err) => {
                warn!("Loading {} failed: {}", url.key(), err);

                loader.state.send_replace(LoadState::Failed(err));
            }
        }
    }

    fn lock_attempt(&self) -> MutexGuard<'_, Attempt> {
        self.attempt.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ImageLoader {
    fn drop(&mut self) {
        let attempt = self
            .attempt
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(task) = attempt.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        memory_cache::MemoryCache,
        test_support::{CountingDecoder, FakeTransport, cached_image, pipeline_with},
    };

    const URL_A: &str = "https://cdn.example/a.jpg";
    const URL_B: &str = "https://cdn.example/b.jpg";

    #[tokio::test]
    async fn test_absent_url_never_loads() {
        let transport = FakeTransport::serving_png();
        let loader = ImageLoader::new(None, pipeline_with(transport.clone()));

        assert!(matches!(loader.state(), LoadState::Empty));

        loader.load();

        assert!(matches!(loader.wait().await, LoadState::Empty));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_url_fails_without_network() {
        let transport = FakeTransport::serving_png();
        let loader = ImageLoader::new(Some(String::new()), pipeline_with(transport.clone()));

        let mut receiver = loader.subscribe();
        loader.load();

        assert!(matches!(
            loader.state(),
            LoadState::Failed(ImageLoadError::InvalidUrl(_))
        ));
        // one change only, straight from Idle to Failed
        assert!(receiver.has_changed().unwrap());
        receiver.borrow_and_update();
        assert!(!receiver.has_changed().unwrap());
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_unparsable_url_fails_without_network() {
        let transport = FakeTransport::serving_png();
        let loader = ImageLoader::new(Some("temple photo".into()), pipeline_with(transport.clone()));

        loader.load();

        assert!(matches!(
            loader.state(),
            LoadState::Failed(ImageLoadError::InvalidUrl(_))
        ));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_cache_hit_loads_synchronously() {
        let transport = FakeTransport::serving_png();
        let pipeline = pipeline_with(transport.clone());
        let image = cached_image(URL_A);
        pipeline.cache().insert_item(URL_A, image.clone());

        let loader = ImageLoader::new(Some(URL_A.into()), pipeline);
        loader.load();

        let LoadState::Loaded(found) = loader.state() else {
            panic!("expected a synchronous cache hit");
        };
        assert!(Arc::ptr_eq(&found, &image));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_cache_lookup_uses_encoded_key() {
        let transport = FakeTransport::serving_png();
        let pipeline = pipeline_with(transport.clone());
        pipeline
            .cache()
            .insert_item("https://cdn.example/a%20b.jpg", cached_image("k"));

        let loader = ImageLoader::new(Some("https://cdn.example/a b.jpg".into()), pipeline);
        loader.load();

        assert!(matches!(loader.state(), LoadState::Loaded(_)));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_miss_fetches_decodes_and_caches() {
        let transport = FakeTransport::serving_png();
        let pipeline = pipeline_with(transport.clone());
        let loader = ImageLoader::new(Some(URL_A.into()), pipeline.clone());

        loader.load();
        assert!(loader.state().is_loading());

        let LoadState::Loaded(image) = loader.wait().await else {
            panic!("expected the image to load");
        };

        assert_eq!(transport.calls(), 1);
        assert_eq!(transport.requested(), vec![URL_A.to_string()]);
        assert_eq!(
            transport.headers(),
            vec![vec![("accept".to_string(), "image/*".to_string())]]
        );
        assert_eq!(image.key, URL_A);
        assert_eq!(image.mime_type.as_deref(), Some("image/png"));
        assert!(Arc::ptr_eq(&pipeline.cache().get_item(URL_A).unwrap(), &image));
    }

    #[tokio::test]
    async fn test_load_twice_fetches_once() {
        let transport = FakeTransport::serving_png().gated();
        let loader = ImageLoader::new(Some(URL_A.into()), pipeline_with(transport.clone()));

        loader.load();
        loader.load();
        transport.release();

        assert!(matches!(loader.wait().await, LoadState::Loaded(_)));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_load_after_success_is_noop() {
        let transport = FakeTransport::serving_png();
        let loader = ImageLoader::new(Some(URL_A.into()), pipeline_with(transport.clone()));

        loader.load();
        loader.wait().await;
        loader.load();

        assert!(matches!(loader.state(), LoadState::Loaded(_)));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_server_error_fails_then_retries() {
        let transport = FakeTransport::failing_with(500);
        let loader = ImageLoader::new(Some(URL_B.into()), pipeline_with(transport.clone()));

        loader.load();
        assert!(matches!(
            loader.wait().await,
            LoadState::Failed(ImageLoadError::FetchFailed(_))
        ));

        loader.load();
        assert!(loader.state().is_loading());
        assert!(matches!(loader.wait().await, LoadState::Failed(_)));

        assert_eq!(transport.calls(), 2);
        assert_eq!(
            transport.requested(),
            vec![URL_B.to_string(), URL_B.to_string()]
        );
    }

    #[tokio::test]
    async fn test_undecodable_payload_fails() {
        let transport = FakeTransport::serving(b"<html>gone</html>".to_vec(), "text/html");
        let pipeline = pipeline_with(transport.clone());
        let loader = ImageLoader::new(Some(URL_A.into()), pipeline.clone());

        loader.load();

        assert!(matches!(
            loader.wait().await,
            LoadState::Failed(ImageLoadError::DecodeFailed(_))
        ));
        assert!(pipeline.cache().is_empty());
    }

    #[tokio::test]
    async fn test_decoder_runs_once_per_fetch() {
        let transport = FakeTransport::serving_png();
        let decoder = Arc::new(CountingDecoder::default());
        let pipeline = pipeline_with(transport.clone()).with_decoder(decoder.clone());
        let loader = ImageLoader::new(Some(URL_A.into()), pipeline);

        loader.load();
        loader.wait().await;

        assert_eq!(decoder.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancel_returns_to_idle_without_publishing() {
        let transport = FakeTransport::serving_png().gated();
        let pipeline = pipeline_with(transport.clone());
        let loader = ImageLoader::new(Some(URL_A.into()), pipeline.clone());

        loader.load();
        assert!(loader.cancel());
        assert!(matches!(loader.state(), LoadState::Idle));

        transport.release();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(matches!(loader.state(), LoadState::Idle));
        assert!(pipeline.cache().is_empty());
        assert!(!loader.cancel());
    }

    #[tokio::test]
    async fn test_reset_allows_reload() {
        let transport = FakeTransport::serving_png();
        let cache = Arc::new(MemoryCache::default());
        let pipeline = ImagePipeline::new(cache.clone(), transport.clone());
        let loader = ImageLoader::new(Some(URL_A.into()), pipeline);

        loader.load();
        loader.wait().await;

        loader.reset();
        assert!(matches!(loader.state(), LoadState::Idle));

        // the image is still cached, so this is answered from memory
        loader.load();
        assert!(matches!(loader.state(), LoadState::Loaded(_)));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_dropping_loader_abandons_download() {
        let transport = FakeTransport::serving_png().gated();
        let pipeline = pipeline_with(transport.clone());
        let loader = ImageLoader::new(Some(URL_A.into()), pipeline.clone());

        loader.load();
        drop(loader);

        transport.release();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(pipeline.cache().is_empty());
    }

    #[test]
    fn test_load_outside_runtime() {
        let transport = FakeTransport::serving_png();
        let pipeline = pipeline_with(transport.clone());
        let loader = ImageLoader::new(Some(URL_A.into()), pipeline.clone());

        loader.load();

        let state = futures::executor::block_on(loader.wait());
        assert!(matches!(state, LoadState::Loaded(_)));
        assert_eq!(transport.calls(), 1);
        assert!(pipeline.cache().get_item(URL_A).is_some());
    }

    #[test]
    fn test_load_on_given_runtime() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let transport = FakeTransport::serving_png();
        let pipeline = pipeline_with(transport.clone()).with_runtime(runtime.handle().clone());
        let loader = ImageLoader::new(Some(URL_A.into()), pipeline);

        loader.load();

        assert!(matches!(runtime.block_on(loader.wait()), LoadState::Loaded(_)));
    }

    #[tokio::test]
    async fn test_subscribers_see_same_transitions() {
        let transport = FakeTransport::serving_png().gated();
        let loader = ImageLoader::new(Some(URL_A.into()), pipeline_with(transport.clone()));

        let mut first = loader.subscribe();
        let mut second = loader.subscribe();

        loader.load();
        assert!(first.borrow_and_update().is_loading());
        assert!(second.borrow_and_update().is_loading());

        transport.release();

        first.changed().await.unwrap();
        second.changed().await.unwrap();

        let first_image = first.borrow().image().cloned().unwrap();
        let second_image = second.borrow().image().cloned().unwrap();
        assert!(Arc::ptr_eq(&first_image, &second_image));
    }
}
