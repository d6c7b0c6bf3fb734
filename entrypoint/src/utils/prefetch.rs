use std::collections::HashSet;

use common::{
    posts::{ImageReferences, PostWithUser},
    storage::resolve_image_url,
};
use image_cache::{ImageRegistry, LoadState};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchSummary {
    pub requested: usize,
    pub distinct: usize,
    pub loaded: usize,
    pub failed: usize,
    pub empty: usize,
}

pub fn parse_feed(json: &str) -> Result<Vec<PostWithUser>, serde_json::Error> {
    serde_json::from_str(json)
}

/// Every image a feed would draw, resolved to absolute URLs, duplicates included.
pub fn feed_urls(feed: &[PostWithUser], storage_base_url: Option<&str>) -> Vec<String> {
    feed.image_urls()
        .into_iter()
        .map(|reference| resolve_image_url(storage_base_url, reference))
        .collect()
}

/// Requests every URL at once, the way a screen full of cells would, and
/// waits for all of them to settle.
pub async fn prefetch(registry: &ImageRegistry, urls: Vec<String>) -> PrefetchSummary {
    let mut summary = PrefetchSummary {
        requested: urls.len(),
        distinct: urls.iter().collect::<HashSet<_>>().len(),
        ..Default::default()
    };

    let mut handles: Vec<JoinHandle<LoadState>> = Vec::new();

    for url in urls {
        let registry = registry.clone();

        handles.push(tokio::spawn(async move {
            let loader = registry.loader_for_optional(Some(&url));
            loader.load();

            let state = loader.wait().await;
            debug!("{} settled as {}", url, state.label());

            state
        }));
    }

    for handle in handles {
        match handle.await {
            Ok(LoadState::Loaded(_)) => summary.loaded += 1,
            Ok(LoadState::Empty) => summary.empty += 1,
            Ok(_) => summary.failed += 1,
            Err(err) => {
                warn!("Prefetch task did not finish: {}", err);
                summary.failed += 1;
            }
        }
    }

    summary
}
