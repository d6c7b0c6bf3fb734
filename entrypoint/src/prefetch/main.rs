use std::path::PathBuf;

use clap::Parser;
use mimalloc::MiMalloc;
use tracing::{error, info};
use utils::{
    config::ImageArgs,
    logger::configure_logger,
    prefetch::{feed_urls, parse_feed, prefetch},
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Warms the image cache for every avatar and photo in a feed export
#[derive(Parser, Debug)]
struct Cli {
    /// JSON array of posts joined with their authors
    feed: PathBuf,

    /// Project URL used to resolve bare storage paths
    #[arg(long, env = "SUPABASE_URL")]
    storage_base_url: Option<String>,

    #[command(flatten)]
    images: ImageArgs,
}

#[tokio::main]
async fn main() {
    configure_logger();
    metrics::init();

    let cli = Cli::parse();

    let feed = match tokio::fs::read_to_string(&cli.feed).await {
        Ok(contents) => parse_feed(&contents),
        Err(err) => {
            error!("Failed to read {}: {}", cli.feed.display(), err);
            return;
        }
    };

    let feed = match feed {
        Ok(feed) => feed,
        Err(err) => {
            error!("Feed is not valid JSON: {}", err);
            return;
        }
    };

    let registry = cli
        .images
        .build_registry()
        .expect("Expect image registry to build");

    let urls = feed_urls(&feed, cli.storage_base_url.as_deref());

    info!("Prefetching {} images for {} posts", urls.len(), feed.len());

    let summary = prefetch(&registry, urls).await;

    info!(
        "Prefetch complete: {} requested, {} distinct, {} loaded, {} failed",
        summary.requested, summary.distinct, summary.loaded, summary.failed
    );

    metrics::shutdown();
}
