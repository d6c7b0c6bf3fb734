use std::{net::SocketAddr, sync::Arc};

use axum::{Router, http::HeaderValue, routing::get};
use clap::Parser;
use image_cache::ImageRegistry;
use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tracing::info;
use utils::{
    config::{ImageArgs, StorageArgs},
    logger::configure_logger,
};

use crate::{routes::image::image_handler, service_layers::build_service_layers};

mod routes {
    pub(crate) mod error_message_erasure;
    pub(crate) mod image;
}
mod service_layers;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub(crate) struct ServerState {
    pub(crate) images: ImageRegistry,
    pub(crate) storage: StorageArgs,
}

/// Serves remote images through the shared memory cache
#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, env = "API_PORT", default_value_t = 3001)]
    port: u16,

    #[arg(long, env = "API_ALLOWED_ORIGIN", default_value = "http://localhost:3000")]
    allowed_origin: String,

    #[command(flatten)]
    storage: StorageArgs,

    #[command(flatten)]
    images: ImageArgs,
}

#[tokio::main]
async fn main() {
    configure_logger();
    metrics::init();

    let cli = Cli::parse();

    let allowed_origin = cli
        .allowed_origin
        .parse::<HeaderValue>()
        .expect("Expect allowed origin to be a valid header value");

    let state = Arc::new(ServerState {
        images: cli
            .images
            .build_registry()
            .expect("Expect image registry to build"),
        storage: cli.storage,
    });

    let app = Router::new()
        .route("/image", get(image_handler))
        .layer(build_service_layers(allowed_origin))
        .with_state(state.clone());

    let address = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = TcpListener::bind(address)
        .await
        .expect("Expect port to be available");

    info!(
        "Listening on {}, serving images under {}",
        address,
        state.storage.public_prefix()
    );

    axum::serve(listener, app)
        .await
        .expect("Expect server to run");
}
