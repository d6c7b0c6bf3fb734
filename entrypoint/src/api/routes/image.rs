use std::sync::Arc;

use crate::{ServerState, routes::error_message_erasure::ApiError};

use axum::body::Body;
use axum::debug_handler;
use axum::extract::Query;
use axum::http::header;
use axum::{extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::WithRejection;
use image_cache::LoadState;
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Payload {
    url: String,
}

#[debug_handler]
pub(crate) async fn image_handler(
    State(state): State<Arc<ServerState>>,
    WithRejection(Query(query), _): WithRejection<Query<Payload>, ApiError>,
) -> Result<impl IntoResponse, StatusCode> {
    if !state.storage.allows(&query.url) {
        warn!("Refusing to fetch {}, not a public storage object", query.url);
        return Ok(StatusCode::BAD_REQUEST.into_response());
    }

    let loader = state.images.loader_for(&query.url);
    loader.load();

    let image = match loader.wait().await {
        LoadState::Loaded(image) => image,
        other => {
            debug!("No image for {}: {}", query.url, other.label());
            return Ok(StatusCode::NOT_FOUND.into_response());
        }
    };

    let body = Body::from(image.raw.clone());

    let headers = [(header::CONTENT_TYPE, image.content_type())];

    Ok((headers, body).into_response())
}
