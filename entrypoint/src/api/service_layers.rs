use axum::http::{HeaderValue, Method};
use tower::{
    ServiceBuilder,
    layer::util::{Identity, Stack},
};
use tower_http::cors::CorsLayer;

pub(crate) fn build_service_layers(
    allowed_origin: HeaderValue,
) -> ServiceBuilder<Stack<CorsLayer, Identity>> {
    let cors_layer = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_origin(allowed_origin);

    ServiceBuilder::new().layer(cors_layer)
}
