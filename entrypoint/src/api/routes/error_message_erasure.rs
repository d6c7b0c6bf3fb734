use axum::{
    extract::rejection::QueryRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub(crate) enum ApiError {
    #[error(transparent)]
    QueryExtractorRejection(#[from] QueryRejection),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let Self::QueryExtractorRejection(rejection) = self;

        debug!(
            "Failed to parse incoming request: {}, {}",
            rejection.status(),
            rejection.body_text()
        );

        StatusCode::BAD_REQUEST.into_response()
    }
}
