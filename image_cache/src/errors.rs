use thiserror::Error;

/// Why a load attempt ended in `Failed`.
///
/// Causes are kept as text so the error can be shared by every subscriber of a loader.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageLoadError {
    #[error("Invalid image URL {0:?}")]
    InvalidUrl(String),
    #[error("Failed to fetch image: {0}")]
    FetchFailed(String),
    #[error("Failed to decode image: {0}")]
    DecodeFailed(String),
}

impl From<fetcher::FetcherError> for ImageLoadError {
    fn from(err: fetcher::FetcherError) -> Self {
        Self::FetchFailed(err.to_string())
    }
}

impl From<image::ImageError> for ImageLoadError {
    fn from(err: image::ImageError) -> Self {
        Self::DecodeFailed(err.to_string())
    }
}
