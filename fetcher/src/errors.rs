use reqwest::{
    StatusCode,
    header::{InvalidHeaderName, InvalidHeaderValue},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetcherError {
    #[error("Image fetcher middleware error: {0}")]
    ClientMiddlewareGeneralError(#[from] reqwest_middleware::Error),
    #[error("Image fetcher general error: {0}")]
    ClientGeneralError(#[from] reqwest::Error),
    #[error("Image fetcher failed to create header")]
    InvalidHeader,
    #[error("Server responded with {0}")]
    UnexpectedStatus(StatusCode),
}

impl From<InvalidHeaderName> for FetcherError {
    fn from(_err: InvalidHeaderName) -> Self {
        Self::InvalidHeader
    }
}

impl From<InvalidHeaderValue> for FetcherError {
    fn from(_err: InvalidHeaderValue) -> Self {
        Self::InvalidHeader
    }
}
