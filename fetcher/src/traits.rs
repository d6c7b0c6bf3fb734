use async_trait::async_trait;
use reqwest::{StatusCode, header::HeaderMap};

use crate::{errors::FetcherError, request::Request};

#[derive(Debug, Clone)]
pub struct FetcherResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub raw_bytes: Vec<u8>,
}

impl FetcherResponse {
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }
}

/// Anything that can perform a `GET` for a request and hand back the body.
///
/// Implementations must surface non-success statuses as errors so callers
/// only ever see complete payloads.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, request: Request) -> Result<FetcherResponse, FetcherError>;
}
