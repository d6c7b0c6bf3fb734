use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use reqwest::{
    ClientBuilder as BaseClientBuilder,
    header::{HeaderMap, HeaderName, HeaderValue},
};
use reqwest_middleware::{ClientBuilder as RetryableClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use tracing::{debug, info};

use crate::{
    errors::FetcherError,
    request::Request,
    traits::{FetcherResponse, Transport},
};

const IMAGE_TIMEOUT_SECONDS: u64 = 30;
const IMAGE_MIN_MILLIS_BACKOFF: u64 = 250;
const IMAGE_MAX_MILLIS_BACKOFF: u64 = 2_000;
const MAX_RETRY: u32 = 2;

const USER_AGENT: &str = "88trip-images/1.0";

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
    pub user_agent: String,
    pub https_only: bool,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(IMAGE_TIMEOUT_SECONDS),
            max_retries: MAX_RETRY,
            min_backoff: Duration::from_millis(IMAGE_MIN_MILLIS_BACKOFF),
            max_backoff: Duration::from_millis(IMAGE_MAX_MILLIS_BACKOFF),
            user_agent: USER_AGENT.into(),
            https_only: true,
        }
    }
}

impl FetcherConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;

        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;

        self
    }

    pub fn with_https_only(mut self, https_only: bool) -> Self {
        self.https_only = https_only;

        self
    }
}

/// Retrying HTTP transport used for image downloads.
#[derive(Clone)]
pub struct HttpFetcher {
    client: ClientWithMiddleware,
}

impl HttpFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, FetcherError> {
        Ok(Self {
            client: Self::create_client(&config)?,
        })
    }

    fn create_client(config: &FetcherConfig) -> Result<ClientWithMiddleware, FetcherError> {
        let base_client = BaseClientBuilder::new()
            .gzip(true)
            .http1_ignore_invalid_headers_in_responses(true)
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .https_only(config.https_only)
            .build()?;

        let retry_strat = ExponentialBackoff::builder()
            .retry_bounds(config.min_backoff, config.max_backoff)
            .build_with_max_retries(config.max_retries);
        let retry_middleware = RetryTransientMiddleware::new_with_policy(retry_strat);

        Ok(RetryableClientBuilder::new(base_client)
            .with(retry_middleware)
            .build())
    }
}

#[async_trait]
impl Transport for HttpFetcher {
    async fn get(&self, request: Request) -> Result<FetcherResponse, FetcherError> {
        let mut request_builder = self.client.get(request.url.clone());

        if !request.headers().is_empty() {
            let mut header_map = HeaderMap::new();

            for (key, value) in request.headers() {
                header_map.append(HeaderName::from_str(key)?, HeaderValue::from_str(value)?);
            }

            request_builder = request_builder.headers(header_map);
        }

        info!("Sending request to {}", request.url);

        let response = request_builder.send().await?;

        debug!("{response:?}");

        let status = response.status();
        if !status.is_success() {
            return Err(FetcherError::UnexpectedStatus(status));
        }

        let headers = response.headers().clone();
        let raw_bytes = response.bytes().await?.to_vec();

        Ok(FetcherResponse {
            status,
            headers,
            raw_bytes,
        })
    }
}
