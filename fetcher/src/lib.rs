pub mod client;
pub mod errors;
pub mod request;
pub mod traits;

pub use client::{FetcherConfig, HttpFetcher};
pub use errors::FetcherError;
pub use request::{Request, RequestBuilder};
pub use traits::{FetcherResponse, Transport};
