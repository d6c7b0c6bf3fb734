use std::{
    io::Cursor,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use fetcher::{FetcherError, FetcherResponse, Request, Transport};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use reqwest::{
    StatusCode,
    header::{CONTENT_TYPE, HeaderMap, HeaderValue},
};
use tokio::sync::watch;

use crate::{
    decoded::{CachedImage, ImageDecoder, RasterDecoder},
    errors::ImageLoadError,
    loader::ImagePipeline,
    memory_cache::MemoryCache,
};

pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let pixels = RgbaImage::from_pixel(width, height, Rgba([200, 40, 40, 255]));
    let mut buffer = Vec::new();

    DynamicImage::ImageRgba8(pixels)
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .expect("png to encode");

    buffer
}

pub(crate) fn sized_image(key: &str, width: u32, height: u32) -> Arc<CachedImage> {
    let raw = png_bytes(width, height);
    let image = RasterDecoder.decode(&raw).expect("png to decode");

    Arc::new(CachedImage::new(key, Some("image/png".into()), raw, image))
}

pub(crate) fn cached_image(key: &str) -> Arc<CachedImage> {
    sized_image(key, 1, 1)
}

pub(crate) fn pipeline_with(transport: Arc<FakeTransport>) -> ImagePipeline {
    ImagePipeline::new(Arc::new(MemoryCache::default()), transport)
}

enum Reply {
    Body { bytes: Vec<u8>, content_type: String },
    Status(StatusCode),
}

/// In-memory transport that records every request and can hold responses
/// back until the test releases them.
pub(crate) struct FakeTransport {
    reply: Reply,
    requested: Mutex<Vec<String>>,
    headers: Mutex<Vec<Vec<(String, String)>>>,
    gate: watch::Sender<bool>,
}

impl FakeTransport {
    fn with_reply(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            requested: Mutex::new(Vec::new()),
            headers: Mutex::new(Vec::new()),
            gate: watch::Sender::new(true),
        })
    }

    pub(crate) fn serving(bytes: Vec<u8>, content_type: &str) -> Arc<Self> {
        Self::with_reply(Reply::Body {
            bytes,
            content_type: content_type.into(),
        })
    }

    pub(crate) fn serving_png() -> Arc<Self> {
        Self::serving(png_bytes(2, 2), "image/png")
    }

    pub(crate) fn failing_with(status: u16) -> Arc<Self> {
        Self::with_reply(Reply::Status(
            StatusCode::from_u16(status).expect("valid status code"),
        ))
    }

    /// Holds every response until [`FakeTransport::release`] is called.
    pub(crate) fn gated(self: Arc<Self>) -> Arc<Self> {
        self.gate.send_replace(false);

        self
    }

    pub(crate) fn release(&self) {
        self.gate.send_replace(true);
    }

    pub(crate) fn calls(&self) -> usize {
        self.requested.lock().unwrap().len()
    }

    pub(crate) fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }

    pub(crate) fn headers(&self) -> Vec<Vec<(String, String)>> {
        self.headers.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get(&self, request: Request) -> Result<FetcherResponse, FetcherError> {
        self.requested.lock().unwrap().push(request.url().to_string());
        self.headers.lock().unwrap().push(request.headers().to_vec());

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        match &self.reply {
            Reply::Body {
                bytes,
                content_type,
            } => {
                let mut headers = HeaderMap::new();
                headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type)?);

                Ok(FetcherResponse {
                    status: StatusCode::OK,
                    headers,
                    raw_bytes: bytes.clone(),
                })
            }
            Reply::Status(status) => Err(FetcherError::UnexpectedStatus(*status)),
        }
    }
}

#[derive(Default)]
pub(crate) struct CountingDecoder {
    calls: AtomicUsize,
}

impl CountingDecoder {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageDecoder for CountingDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, ImageLoadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        RasterDecoder.decode(bytes)
    }
}
