use image::DynamicImage;

use crate::errors::ImageLoadError;

/// A downloaded image, kept both as the original payload and decoded pixels.
#[derive(Debug)]
pub struct CachedImage {
    pub key: String,
    pub mime_type: Option<String>,
    pub raw: Vec<u8>,
    pub image: DynamicImage,
}

impl CachedImage {
    pub fn new(
        key: impl Into<String>,
        mime_type: Option<String>,
        raw: Vec<u8>,
        image: DynamicImage,
    ) -> Self {
        Self {
            key: key.into(),
            mime_type,
            raw,
            image,
        }
    }

    /// Approximate memory held by this entry, used for the cache byte budget.
    pub fn byte_size(&self) -> usize {
        self.raw.len() + self.image.as_bytes().len()
    }

    /// Content type to serve the raw payload with, guessed from the bytes when
    /// the server did not send one.
    pub fn content_type(&self) -> String {
        if let Some(mime_type) = &self.mime_type {
            return mime_type.clone();
        }

        image::guess_format(&self.raw)
            .map(|format| format.to_mime_type().to_string())
            .unwrap_or_else(|_| "application/octet-stream".to_string())
    }
}

pub trait ImageDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, ImageLoadError>;
}

/// Decodes any raster format compiled into the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterDecoder;

impl ImageDecoder for RasterDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, ImageLoadError> {
        if bytes.is_empty() {
            return Err(ImageLoadError::DecodeFailed("empty payload".into()));
        }

        Ok(image::load_from_memory(bytes)?)
    }
}
