pub mod decoded;
pub mod errors;
pub mod key;
pub mod loader;
pub mod memory_cache;
pub mod registry;
pub mod state;
pub mod traits;

#[cfg(test)]
pub(crate) mod test_support;

pub use decoded::{CachedImage, ImageDecoder, RasterDecoder};
pub use errors::ImageLoadError;
pub use loader::{ImageLoader, ImagePipeline};
pub use memory_cache::{CacheConfig, MemoryCache};
pub use registry::ImageRegistry;
pub use state::{LoadState, Presentation};
pub use traits::CacheMethod;

// TODO: revisit if we need a disk cache in addition to memory for cold starts
