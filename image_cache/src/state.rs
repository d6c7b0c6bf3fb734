use std::sync::Arc;

use crate::{decoded::CachedImage, errors::ImageLoadError};

/// Observable progress of an [`ImageLoader`](crate::ImageLoader).
#[derive(Debug, Clone)]
pub enum LoadState {
    /// Constructed without a URL, there is nothing to show and nothing will be fetched.
    Empty,
    Idle,
    Loading,
    Loaded(Arc<CachedImage>),
    Failed(ImageLoadError),
}

/// What a surface should draw for a given state.
#[derive(Debug, Clone)]
pub enum Presentation {
    Placeholder,
    Spinner,
    Image(Arc<CachedImage>),
}

impl LoadState {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Loaded(_) => "loaded",
            Self::Failed(_) => "failed",
        }
    }

    pub fn image(&self) -> Option<&Arc<CachedImage>> {
        match self {
            Self::Loaded(image) => Some(image),
            _ => None,
        }
    }

    pub fn presentation(&self) -> Presentation {
        match self {
            Self::Loaded(image) => Presentation::Image(image.clone()),
            Self::Loading => Presentation::Spinner,
            Self::Empty | Self::Idle | Self::Failed(_) => Presentation::Placeholder,
        }
    }
}
