use std::io;

/// Failure to turn an image identifier into decoded pixels.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("image identifier is empty")]
    EmptyIdentifier,
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("fetching {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("failed to start image worker: {0}")]
    Spawn(#[source] io::Error),
    #[error("image worker exited without a result")]
    WorkerExited,
}

/// Errors raised by a [`crate::RenderBackend`].
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("GPU context was lost")]
    ContextLost,
    #[error("no host surface attached")]
    NotAttached,
    #[error("surface error: {0}")]
    Surface(String),
    #[error("device error: {0}")]
    Device(String),
}

#[derive(Debug, thiserror::Error)]
pub enum BackdropError {
    #[error("failed to load image '{id}': {source}")]
    ImageLoad {
        id: String,
        #[source]
        source: LoadError,
    },
    #[error("invalid {field} {value}")]
    InvalidRequest { field: &'static str, value: f32 },
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl BackdropError {
    pub fn is_image_load(&self) -> bool {
        matches!(self, BackdropError::ImageLoad { .. })
    }
}
