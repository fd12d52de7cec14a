use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;
use reqwest::blocking::Client;
use tracing::debug;

use crate::error::LoadError;

const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Resolves an image identifier into decoded pixels.
///
/// Loads run on worker threads, so sources must be shareable across them.
pub trait ImageSource: Send + Sync {
    fn load(&self, id: &str) -> Result<DynamicImage, LoadError>;
}

impl<S: ImageSource + ?Sized> ImageSource for Arc<S> {
    fn load(&self, id: &str) -> Result<DynamicImage, LoadError> {
        (**self).load(id)
    }
}

/// Where an identifier points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageLocation {
    Local(PathBuf),
    Remote(String),
}

impl ImageLocation {
    pub fn parse(id: &str) -> Result<Self, LoadError> {
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(LoadError::EmptyIdentifier);
        }
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Ok(Self::Remote(trimmed.to_string()));
        }
        let path = trimmed.strip_prefix("file://").unwrap_or(trimmed);
        Ok(Self::Local(PathBuf::from(path)))
    }
}

/// Loads local paths from disk and network URLs over HTTP.
///
/// Remote fetches are anonymous: the client keeps no cookie store, sends no
/// referer and never attaches credentials.
#[derive(Debug, Clone)]
pub struct DefaultImageSource {
    http: Client,
}

impl DefaultImageSource {
    pub fn new() -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .referer(false)
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("backdrop/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        let fetch_error = |source| LoadError::Fetch {
            url: url.to_string(),
            source,
        };
        let response = self.http.get(url).send().map_err(fetch_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().map_err(fetch_error)?;
        Ok(bytes.to_vec())
    }
}

impl ImageSource for DefaultImageSource {
    fn load(&self, id: &str) -> Result<DynamicImage, LoadError> {
        let bytes = match ImageLocation::parse(id)? {
            ImageLocation::Remote(url) => {
                debug!(%url, "fetching cover image");
                self.fetch(&url)?
            }
            ImageLocation::Local(path) => {
                std::fs::read(&path).map_err(|source| LoadError::Io {
                    path: path.display().to_string(),
                    source,
                })?
            }
        };
        Ok(image::load_from_memory(&bytes)?)
    }
}
