//! Off-thread raster builds.
//!
//! Fetching, decoding and blurring a cover can take seconds, so each build
//! runs on its own thread and hands the raster back over a channel that the
//! controller polls from `pump`.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::cache::{build_raster, BlurredRaster};
use crate::error::LoadError;
use crate::source::ImageSource;

/// A raster build running on a worker thread.
#[derive(Debug)]
pub struct PendingLoad {
    image: String,
    receiver: Receiver<Result<BlurredRaster, LoadError>>,
    token: CancellationToken,
}

impl PendingLoad {
    pub fn spawn<S>(
        source: Arc<S>,
        image: impl Into<String>,
        blur_radius: f32,
        hue_shift: f32,
        token: CancellationToken,
    ) -> Result<Self, LoadError>
    where
        S: ImageSource + ?Sized + 'static,
    {
        let image = image.into();
        let (sender, receiver) = crossbeam_channel::bounded(1);
        let id = image.clone();
        let worker_token = token.clone();
        thread::Builder::new()
            .name("backdrop-load".into())
            .spawn(move || {
                let result = build_raster(source.as_ref(), &id, blur_radius, hue_shift);
                if worker_token.is_cancelled() {
                    trace!(image = %id, "discarding raster for abandoned load");
                    return;
                }
                let _ = sender.send(result);
            })
            .map_err(LoadError::Spawn)?;
        debug!(image = %image, "raster build started");
        Ok(Self {
            image,
            receiver,
            token,
        })
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// Returns the build result once the worker has finished.
    pub fn try_result(&self) -> Option<Result<BlurredRaster, LoadError>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(LoadError::WorkerExited)),
        }
    }

    /// Tells the worker its result is no longer wanted.
    pub fn abandon(self) {
        self.token.cancel();
        debug!(image = %self.image, "raster build abandoned");
    }
}
