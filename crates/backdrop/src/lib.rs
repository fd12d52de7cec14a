//! Animated cover-art backdrop rendered with `wgpu`.
//!
//! A [`BackgroundController`] owns one render surface attached to a host
//! window. Each update loads the requested artwork, blurs it into a circular
//! raster (cached by image id), uploads it as a texture and crossfades from the
//! previous artwork over a fixed number of scheduled steps:
//!
//! ```text
//!   update(request) ─▶ BlurCache::lookup ─┬─ hit ──▶ RenderBackend::create_texture
//!                                         └─ miss ─▶ PendingLoad (worker thread)
//!
//!   pump(now) ─▶ PendingLoad::try_result ─▶ create_texture
//!             ─▶ TaskQueue::pop_due ─┬─▶ Task::Step ─▶ transition::advance ─▶ commit
//!                                    └─▶ Task::Frame ─▶ RenderSurface::run_frame ─▶ draw
//! ```
//!
//! Only raster builds leave the calling thread. Everything that touches the
//! GPU runs inside [`BackgroundController::pump`], which the embedding event
//! loop calls before sleeping until [`BackgroundController::next_deadline`].
//! Cleanup runs through a [`Maid`] in reverse registration order when the
//! controller is torn down.

pub mod backend;
pub mod cache;
pub mod controller;
pub mod error;
pub mod gpu;
pub mod loader;
pub mod maid;
pub mod observer;
pub mod schedule;
pub mod source;
pub mod surface;
pub mod transition;
pub mod uniforms;

#[cfg(test)]
mod test_support;

pub use backend::{Host, RenderBackend};
pub use cache::{BlurCache, BlurredRaster};
pub use controller::{
    BackgroundController, BackgroundInstance, ControllerOptions, LoadEvent, PumpReport,
    UpdateOutcome, UpdateRequest,
};
pub use error::{BackdropError, LoadError, RenderError};
pub use gpu::{GpuTexture, WgpuBackend};
pub use loader::PendingLoad;
pub use maid::{CleanupToken, Maid};
pub use observer::{ResizeObserver, MIN_CONTENT_SIZE};
pub use schedule::{Task, TaskQueue};
pub use source::{DefaultImageSource, ImageLocation, ImageSource};
pub use surface::{circle_regions, OrthoCamera, RenderSurface};
pub use transition::{TransitionHandle, TransitionOutcome, TOTAL_STEPS};
pub use uniforms::{Circle, CircleSlot, ShaderUniformSet, UniformName, CIRCLE_COUNT};
