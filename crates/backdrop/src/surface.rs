use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use winit::dpi::PhysicalSize;

use crate::backend::RenderBackend;
use crate::cache::BlurredRaster;
use crate::error::RenderError;
use crate::schedule::{Task, TaskQueue};
use crate::uniforms::{Circle, ShaderUniformSet, CIRCLE_COUNT};

/// Orthographic camera looking down -Z at the unit quad.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrthoCamera {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
    pub near: f32,
    pub far: f32,
    pub distance: f32,
}

impl Default for OrthoCamera {
    fn default() -> Self {
        Self {
            left: -1.0,
            right: 1.0,
            top: 1.0,
            bottom: -1.0,
            near: 0.1,
            far: 10.0,
            distance: 1.0,
        }
    }
}

impl OrthoCamera {
    /// Column-major projection * view matrix with a 0..1 depth range.
    pub fn view_projection(&self) -> [[f32; 4]; 4] {
        let width = self.right - self.left;
        let height = self.top - self.bottom;
        let depth = self.near - self.far;
        [
            [2.0 / width, 0.0, 0.0, 0.0],
            [0.0, 2.0 / height, 0.0, 0.0],
            [0.0, 0.0, 1.0 / depth, 0.0],
            [
                -(self.right + self.left) / width,
                -(self.top + self.bottom) / height,
                (self.near - self.distance) / depth,
                1.0,
            ],
        ]
    }
}

/// Circle regions for a viewport, in pixels with the origin at the top-left.
///
/// Order matches [`crate::CircleSlot::ALL`].
pub fn circle_regions(size: PhysicalSize<u32>) -> [Circle; CIRCLE_COUNT] {
    let width = size.width as f32;
    let height = size.height as f32;
    let larger = width.max(height);
    let wide = size.width >= size.height;
    let centre = [width / 2.0, height / 2.0];

    [
        Circle::new(centre, 1.5 * larger),
        Circle::new(centre, (if wide { 1.0 } else { 0.75 }) * larger),
        Circle::new([0.0, height], 0.75 * larger),
        Circle::new([width, 0.0], (if wide { 0.65 } else { 0.5 }) * larger),
    ]
}

pub struct RenderSurface<B: RenderBackend> {
    backend: B,
    uniforms: ShaderUniformSet<B::Texture>,
    camera: OrthoCamera,
    epoch: Instant,
    frame_interval: Duration,
    frame_loop: Option<CancellationToken>,
    size: Option<PhysicalSize<u32>>,
    material_released: bool,
    disposed: bool,
}

impl<B: RenderBackend> RenderSurface<B> {
    pub fn new(mut backend: B, epoch: Instant, frame_interval: Duration) -> Result<Self, RenderError> {
        let placeholder = backend.create_placeholder()?;
        Ok(Self {
            backend,
            uniforms: ShaderUniformSet::create_default(placeholder),
            camera: OrthoCamera::default(),
            epoch,
            frame_interval,
            frame_loop: None,
            size: None,
            material_released: false,
            disposed: false,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn uniforms(&self) -> &ShaderUniformSet<B::Texture> {
        &self.uniforms
    }

    pub fn camera(&self) -> &OrthoCamera {
        &self.camera
    }

    pub fn size(&self) -> Option<PhysicalSize<u32>> {
        self.size
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn is_context_lost(&self) -> bool {
        self.backend.is_context_lost()
    }

    pub fn attach(&mut self, host: &B::Host) -> Result<(), RenderError> {
        if self.disposed {
            return Err(RenderError::ContextLost);
        }
        self.backend.attach(host)
    }

    pub fn detach(&mut self) {
        self.backend.detach();
    }

    pub fn create_texture(&mut self, raster: &BlurredRaster) -> Result<B::Texture, RenderError> {
        if self.disposed {
            return Err(RenderError::ContextLost);
        }
        self.backend.create_texture(raster)
    }

    pub fn release_texture(&mut self, texture: B::Texture) {
        self.backend.release_texture(texture);
    }

    pub fn set_rotation_speed(&mut self, speed: f32) {
        self.uniforms.set_rotation_speed(speed);
    }

    pub fn set_transition_progress(&mut self, progress: f32) {
        self.uniforms.set_transition_progress(progress);
    }

    pub fn install_current(&mut self, texture: B::Texture) {
        if let Some(previous) = self.uniforms.replace_current(texture) {
            self.backend.release_texture(previous);
        }
    }

    pub fn begin_incoming(&mut self, texture: B::Texture) {
        self.uniforms.set_transition_progress(0.0);
        if let Some(previous) = self.uniforms.set_incoming(texture) {
            self.backend.release_texture(previous);
        }
    }

    pub fn discard_incoming(&mut self) -> bool {
        match self.uniforms.take_incoming() {
            Some(texture) => {
                self.backend.release_texture(texture);
                true
            }
            None => false,
        }
    }

    pub fn commit_incoming(&mut self) -> bool {
        if !self.uniforms.is_transitioning() {
            return false;
        }
        if let Some(previous) = self.uniforms.commit_incoming() {
            self.backend.release_texture(previous);
        }
        true
    }

    /// Recomputes circle regions for an already clamped `size`, renders once
    /// and restarts the frame loop.
    pub fn resize(
        &mut self,
        size: PhysicalSize<u32>,
        tasks: &mut TaskQueue,
        parent: &CancellationToken,
        now: Instant,
    ) -> Result<(), RenderError> {
        if self.disposed {
            return Ok(());
        }
        self.size = Some(size);
        self.uniforms
            .set_resolution(size.width as f32, size.height as f32);
        self.uniforms.set_circles(circle_regions(size));
        self.backend.configure(size);
        debug!(width = size.width, height = size.height, "render surface resized");

        let rendered = self.render_once();
        self.stop_loop();
        self.start_loop(tasks, parent, now);
        rendered
    }

    pub fn render_once(&mut self) -> Result<(), RenderError> {
        if self.disposed {
            return Ok(());
        }
        self.backend.draw(&self.uniforms, &self.camera)
    }

    pub fn is_looping(&self) -> bool {
        self.frame_loop
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    /// Schedules the first frame one interval from `now`. No-op while running.
    pub fn start_loop(&mut self, tasks: &mut TaskQueue, parent: &CancellationToken, now: Instant) {
        if self.disposed || parent.is_cancelled() || self.is_looping() {
            return;
        }
        let token = parent.child_token();
        tasks.schedule(now + self.frame_interval, Task::Frame, token.clone());
        self.frame_loop = Some(token);
    }

    pub fn stop_loop(&mut self) {
        if let Some(token) = self.frame_loop.take() {
            token.cancel();
        }
    }

    pub fn run_frame(
        &mut self,
        tasks: &mut TaskQueue,
        token: CancellationToken,
        now: Instant,
    ) -> Result<(), RenderError> {
        if self.disposed || token.is_cancelled() {
            return Ok(());
        }
        let elapsed = now.saturating_duration_since(self.epoch);
        self.uniforms.set_time(elapsed.as_secs_f32());
        let rendered = self.render_once();
        tasks.schedule(now + self.frame_interval, Task::Frame, token);
        rendered
    }

    pub fn dispose_uniforms(&mut self) {
        self.uniforms.dispose(&mut self.backend);
    }

    pub fn release_material(&mut self) {
        if self.material_released {
            return;
        }
        self.material_released = true;
        self.backend.release_material();
    }

    /// Frees geometry, material and context. Safe on a lost context and
    /// when called more than once.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.stop_loop();
        if self.backend.is_context_lost() {
            warn!("GPU context lost before disposal; releasing handles only");
        }
        self.dispose_uniforms();
        self.release_material();
        self.backend.release_geometry();
        self.backend.detach();
        self.backend.release_context();
        self.disposed = true;
    }
}
