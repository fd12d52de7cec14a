use std::sync::Arc;

use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::cache::BlurredRaster;
use crate::error::RenderError;
use crate::surface::OrthoCamera;
use crate::uniforms::ShaderUniformSet;

/// Anything that can receive a render surface and report its content size.
pub trait Host {
    fn content_size(&self) -> PhysicalSize<u32>;
}

impl Host for Arc<Window> {
    fn content_size(&self) -> PhysicalSize<u32> {
        self.inner_size()
    }
}

/// GPU work needed by a [`crate::RenderSurface`].
///
/// Release methods must tolerate a lost context and repeated calls; they
/// never fail.
pub trait RenderBackend {
    type Texture;
    type Host: Host;

    fn attach(&mut self, host: &Self::Host) -> Result<(), RenderError>;
    fn detach(&mut self);
    fn is_attached(&self) -> bool;

    fn create_texture(&mut self, raster: &BlurredRaster) -> Result<Self::Texture, RenderError>;
    /// A 1×1 texture bound wherever a slot is empty.
    fn create_placeholder(&mut self) -> Result<Self::Texture, RenderError>;
    fn release_texture(&mut self, texture: Self::Texture);

    fn configure(&mut self, size: PhysicalSize<u32>);
    /// Issues one draw of the quad with the given uniforms. A backend with no
    /// attached host treats this as a no-op.
    fn draw(
        &mut self,
        uniforms: &ShaderUniformSet<Self::Texture>,
        camera: &OrthoCamera,
    ) -> Result<(), RenderError>;

    fn is_context_lost(&self) -> bool;

    fn release_geometry(&mut self);
    fn release_material(&mut self);
    fn release_context(&mut self);
}
