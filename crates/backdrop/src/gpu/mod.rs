//! wgpu implementation of [`RenderBackend`] for winit windows.

mod context;
mod layout;
mod pipeline;
mod texture;

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::backend::{Host, RenderBackend};
use crate::cache::BlurredRaster;
use crate::error::RenderError;
use crate::surface::OrthoCamera;
use crate::uniforms::ShaderUniformSet;

use self::context::{GpuContext, SurfaceTarget};
use self::layout::GpuUniforms;
use self::pipeline::{Material, QuadGeometry};

pub use self::texture::GpuTexture;

/// Renders the backdrop into a winit window through wgpu.
///
/// The device is created up front; the presentation surface is created on
/// [`RenderBackend::attach`] and dropped on [`RenderBackend::detach`].
pub struct WgpuBackend {
    context: Option<GpuContext>,
    target: Option<SurfaceTarget>,
    geometry: Option<QuadGeometry>,
    material: Option<Material>,
    next_texture_id: u64,
}

impl WgpuBackend {
    pub fn new() -> Result<Self> {
        Self::with_power_preference(wgpu::PowerPreference::LowPower)
    }

    pub fn with_power_preference(power_preference: wgpu::PowerPreference) -> Result<Self> {
        let context = GpuContext::new(power_preference)?;
        let geometry = QuadGeometry::new(&context.device);
        let material = Material::new(&context.device);
        Ok(Self {
            context: Some(context),
            target: None,
            geometry: Some(geometry),
            material: Some(material),
            next_texture_id: 1,
        })
    }

    fn live_context(&self) -> Result<&GpuContext, RenderError> {
        match &self.context {
            Some(context) if !context.is_lost() => Ok(context),
            _ => Err(RenderError::ContextLost),
        }
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_texture_id;
        self.next_texture_id += 1;
        id
    }
}

impl std::fmt::Debug for WgpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuBackend")
            .field("has_context", &self.context.is_some())
            .field("attached", &self.target.is_some())
            .field("has_material", &self.material.is_some())
            .field("has_geometry", &self.geometry.is_some())
            .finish()
    }
}

impl RenderBackend for WgpuBackend {
    type Texture = GpuTexture;
    type Host = Arc<Window>;

    fn attach(&mut self, host: &Self::Host) -> Result<(), RenderError> {
        let context = self.live_context()?;
        let surface = context
            .instance
            .create_surface(host.clone())
            .map_err(|err| RenderError::Surface(err.to_string()))?;
        let target = SurfaceTarget::new(context, surface, host.content_size())
            .map_err(|err| RenderError::Surface(format!("{err:#}")))?;
        let format = target.format();
        let device = context.device.clone();
        if let Some(material) = self.material.as_mut() {
            material.ensure_pipeline(&device, format);
        }
        self.target = Some(target);
        debug!(?format, "attached backdrop surface");
        Ok(())
    }

    fn detach(&mut self) {
        if self.target.take().is_some() {
            debug!("detached backdrop surface");
        }
    }

    fn is_attached(&self) -> bool {
        self.target.is_some()
    }

    fn create_texture(&mut self, raster: &BlurredRaster) -> Result<GpuTexture, RenderError> {
        let id = self.allocate_id();
        let context = self.live_context()?;
        Ok(texture::upload(&context.device, &context.queue, id, raster))
    }

    fn create_placeholder(&mut self) -> Result<GpuTexture, RenderError> {
        let id = self.allocate_id();
        let context = self.live_context()?;
        Ok(texture::placeholder(&context.device, &context.queue, id))
    }

    fn release_texture(&mut self, texture: GpuTexture) {
        if let Some(material) = self.material.as_mut() {
            material.forget(texture.id);
        }
        if !self.is_context_lost() {
            texture.texture.destroy();
        }
    }

    fn configure(&mut self, size: PhysicalSize<u32>) {
        let (Some(context), Some(target)) = (self.context.as_ref(), self.target.as_mut()) else {
            return;
        };
        target.resize(&context.device, size);
    }

    fn draw(
        &mut self,
        uniforms: &ShaderUniformSet<GpuTexture>,
        camera: &OrthoCamera,
    ) -> Result<(), RenderError> {
        let context = match &self.context {
            Some(context) if !context.is_lost() => context,
            _ => return Err(RenderError::ContextLost),
        };
        let Some(target) = self.target.as_ref() else {
            return Ok(());
        };
        let (Some(material), Some(geometry)) = (self.material.as_mut(), self.geometry.as_ref())
        else {
            return Err(RenderError::Device(
                "draw after material or geometry release".to_string(),
            ));
        };
        let (Some(current), Some(incoming)) = (uniforms.bound_current(), uniforms.bound_incoming())
        else {
            return Ok(());
        };

        let frame = match target.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                debug!("surface lost or outdated; reconfiguring");
                target.reconfigure(&context.device);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                warn!("timed out acquiring surface frame; skipping");
                return Ok(());
            }
            Err(err) => return Err(RenderError::Surface(err.to_string())),
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let packed = GpuUniforms::from_set(uniforms, camera);

        let mut encoder = context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("backdrop encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("backdrop pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            material.encode(
                &context.device,
                &context.queue,
                geometry,
                &packed,
                current,
                incoming,
                &mut pass,
            );
        }
        context.queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(())
    }

    fn is_context_lost(&self) -> bool {
        self.context.as_ref().is_none_or(GpuContext::is_lost)
    }

    fn release_geometry(&mut self) {
        let lost = self.is_context_lost();
        if let Some(geometry) = self.geometry.take() {
            if !lost {
                geometry.destroy();
            }
        }
    }

    fn release_material(&mut self) {
        let lost = self.is_context_lost();
        if let Some(mut material) = self.material.take() {
            if !lost {
                material.destroy();
            }
        }
    }

    fn release_context(&mut self) {
        self.target = None;
        if let Some(context) = self.context.take() {
            if !context.is_lost() {
                context.device.destroy();
            }
            debug!("released GPU context");
        }
    }
}
