use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::cache::BlurredRaster;

/// Colour texture owned by [`super::WgpuBackend`].
///
/// `id` keys the backend's bind-group cache.
pub struct GpuTexture {
    pub(crate) id: u64,
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
}

impl GpuTexture {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn size(&self) -> (u32, u32) {
        (self.texture.width(), self.texture.height())
    }
}

impl std::fmt::Debug for GpuTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuTexture")
            .field("id", &self.id)
            .field("size", &self.size())
            .finish()
    }
}

pub(crate) fn upload(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    id: u64,
    raster: &BlurredRaster,
) -> GpuTexture {
    let label = format!("cover texture {}", raster.id());
    create(
        device,
        queue,
        id,
        &label,
        raster.width().max(1),
        raster.height().max(1),
        raster.image().as_raw(),
    )
}

pub(crate) fn placeholder(device: &wgpu::Device, queue: &wgpu::Queue, id: u64) -> GpuTexture {
    create(device, queue, id, "placeholder texture", 1, 1, &[0, 0, 0, 0])
}

fn create(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    id: u64,
    label: &str,
    width: u32,
    height: u32,
    rgba: &[u8],
) -> GpuTexture {
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        rgba,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuTexture { id, texture, view }
}
