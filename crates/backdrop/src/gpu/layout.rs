use bytemuck::{Pod, Zeroable};

use crate::surface::OrthoCamera;
use crate::uniforms::{ShaderUniformSet, CIRCLE_COUNT};

/// Uniform block as laid out in `shader.wgsl`.
///
/// The three scalar pads keep `circles` on a 16-byte boundary; a `vec3` pad
/// in WGSL would be 16-byte aligned and shift everything after it.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug)]
pub(crate) struct GpuUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub resolution: [f32; 2],
    pub time: f32,
    pub rotation_speed: f32,
    pub transition_progress: f32,
    pub _padding: [f32; 3],
    /// `xy` origin in pixels, `z` radius in pixels.
    pub circles: [[f32; 4]; CIRCLE_COUNT],
}

unsafe impl Zeroable for GpuUniforms {}
unsafe impl Pod for GpuUniforms {}

impl GpuUniforms {
    pub fn from_set<T>(uniforms: &ShaderUniformSet<T>, camera: &OrthoCamera) -> Self {
        let mut circles = [[0.0; 4]; CIRCLE_COUNT];
        for (slot, circle) in circles.iter_mut().zip(uniforms.circles()) {
            *slot = [circle.origin[0], circle.origin[1], circle.radius, 0.0];
        }
        Self {
            view_proj: camera.view_projection(),
            resolution: uniforms.resolution(),
            time: uniforms.time(),
            rotation_speed: uniforms.rotation_speed(),
            transition_progress: uniforms.transition_progress(),
            _padding: [0.0; 3],
            circles,
        }
    }
}
