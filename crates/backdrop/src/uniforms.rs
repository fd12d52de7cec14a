//! CPU-side mirror of the shader inputs.
//!
//! Texture slots are generic so the same set drives the wgpu backend and the
//! recording backend used in tests. Slots are released through the owning
//! [`RenderBackend`]; the set itself never frees GPU memory.

use crate::backend::RenderBackend;

pub const CIRCLE_COUNT: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CircleSlot {
    Background,
    Center,
    Left,
    Right,
}

impl CircleSlot {
    pub const ALL: [CircleSlot; CIRCLE_COUNT] = [
        CircleSlot::Background,
        CircleSlot::Center,
        CircleSlot::Left,
        CircleSlot::Right,
    ];

    pub fn index(self) -> usize {
        match self {
            CircleSlot::Background => 0,
            CircleSlot::Center => 1,
            CircleSlot::Left => 2,
            CircleSlot::Right => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Circle {
    pub origin: [f32; 2],
    pub radius: f32,
}

impl Circle {
    pub const fn new(origin: [f32; 2], radius: f32) -> Self {
        Self { origin, radius }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniformKind {
    Scalar,
    Vec2,
    Texture,
}

/// Names making up the contract between the uniform set and the shader.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniformName {
    Time,
    RotationSpeed,
    TransitionProgress,
    Resolution,
    CurrentTexture,
    IncomingTexture,
    CircleOrigin(CircleSlot),
    CircleRadius(CircleSlot),
}

impl UniformName {
    pub fn all() -> impl Iterator<Item = UniformName> {
        [
            UniformName::Time,
            UniformName::RotationSpeed,
            UniformName::TransitionProgress,
            UniformName::Resolution,
            UniformName::CurrentTexture,
            UniformName::IncomingTexture,
        ]
        .into_iter()
        .chain(CircleSlot::ALL.into_iter().flat_map(|slot| {
            [
                UniformName::CircleOrigin(slot),
                UniformName::CircleRadius(slot),
            ]
        }))
    }

    pub fn kind(self) -> UniformKind {
        match self {
            UniformName::Time
            | UniformName::RotationSpeed
            | UniformName::TransitionProgress
            | UniformName::CircleRadius(_) => UniformKind::Scalar,
            UniformName::Resolution | UniformName::CircleOrigin(_) => UniformKind::Vec2,
            UniformName::CurrentTexture | UniformName::IncomingTexture => UniformKind::Texture,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UniformName::Time => "u_time",
            UniformName::RotationSpeed => "u_rotation_speed",
            UniformName::TransitionProgress => "u_transition_progress",
            UniformName::Resolution => "u_resolution",
            UniformName::CurrentTexture => "u_current_texture",
            UniformName::IncomingTexture => "u_incoming_texture",
            UniformName::CircleOrigin(CircleSlot::Background) => "u_background_origin",
            UniformName::CircleOrigin(CircleSlot::Center) => "u_center_origin",
            UniformName::CircleOrigin(CircleSlot::Left) => "u_left_origin",
            UniformName::CircleOrigin(CircleSlot::Right) => "u_right_origin",
            UniformName::CircleRadius(CircleSlot::Background) => "u_background_radius",
            UniformName::CircleRadius(CircleSlot::Center) => "u_center_radius",
            UniformName::CircleRadius(CircleSlot::Left) => "u_left_radius",
            UniformName::CircleRadius(CircleSlot::Right) => "u_right_radius",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        UniformName::all().find(|candidate| candidate.as_str() == name)
    }
}

/// Named bag of shader parameters.
///
/// `incoming` is `Some` exactly while a crossfade is in flight. The
/// placeholder stands in for whichever slot is empty when the backend binds
/// textures.
#[derive(Debug)]
pub struct ShaderUniformSet<T> {
    time: f32,
    rotation_speed: f32,
    transition_progress: f32,
    resolution: [f32; 2],
    circles: [Circle; CIRCLE_COUNT],
    current: Option<T>,
    incoming: Option<T>,
    placeholder: Option<T>,
}

impl<T> ShaderUniformSet<T> {
    pub const DEFAULT_ROTATION_SPEED: f32 = 1.0;

    pub fn create_default(placeholder: T) -> Self {
        Self {
            time: 0.0,
            rotation_speed: Self::DEFAULT_ROTATION_SPEED,
            transition_progress: 0.0,
            resolution: [0.0, 0.0],
            circles: [Circle::default(); CIRCLE_COUNT],
            current: None,
            incoming: None,
            placeholder: Some(placeholder),
        }
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn set_time(&mut self, seconds: f32) {
        self.time = seconds;
    }

    pub fn rotation_speed(&self) -> f32 {
        self.rotation_speed
    }

    pub fn set_rotation_speed(&mut self, speed: f32) {
        self.rotation_speed = speed;
    }

    pub fn transition_progress(&self) -> f32 {
        self.transition_progress
    }

    pub fn set_transition_progress(&mut self, progress: f32) {
        self.transition_progress = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        };
    }

    pub fn resolution(&self) -> [f32; 2] {
        self.resolution
    }

    pub fn set_resolution(&mut self, width: f32, height: f32) {
        self.resolution = [width, height];
    }

    pub fn circle(&self, slot: CircleSlot) -> Circle {
        self.circles[slot.index()]
    }

    pub fn circles(&self) -> &[Circle; CIRCLE_COUNT] {
        &self.circles
    }

    pub fn set_circles(&mut self, circles: [Circle; CIRCLE_COUNT]) {
        self.circles = circles;
    }

    pub fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    pub fn incoming(&self) -> Option<&T> {
        self.incoming.as_ref()
    }

    pub fn placeholder(&self) -> Option<&T> {
        self.placeholder.as_ref()
    }

    pub fn has_current(&self) -> bool {
        self.current.is_some()
    }

    pub fn is_transitioning(&self) -> bool {
        self.incoming.is_some()
    }

    pub fn bound_current(&self) -> Option<&T> {
        self.current.as_ref().or(self.placeholder.as_ref())
    }

    pub fn bound_incoming(&self) -> Option<&T> {
        self.incoming.as_ref().or(self.placeholder.as_ref())
    }

    pub fn replace_current(&mut self, texture: T) -> Option<T> {
        self.current.replace(texture)
    }

    pub fn set_incoming(&mut self, texture: T) -> Option<T> {
        self.incoming.replace(texture)
    }

    pub fn take_incoming(&mut self) -> Option<T> {
        self.transition_progress = 0.0;
        self.incoming.take()
    }

    pub fn commit_incoming(&mut self) -> Option<T> {
        let incoming = self.incoming.take()?;
        self.transition_progress = 0.0;
        self.current.replace(incoming)
    }

    pub fn scalar(&self, name: UniformName) -> Option<f32> {
        match name {
            UniformName::Time => Some(self.time),
            UniformName::RotationSpeed => Some(self.rotation_speed),
            UniformName::TransitionProgress => Some(self.transition_progress),
            UniformName::CircleRadius(slot) => Some(self.circle(slot).radius),
            _ => None,
        }
    }

    pub fn vec2(&self, name: UniformName) -> Option<[f32; 2]> {
        match name {
            UniformName::Resolution => Some(self.resolution),
            UniformName::CircleOrigin(slot) => Some(self.circle(slot).origin),
            _ => None,
        }
    }

    pub fn texture(&self, name: UniformName) -> Option<&T> {
        match name {
            UniformName::CurrentTexture => self.current.as_ref(),
            UniformName::IncomingTexture => self.incoming.as_ref(),
            _ => None,
        }
    }

    /// Safe to call repeatedly; emptied slots are skipped.
    pub fn dispose<B>(&mut self, backend: &mut B)
    where
        B: RenderBackend<Texture = T>,
    {
        for texture in [
            self.incoming.take(),
            self.current.take(),
            self.placeholder.take(),
        ]
        .into_iter()
        .flatten()
        {
            backend.release_texture(texture);
        }
        self.transition_progress = 0.0;
        self.resolution = [0.0, 0.0];
        self.circles = [Circle::default(); CIRCLE_COUNT];
    }
}
