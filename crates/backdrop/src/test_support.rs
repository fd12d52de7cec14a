//! Recording doubles for the backend, host and image source.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashSet};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender};
use image::{DynamicImage, Rgba, RgbaImage};
use winit::dpi::PhysicalSize;

use crate::backend::{Host, RenderBackend};
use crate::cache::BlurredRaster;
use crate::error::{LoadError, RenderError};
use crate::surface::OrthoCamera;
use crate::uniforms::{Circle, ShaderUniformSet, CIRCLE_COUNT};

/// Texture handle that is deliberately not `Clone`.
#[derive(Debug, PartialEq, Eq)]
pub struct TestTexture(u32);

impl TestTexture {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u32 {
        self.0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DrawRecord {
    pub current: Option<u32>,
    pub incoming: Option<u32>,
    pub bound_incoming: Option<u32>,
    pub progress: f32,
    pub time: f32,
    pub rotation_speed: f32,
    pub resolution: [f32; 2],
    pub circles: [Circle; CIRCLE_COUNT],
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BackendLog {
    next_texture: u32,
    live: BTreeSet<u32>,
    pub created: Vec<u32>,
    pub released: Vec<u32>,
    pub double_releases: usize,
    pub draws: Vec<DrawRecord>,
    pub configured: Vec<PhysicalSize<u32>>,
    pub attaches: usize,
    pub detaches: usize,
    pub attached: bool,
    pub context_lost: bool,
    pub geometry_releases: usize,
    pub material_releases: usize,
    pub context_releases: usize,
    pub events: Vec<String>,
}

impl BackendLog {
    pub fn allocate(&mut self) -> TestTexture {
        let id = self.next_texture;
        self.next_texture += 1;
        self.live.insert(id);
        self.created.push(id);
        TestTexture(id)
    }

    pub fn live_textures(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, id: u32) -> bool {
        self.live.contains(&id)
    }
}

#[derive(Debug, Default)]
pub struct RecordingBackend {
    log: Rc<RefCell<BackendLog>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> Rc<RefCell<BackendLog>> {
        self.log.clone()
    }

    pub fn texture_for_test(&mut self) -> TestTexture {
        self.log.borrow_mut().allocate()
    }
}

impl RenderBackend for RecordingBackend {
    type Texture = TestTexture;
    type Host = FakeHost;

    fn attach(&mut self, _host: &FakeHost) -> Result<(), RenderError> {
        let mut log = self.log.borrow_mut();
        log.attaches += 1;
        log.attached = true;
        log.events.push("attach".into());
        Ok(())
    }

    fn detach(&mut self) {
        let mut log = self.log.borrow_mut();
        if log.attached {
            log.detaches += 1;
            log.attached = false;
            log.events.push("detach".into());
        }
    }

    fn is_attached(&self) -> bool {
        self.log.borrow().attached
    }

    fn create_texture(&mut self, _raster: &BlurredRaster) -> Result<TestTexture, RenderError> {
        if self.log.borrow().context_lost {
            return Err(RenderError::ContextLost);
        }
        Ok(self.log.borrow_mut().allocate())
    }

    fn create_placeholder(&mut self) -> Result<TestTexture, RenderError> {
        Ok(self.log.borrow_mut().allocate())
    }

    fn release_texture(&mut self, texture: TestTexture) {
        let mut log = self.log.borrow_mut();
        if !log.live.remove(&texture.0) {
            log.double_releases += 1;
        }
        log.released.push(texture.0);
        log.events.push(format!("release texture {}", texture.0));
    }

    fn configure(&mut self, size: PhysicalSize<u32>) {
        self.log.borrow_mut().configured.push(size);
    }

    fn draw(
        &mut self,
        uniforms: &ShaderUniformSet<TestTexture>,
        _camera: &OrthoCamera,
    ) -> Result<(), RenderError> {
        let mut log = self.log.borrow_mut();
        if log.context_lost {
            return Err(RenderError::ContextLost);
        }
        log.draws.push(DrawRecord {
            current: uniforms.current().map(TestTexture::id),
            incoming: uniforms.incoming().map(TestTexture::id),
            bound_incoming: uniforms.bound_incoming().map(TestTexture::id),
            progress: uniforms.transition_progress(),
            time: uniforms.time(),
            rotation_speed: uniforms.rotation_speed(),
            resolution: uniforms.resolution(),
            circles: *uniforms.circles(),
        });
        Ok(())
    }

    fn is_context_lost(&self) -> bool {
        self.log.borrow().context_lost
    }

    fn release_geometry(&mut self) {
        let mut log = self.log.borrow_mut();
        log.geometry_releases += 1;
        log.events.push("release geometry".into());
    }

    fn release_material(&mut self) {
        let mut log = self.log.borrow_mut();
        log.material_releases += 1;
        log.events.push("release material".into());
    }

    fn release_context(&mut self) {
        let mut log = self.log.borrow_mut();
        log.context_releases += 1;
        log.events.push("release context".into());
    }
}

/// Host whose size can be changed after it has been handed out.
#[derive(Clone, Debug)]
pub struct FakeHost {
    size: Rc<Cell<PhysicalSize<u32>>>,
}

impl FakeHost {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: Rc::new(Cell::new(PhysicalSize::new(width, height))),
        }
    }

    pub fn set_size(&self, width: u32, height: u32) {
        self.size.set(PhysicalSize::new(width, height));
    }
}

impl Host for FakeHost {
    fn content_size(&self) -> PhysicalSize<u32> {
        self.size.get()
    }
}

/// Image source that synthesises solid images and counts decodes.
///
/// A held id blocks its loading thread until the paired sender fires.
#[derive(Debug, Default)]
pub struct CountingSource {
    loads: AtomicUsize,
    failing: HashSet<String>,
    held: Option<(String, Receiver<()>)>,
}

impl CountingSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    pub fn held(mut self, id: &str) -> (Self, Sender<()>) {
        let (release, gate) = crossbeam_channel::unbounded();
        self.held = Some((id.to_string(), gate));
        (self, release)
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl crate::source::ImageSource for CountingSource {
    fn load(&self, id: &str) -> Result<DynamicImage, LoadError> {
        if let Some((held, gate)) = &self.held {
            if held == id {
                let _ = gate.recv();
            }
        }
        if self.failing.contains(id) {
            return Err(LoadError::Status {
                url: id.to_string(),
                status: 404,
            });
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        let shade = id.bytes().fold(0u8, |acc, byte| acc.wrapping_add(byte));
        Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            12,
            8,
            Rgba([shade, 255 - shade, 128, 255]),
        )))
    }
}
