use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use winit::dpi::PhysicalSize;

use crate::backend::RenderBackend;
use crate::cache::{BlurCache, BlurredRaster, MAX_BLUR_RADIUS};
use crate::error::{BackdropError, RenderError};
use crate::loader::PendingLoad;
use crate::maid::{CleanupToken, Maid};
use crate::observer::{ResizeObserver, MIN_CONTENT_SIZE};
use crate::schedule::{Task, TaskQueue};
use crate::source::{DefaultImageSource, ImageSource};
use crate::surface::RenderSurface;
use crate::transition::{self, StepOutcome, TransitionHandle, TransitionSession, TransitionState};

const MIN_FRAME_INTERVAL: Duration = Duration::from_millis(1);
const LOAD_POLL_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerOptions {
    pub transition: Duration,
    pub blur_radius: f32,
    pub rotation_speed: f32,
    pub min_size: PhysicalSize<u32>,
    pub frame_interval: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            transition: Duration::from_millis(800),
            blur_radius: 40.0,
            rotation_speed: 1.0,
            min_size: MIN_CONTENT_SIZE,
            frame_interval: Duration::from_secs(1) / 60,
        }
    }
}

/// A request to show `image` with the given look.
///
/// `blur` and `speed` default to whatever the background currently uses; the
/// hue shift defaults to zero.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    pub image: String,
    pub hue_shift: f32,
    pub blur: Option<f32>,
    pub speed: Option<f32>,
}

impl UpdateRequest {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            hue_shift: 0.0,
            blur: None,
            speed: None,
        }
    }

    pub fn hue_shift(mut self, degrees: f32) -> Self {
        self.hue_shift = degrees;
        self
    }

    pub fn blur(mut self, radius: f32) -> Self {
        self.blur = Some(radius);
        self
    }

    pub fn speed(mut self, speed: f32) -> Self {
        self.speed = Some(speed);
        self
    }
}

#[derive(Debug)]
pub enum UpdateOutcome {
    /// The controller has been torn down.
    Ignored,
    Unchanged,
    Applied,
    Transitioning(TransitionHandle),
    /// The raster is being built off-thread; a later [`BackgroundController::pump`]
    /// finishes the update and reports it as a [`LoadEvent`].
    Loading,
}

#[derive(Debug)]
pub struct LoadEvent {
    pub image: String,
    pub result: Result<UpdateOutcome, BackdropError>,
}

#[derive(Debug, Clone, PartialEq)]
struct Look {
    image: String,
    hue_shift: f32,
    blur: f32,
    speed: f32,
}

impl Look {
    fn same_raster(&self, other: &Look) -> bool {
        self.image == other.image && self.hue_shift == other.hue_shift && self.blur == other.blur
    }
}

struct InFlight {
    look: Look,
    load: PendingLoad,
    polled_at: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundInstance {
    image: Option<String>,
    displayed: Option<String>,
    hue_shift: f32,
    blur_radius: f32,
    rotation_speed: f32,
    transition: Duration,
}

impl BackgroundInstance {
    fn new(options: &ControllerOptions) -> Self {
        Self {
            image: None,
            displayed: None,
            hue_shift: 0.0,
            blur_radius: options.blur_radius,
            rotation_speed: options.rotation_speed,
            transition: options.transition,
        }
    }

    /// Most recently requested image, which may still be fading in.
    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    /// Image currently committed to the current texture slot.
    pub fn displayed(&self) -> Option<&str> {
        self.displayed.as_deref()
    }

    pub fn hue_shift(&self) -> f32 {
        self.hue_shift
    }

    pub fn blur_radius(&self) -> f32 {
        self.blur_radius
    }

    pub fn rotation_speed(&self) -> f32 {
        self.rotation_speed
    }

    pub fn transition(&self) -> Duration {
        self.transition
    }

    fn shows(&self, look: &Look) -> bool {
        self.image.as_deref() == Some(look.image.as_str())
            && self.hue_shift == look.hue_shift
            && self.blur_radius == look.blur
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    pub resized: bool,
    pub frames: u32,
    pub steps: u32,
    pub commits: u32,
    pub loads: u32,
}

struct Resources<B: RenderBackend> {
    surface: RenderSurface<B>,
    transition: TransitionState,
    tasks: TaskQueue,
    host: Option<B::Host>,
    observer: Option<ResizeObserver>,
    cache: BlurCache,
    loading: Option<InFlight>,
    root: CancellationToken,
}

impl<B: RenderBackend> Resources<B> {
    fn cancel_transition(&mut self) -> Option<CleanupToken> {
        transition::cancel(&mut self.transition, &mut self.surface).flatten()
    }

    fn abandon_load(&mut self) {
        if let Some(in_flight) = self.loading.take() {
            in_flight.load.abandon();
        }
    }

    fn detach(&mut self) {
        self.observer = None;
        if self.host.take().is_some() {
            self.surface.detach();
        }
    }

    fn poll_resize(&mut self, now: Instant) -> bool {
        let (Some(host), Some(observer)) = (self.host.as_ref(), self.observer.as_mut()) else {
            return false;
        };
        let Some(size) = observer.poll(host) else {
            return false;
        };
        if let Err(err) = self
            .surface
            .resize(size, &mut self.tasks, &self.root, now)
        {
            warn_render(err);
        }
        true
    }

    fn stop_animation(&mut self) {
        self.surface.stop_loop();
        self.root.cancel();
        self.tasks.clear();
    }

    /// Releases whatever earlier cleanups left behind.
    fn finalize(&mut self) {
        self.abandon_load();
        self.cancel_transition();
        self.stop_animation();
        self.detach();
        self.surface.dispose();
        self.cache.clear();
    }
}

fn warn_render(err: RenderError) {
    warn!(error = %err, "render failed");
}

fn cleanup_fallback<B: RenderBackend>(res: &mut Resources<B>) {
    res.finalize();
}

fn cleanup_renderer<B: RenderBackend>(res: &mut Resources<B>) {
    res.surface.dispose();
}

fn cleanup_material<B: RenderBackend>(res: &mut Resources<B>) {
    res.surface.release_material();
}

fn cleanup_uniforms<B: RenderBackend>(res: &mut Resources<B>) {
    res.surface.dispose_uniforms();
}

fn cleanup_transition<B: RenderBackend>(res: &mut Resources<B>) {
    res.cancel_transition();
}

fn cleanup_animation<B: RenderBackend>(res: &mut Resources<B>) {
    res.stop_animation();
}

fn cleanup_attachment<B: RenderBackend>(res: &mut Resources<B>) {
    res.detach();
}

fn cleanup_cache<B: RenderBackend>(res: &mut Resources<B>) {
    res.abandon_load();
    res.cache.clear();
}

pub struct BackgroundController<
    B: RenderBackend + 'static,
    S: ImageSource + 'static = DefaultImageSource,
> {
    resources: Resources<B>,
    maid: Maid<Resources<B>>,
    source: Arc<S>,
    load_events: Vec<LoadEvent>,
    instance: BackgroundInstance,
    min_size: PhysicalSize<u32>,
    next_session: u64,
    torn_down: bool,
}

impl<B: RenderBackend + 'static, S: ImageSource + 'static> BackgroundController<B, S> {
    pub fn new(
        backend: B,
        source: S,
        options: ControllerOptions,
        now: Instant,
    ) -> Result<Self, BackdropError> {
        Self::with_cache(backend, source, options, BlurCache::new(), now)
    }

    /// Creates a controller that shares `cache` with other holders of the handle.
    pub fn with_cache(
        backend: B,
        source: S,
        options: ControllerOptions,
        cache: BlurCache,
        now: Instant,
    ) -> Result<Self, BackdropError> {
        let frame_interval = options.frame_interval.max(MIN_FRAME_INTERVAL);
        let surface = RenderSurface::new(backend, now, frame_interval)?;
        let resources = Resources {
            surface,
            transition: TransitionState::Idle,
            tasks: TaskQueue::new(),
            host: None,
            observer: None,
            cache,
            loading: None,
            root: CancellationToken::new(),
        };

        // Runs in reverse: cache, attachment, animation, transition texture,
        // uniforms, material, renderer, fallback.
        let mut maid = Maid::new();
        maid.register_cleanup(cleanup_fallback::<B>);
        maid.register_cleanup(cleanup_renderer::<B>);
        maid.register_cleanup(cleanup_material::<B>);
        maid.register_cleanup(cleanup_uniforms::<B>);
        maid.register_cleanup(cleanup_transition::<B>);
        maid.register_cleanup(cleanup_animation::<B>);
        maid.register_cleanup(cleanup_attachment::<B>);
        maid.register_cleanup(cleanup_cache::<B>);

        Ok(Self {
            resources,
            maid,
            source: Arc::new(source),
            load_events: Vec::new(),
            instance: BackgroundInstance::new(&options),
            min_size: options.min_size,
            next_session: 0,
            torn_down: false,
        })
    }

    pub fn instance(&self) -> &BackgroundInstance {
        &self.instance
    }

    pub fn surface(&self) -> &RenderSurface<B> {
        &self.resources.surface
    }

    pub fn cache(&self) -> &BlurCache {
        &self.resources.cache
    }

    pub fn transition_state(&self) -> &TransitionState {
        &self.resources.transition
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn is_context_lost(&self) -> bool {
        self.resources.surface.is_context_lost()
    }

    pub fn pending_tasks(&self) -> usize {
        self.resources.tasks.pending()
    }

    pub fn is_loading(&self) -> bool {
        self.resources.loading.is_some()
    }

    /// Earliest instant `pump` has work to do. While a raster is being built
    /// this includes the next poll of the worker.
    pub fn next_deadline(&self) -> Option<Instant> {
        let tasks = self.resources.tasks.next_deadline();
        let load = self
            .resources
            .loading
            .as_ref()
            .map(|in_flight| in_flight.polled_at + LOAD_POLL_INTERVAL);
        match (tasks, load) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn take_load_events(&mut self) -> Vec<LoadEvent> {
        std::mem::take(&mut self.load_events)
    }

    pub fn set_transition_duration(&mut self, duration: Duration) {
        self.instance.transition = duration;
    }

    pub fn mount(&mut self, host: B::Host, now: Instant) -> Result<(), BackdropError> {
        if self.torn_down {
            debug!("mount ignored after teardown");
            return Ok(());
        }
        self.resources.detach();
        self.resources.surface.attach(&host)?;

        let mut observer = ResizeObserver::new(self.min_size);
        let size = observer.observe(&host);
        self.resources.host = Some(host);
        self.resources.observer = Some(observer);
        info!(width = size.width, height = size.height, "background mounted");

        let res = &mut self.resources;
        res.surface.resize(size, &mut res.tasks, &res.root, now)?;
        Ok(())
    }

    /// Shows `request`. Cached rasters apply immediately; anything else is
    /// built off-thread and finished by a later `pump`. The most recent
    /// request wins over a build still in flight.
    pub fn update(
        &mut self,
        request: UpdateRequest,
        now: Instant,
    ) -> Result<UpdateOutcome, BackdropError> {
        if self.torn_down {
            debug!(image = %request.image, "update ignored after teardown");
            return Ok(UpdateOutcome::Ignored);
        }
        let look = self.resolve(request)?;

        if let Some(in_flight) = self.resources.loading.as_mut() {
            if in_flight.look.same_raster(&look) {
                in_flight.look.speed = look.speed;
                return Ok(UpdateOutcome::Loading);
            }
        }
        if self.instance.shows(&look) {
            self.resources.abandon_load();
            if look.speed == self.instance.rotation_speed {
                return Ok(UpdateOutcome::Unchanged);
            }
            self.instance.rotation_speed = look.speed;
            self.resources.surface.set_rotation_speed(look.speed);
            debug!(speed = look.speed, "rotation speed updated");
            return Ok(UpdateOutcome::Applied);
        }

        self.resources.abandon_load();
        if let Some(raster) = self
            .resources
            .cache
            .lookup(&look.image, look.blur, look.hue_shift)
        {
            return self.apply(look, &raster, now);
        }

        let load = PendingLoad::spawn(
            self.source.clone(),
            look.image.clone(),
            look.blur,
            look.hue_shift,
            self.resources.root.child_token(),
        )
        .map_err(|source| BackdropError::ImageLoad {
            id: look.image.clone(),
            source,
        })?;
        self.resources.loading = Some(InFlight {
            look,
            load,
            polled_at: now,
        });
        Ok(UpdateOutcome::Loading)
    }

    fn resolve(&self, request: UpdateRequest) -> Result<Look, BackdropError> {
        let blur = request.blur.unwrap_or(self.instance.blur_radius);
        let speed = request.speed.unwrap_or(self.instance.rotation_speed);
        if !(0.0..=MAX_BLUR_RADIUS).contains(&blur) {
            return Err(BackdropError::InvalidRequest {
                field: "blur radius",
                value: blur,
            });
        }
        if !request.hue_shift.is_finite() {
            return Err(BackdropError::InvalidRequest {
                field: "hue shift",
                value: request.hue_shift,
            });
        }
        if !speed.is_finite() {
            return Err(BackdropError::InvalidRequest {
                field: "rotation speed",
                value: speed,
            });
        }
        Ok(Look {
            image: request.image,
            hue_shift: request.hue_shift,
            blur,
            speed,
        })
    }

    fn apply(
        &mut self,
        look: Look,
        raster: &BlurredRaster,
        now: Instant,
    ) -> Result<UpdateOutcome, BackdropError> {
        let texture = self.resources.surface.create_texture(raster)?;

        self.instance.image = Some(look.image.clone());
        self.instance.hue_shift = look.hue_shift;
        self.instance.blur_radius = look.blur;
        self.instance.rotation_speed = look.speed;
        self.resources.surface.set_rotation_speed(look.speed);

        let first = !self.resources.surface.uniforms().has_current()
            && self.resources.transition.is_idle();
        if first || self.instance.transition.is_zero() {
            self.cancel_transition();
            self.resources.surface.install_current(texture);
            self.instance.displayed = Some(look.image);
            let res = &mut self.resources;
            if let Err(err) = res.surface.render_once() {
                warn_render(err);
            }
            res.surface.start_loop(&mut res.tasks, &res.root, now);
            info!(
                image = self.instance.image().unwrap_or_default(),
                first, "background image applied"
            );
            return Ok(UpdateOutcome::Applied);
        }

        Ok(UpdateOutcome::Transitioning(
            self.begin_transition(texture, look.image, now),
        ))
    }

    fn poll_load(&mut self, now: Instant, report: &mut PumpReport) {
        let Some(in_flight) = self.resources.loading.as_mut() else {
            return;
        };
        in_flight.polled_at = now;
        let Some(built) = in_flight.load.try_result() else {
            return;
        };
        let Some(InFlight { look, .. }) = self.resources.loading.take() else {
            return;
        };
        report.loads += 1;

        let image = look.image.clone();
        let result = match built {
            Ok(raster) => {
                let raster = self.resources.cache.insert_if_absent(raster);
                self.apply(look, &raster, now)
            }
            Err(source) => Err(BackdropError::ImageLoad {
                id: image.clone(),
                source,
            }),
        };
        if let Err(err) = &result {
            warn!(image = %image, error = %err, "background update failed");
        }
        self.load_events.push(LoadEvent { image, result });
    }

    fn begin_transition(
        &mut self,
        texture: B::Texture,
        image: String,
        now: Instant,
    ) -> TransitionHandle {
        self.cancel_transition();
        self.next_session += 1;

        let res = &mut self.resources;
        res.surface.stop_loop();
        res.surface.begin_incoming(texture);
        let (mut session, handle) = TransitionSession::begin(
            self.next_session,
            image,
            res.root.child_token(),
            self.instance.transition,
            &mut res.tasks,
            now,
        );
        session.set_cleanup(self.maid.register_cleanup(cleanup_transition::<B>));
        res.transition = TransitionState::Transitioning(session);
        handle
    }

    fn cancel_transition(&mut self) {
        if let Some(token) = self.resources.cancel_transition() {
            self.maid.cancel_cleanup(token);
        }
    }

    pub fn pump(&mut self, now: Instant) -> PumpReport {
        let mut report = PumpReport::default();
        if self.torn_down {
            return report;
        }
        report.resized = self.resources.poll_resize(now);
        self.poll_load(now, &mut report);

        while let Some(scheduled) = self.resources.tasks.pop_due(now) {
            match scheduled.task {
                Task::Frame => {
                    report.frames += 1;
                    let res = &mut self.resources;
                    if let Err(err) = res.surface.run_frame(&mut res.tasks, scheduled.token, now) {
                        warn_render(err);
                    }
                }
                Task::Step { session, step } => {
                    report.steps += 1;
                    self.run_step(session, step, now, &mut report);
                }
            }
        }
        report
    }

    fn run_step(&mut self, session: u64, step: u32, now: Instant, report: &mut PumpReport) {
        let res = &mut self.resources;
        match transition::advance(&mut res.transition, &mut res.surface, session, step, warn_render)
        {
            StepOutcome::Stale => trace!(session, step, "skipping stale transition step"),
            StepOutcome::Progressed { step, progress } => {
                trace!(session, step, progress, "transition step")
            }
            StepOutcome::Finished(finished) => {
                let image = finished.image_id().to_string();
                if let Some(token) =
                    transition::commit(finished, &mut res.surface, &mut res.tasks, &res.root, now)
                {
                    self.maid.cancel_cleanup(token);
                }
                info!(image = %image, "background transition committed");
                self.instance.displayed = Some(image);
                report.commits += 1;
            }
        }
    }

    pub fn teardown(&mut self) {
        let first = !self.torn_down;
        self.torn_down = true;
        self.maid.destroy(&mut self.resources);
        self.resources.finalize();
        if first {
            info!("background torn down");
        }
    }
}

impl<B: RenderBackend + 'static, S: ImageSource + 'static> Drop for BackgroundController<B, S> {
    fn drop(&mut self) {
        self.teardown();
    }
}
