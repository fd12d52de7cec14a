use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use backdrop::{
    BackdropError, BackgroundController, DefaultImageSource, UpdateOutcome, UpdateRequest,
    WgpuBackend,
};
use backdropconfig::ResolvedImage;
use tracing::{debug, info, trace, warn};
use tracing_subscriber::EnvFilter;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::WindowBuilder;

use crate::cli::Cli;
use crate::playlist::Playlist;
use crate::settings::{self, Settings};
use crate::state::ViewerStore;

const INITIAL_WINDOW_SIZE: PhysicalSize<u32> = PhysicalSize::new(960, 640);

type Controller = BackgroundController<WgpuBackend, DefaultImageSource>;

pub fn run(cli: Cli) -> Result<()> {
    initialise_tracing();

    let settings = settings::resolve(&cli)?;
    if cli.check {
        print!("{}", settings.describe());
        return Ok(());
    }
    view(settings)
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn view(settings: Settings) -> Result<()> {
    if settings.images.is_empty() {
        bail!("no images to show; pass IMAGES or set playlist.images in the config");
    }
    let mut store = ViewerStore::open(&settings.state_dir, settings.config.store.failure_ttl)?;

    let event_loop = EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let window = WindowBuilder::new()
        .with_title("coverview")
        .with_inner_size(INITIAL_WINDOW_SIZE)
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create window: {err}"))?;
    let window = Arc::new(window);

    let backend = WgpuBackend::new().context("failed to initialise GPU backend")?;
    let source = DefaultImageSource::new().context("failed to build HTTP client")?;
    let now = Instant::now();
    let mut controller = Controller::new(backend, source, settings.controller_options(), now)
        .context("failed to create background")?;
    controller
        .mount(window.clone(), now)
        .context("failed to mount background")?;

    let mut playlist = Playlist::new(settings.images, settings.config.playlist.interval);
    if let Some(last) = store.last_state().last_image {
        if playlist.resume_from(&last) {
            debug!(image = %last, "resuming from remembered image");
        }
    }
    info!(images = playlist.len(), "starting coverview");
    show_next(&mut controller, &mut playlist, &mut store, now);

    let mut fatal = None;
    let run_result = event_loop.run(|event, elwt| match event {
        Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                controller.teardown();
                elwt.exit();
            }
            WindowEvent::KeyboardInput { event, .. }
                if event.state == ElementState::Pressed && !event.repeat =>
            {
                match event.logical_key {
                    Key::Named(NamedKey::Space) => {
                        show_next(&mut controller, &mut playlist, &mut store, Instant::now());
                    }
                    Key::Named(NamedKey::Escape) => {
                        controller.teardown();
                        elwt.exit();
                    }
                    _ => {}
                }
            }
            _ => {}
        },
        Event::AboutToWait => {
            if controller.is_torn_down() {
                return;
            }
            let now = Instant::now();
            if playlist.is_due(now) {
                show_next(&mut controller, &mut playlist, &mut store, now);
            }
            let report = controller.pump(now);
            trace!(?report, "pumped background");
            for event in controller.take_load_events() {
                record_outcome(&controller, &mut store, &event.image, event.result);
            }
            if controller.is_context_lost() {
                fatal = Some(anyhow!("GPU context was lost"));
                controller.teardown();
                elwt.exit();
                return;
            }

            let deadline = match (controller.next_deadline(), playlist.next_deadline()) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            match deadline {
                Some(deadline) => elwt.set_control_flow(ControlFlow::WaitUntil(deadline)),
                None => elwt.set_control_flow(ControlFlow::Wait),
            }
        }
        _ => {}
    });

    controller.teardown();
    run_result.map_err(|err| anyhow!("window event loop error: {err}"))?;
    match fatal {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn show_next(
    controller: &mut Controller,
    playlist: &mut Playlist,
    store: &mut ViewerStore,
    now: Instant,
) {
    let Some(image) = playlist.advance(now, |handle| store.has_failed(handle)) else {
        warn!("every playlist image failed recently; waiting for the next switch");
        return;
    };
    let request = UpdateRequest::new(image.handle.clone())
        .hue_shift(image.hue_shift)
        .blur(image.blur)
        .speed(image.rotation_speed);

    let result = controller.update(request, now);
    record_outcome(controller, store, &image.handle, result);
    if let Some(current) = playlist.current() {
        trace!(image = %current.handle, "playlist position");
    }
}

fn record_outcome(
    controller: &Controller,
    store: &mut ViewerStore,
    handle: &str,
    result: Result<UpdateOutcome, BackdropError>,
) {
    match result {
        Ok(UpdateOutcome::Loading) => debug!(image = %handle, "loading cover"),
        Ok(outcome) => {
            debug!(image = %handle, ?outcome, "applied cover");
            let instance = controller.instance();
            if instance.image() != Some(handle) {
                return;
            }
            let applied = ResolvedImage {
                handle: handle.to_string(),
                hue_shift: instance.hue_shift(),
                blur: instance.blur_radius(),
                rotation_speed: instance.rotation_speed(),
            };
            if let Err(err) = store.record_applied(&applied) {
                warn!(error = %format!("{err:#}"), "failed to persist viewer state");
            }
        }
        Err(err) if err.is_image_load() => {
            warn!(image = %handle, error = %err, "failed to load cover");
            if let Err(store_err) = store.record_failure(handle, &err.to_string()) {
                warn!(error = %format!("{store_err:#}"), "failed to persist image failure");
            }
        }
        Err(err) => warn!(image = %handle, error = %err, "failed to apply cover"),
    }
}
