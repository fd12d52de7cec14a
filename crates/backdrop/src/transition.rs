//! Crossfade state machine.
//!
//! A session owns the schedule of its steps through a cancellation token and
//! reports how it ended through a one-shot channel. The incoming texture
//! itself lives in the uniform set; the session only tracks progress.

use std::cell::OnceCell;
use std::fmt;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::RenderBackend;
use crate::maid::CleanupToken;
use crate::schedule::{Task, TaskQueue};
use crate::surface::RenderSurface;

pub const TOTAL_STEPS: u32 = 10;
/// Pause before the first step so the incoming texture finishes uploading.
pub const STARTUP_DELAY: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionOutcome {
    Committed,
    Cancelled,
}

/// Crossfades longer than this are shortened to it.
pub const MAX_TRANSITION: Duration = Duration::from_secs(60 * 60);

/// Deadlines of steps `1..=TOTAL_STEPS` for a crossfade starting at `now`.
pub fn step_deadlines(now: Instant, duration: Duration) -> impl Iterator<Item = (u32, Instant)> {
    let duration = duration.min(MAX_TRANSITION);
    let start = now + STARTUP_DELAY;
    (1..=TOTAL_STEPS).map(move |step| (step, start + duration * step / TOTAL_STEPS))
}

pub fn step_progress(step: u32) -> f32 {
    step.min(TOTAL_STEPS) as f32 / TOTAL_STEPS as f32
}

pub struct TransitionSession {
    id: u64,
    image_id: String,
    step: u32,
    total_steps: u32,
    token: CancellationToken,
    completion: Sender<TransitionOutcome>,
    cleanup: Option<CleanupToken>,
}

impl TransitionSession {
    /// Creates a session and queues its steps on `tasks`.
    pub fn begin(
        id: u64,
        image_id: impl Into<String>,
        token: CancellationToken,
        duration: Duration,
        tasks: &mut TaskQueue,
        now: Instant,
    ) -> (Self, TransitionHandle) {
        let image_id = image_id.into();
        for (step, due) in step_deadlines(now, duration) {
            tasks.schedule(due, Task::Step { session: id, step }, token.clone());
        }
        let (completion, receiver) = crossbeam_channel::bounded(1);
        debug!(session = id, image = %image_id, ?duration, "transition started");
        let handle = TransitionHandle {
            session: id,
            image_id: image_id.clone(),
            receiver,
            resolved: OnceCell::new(),
        };
        let session = Self {
            id,
            image_id,
            step: 0,
            total_steps: TOTAL_STEPS,
            token,
            completion,
            cleanup: None,
        };
        (session, handle)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn image_id(&self) -> &str {
        &self.image_id
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn total_steps(&self) -> u32 {
        self.total_steps
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn set_cleanup(&mut self, token: CleanupToken) {
        self.cleanup = Some(token);
    }

    /// Stops pending steps and notifies the handle. Hands back the cleanup
    /// registration so the owner can retire it.
    pub fn resolve(self, outcome: TransitionOutcome) -> Option<CleanupToken> {
        self.token.cancel();
        // The handle may already be gone.
        let _ = self.completion.send(outcome);
        debug!(session = self.id, image = %self.image_id, ?outcome, "transition resolved");
        self.cleanup
    }
}

impl fmt::Debug for TransitionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionSession")
            .field("id", &self.id)
            .field("image_id", &self.image_id)
            .field("step", &self.step)
            .field("total_steps", &self.total_steps)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

#[derive(Debug, Default)]
pub enum TransitionState {
    #[default]
    Idle,
    Transitioning(TransitionSession),
}

impl TransitionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, TransitionState::Idle)
    }

    pub fn session(&self) -> Option<&TransitionSession> {
        match self {
            TransitionState::Idle => None,
            TransitionState::Transitioning(session) => Some(session),
        }
    }

    pub fn take_session(&mut self) -> Option<TransitionSession> {
        match std::mem::take(self) {
            TransitionState::Idle => None,
            TransitionState::Transitioning(session) => Some(session),
        }
    }
}

/// What running one scheduled step did.
#[derive(Debug)]
pub enum StepOutcome {
    /// The step belonged to a session that is no longer active.
    Stale,
    Progressed { step: u32, progress: f32 },
    /// The final step rendered at full progress; the session is ready to commit.
    Finished(TransitionSession),
}

/// Applies step `step` of session `session_id`: sets progress and renders once.
///
/// Rendering failures are reported through `render_failed` so a missed frame
/// never stalls the crossfade.
pub fn advance<B: RenderBackend>(
    state: &mut TransitionState,
    surface: &mut RenderSurface<B>,
    session_id: u64,
    step: u32,
    render_failed: impl FnOnce(crate::error::RenderError),
) -> StepOutcome {
    let TransitionState::Transitioning(session) = state else {
        return StepOutcome::Stale;
    };
    if session.id != session_id || session.is_cancelled() || step <= session.step {
        return StepOutcome::Stale;
    }

    session.step = step.min(session.total_steps);
    let progress = step_progress(session.step);
    surface.set_transition_progress(progress);
    if let Err(err) = surface.render_once() {
        render_failed(err);
    }

    if session.step < session.total_steps {
        return StepOutcome::Progressed {
            step: session.step,
            progress,
        };
    }
    match state.take_session() {
        Some(session) => StepOutcome::Finished(session),
        None => StepOutcome::Stale,
    }
}

/// Promotes the incoming texture and restarts the frame loop.
pub fn commit<B: RenderBackend>(
    session: TransitionSession,
    surface: &mut RenderSurface<B>,
    tasks: &mut TaskQueue,
    parent: &CancellationToken,
    now: Instant,
) -> Option<CleanupToken> {
    surface.commit_incoming();
    surface.start_loop(tasks, parent, now);
    session.resolve(TransitionOutcome::Committed)
}

/// Abandons the active session, if any, without touching rotation speed.
pub fn cancel<B: RenderBackend>(
    state: &mut TransitionState,
    surface: &mut RenderSurface<B>,
) -> Option<Option<CleanupToken>> {
    let session = state.take_session()?;
    surface.discard_incoming();
    Some(session.resolve(TransitionOutcome::Cancelled))
}

/// Caller-side view of a session's completion.
///
/// A session dropped without resolving reads as cancelled.
pub struct TransitionHandle {
    session: u64,
    image_id: String,
    receiver: Receiver<TransitionOutcome>,
    resolved: OnceCell<TransitionOutcome>,
}

impl TransitionHandle {
    pub fn session_id(&self) -> u64 {
        self.session
    }

    pub fn image_id(&self) -> &str {
        &self.image_id
    }

    pub fn try_outcome(&self) -> Option<TransitionOutcome> {
        if let Some(outcome) = self.resolved.get() {
            return Some(*outcome);
        }
        let outcome = match self.receiver.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Disconnected) => TransitionOutcome::Cancelled,
            Err(TryRecvError::Empty) => return None,
        };
        Some(*self.resolved.get_or_init(|| outcome))
    }

    pub fn is_resolved(&self) -> bool {
        self.try_outcome().is_some()
    }
}

impl fmt::Debug for TransitionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionHandle")
            .field("session", &self.session)
            .field("image_id", &self.image_id)
            .field("resolved", &self.resolved.get())
            .finish()
    }
}
