use std::fmt;

use tracing::trace;

/// Handle returned by [`Maid::register_cleanup`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CleanupToken(u64);

type Cleanup<C> = Box<dyn FnOnce(&mut C)>;

/// Ownership list of disposers for one owner.
///
/// Each cleanup receives the owner's resources by `&mut` and runs at most
/// once. `destroy` runs them in reverse registration order.
pub struct Maid<C> {
    entries: Vec<(CleanupToken, Cleanup<C>)>,
    next_token: u64,
    destroyed: bool,
}

impl<C> Maid<C> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_token: 0,
            destroyed: false,
        }
    }

    /// Registers `cleanup`. After `destroy` the closure is dropped unrun.
    pub fn register_cleanup<F>(&mut self, cleanup: F) -> CleanupToken
    where
        F: FnOnce(&mut C) + 'static,
    {
        let token = CleanupToken(self.next_token);
        self.next_token += 1;
        if self.destroyed {
            trace!(?token, "maid already destroyed; discarding cleanup");
        } else {
            self.entries.push((token, Box::new(cleanup)));
        }
        token
    }

    /// Removes a cleanup without running it. Returns whether it was pending.
    pub fn cancel_cleanup(&mut self, token: CleanupToken) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(candidate, _)| *candidate != token);
        before != self.entries.len()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn destroy(&mut self, ctx: &mut C) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        trace!(cleanups = self.entries.len(), "destroying maid");
        while let Some((_, cleanup)) = self.entries.pop() {
            cleanup(ctx);
        }
    }
}

impl<C> Default for Maid<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for Maid<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Maid")
            .field("pending", &self.entries.len())
            .field("destroyed", &self.destroyed)
            .finish()
    }
}
