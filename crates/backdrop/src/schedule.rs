use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

/// Work the controller can defer to a later pump.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Task {
    /// One tick of the continuous render loop.
    Frame,
    /// Crossfade step `step` of transition session `session`.
    Step { session: u64, step: u32 },
}

#[derive(Debug)]
pub struct Scheduled {
    pub due: Instant,
    pub task: Task,
    pub token: CancellationToken,
}

struct Entry {
    due: Instant,
    seq: u64,
    task: Task,
    token: CancellationToken,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed so the max-heap pops the earliest deadline first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Deadline-ordered queue of cancellable tasks.
///
/// Entries scheduled for the same instant run in insertion order. Cancelled
/// entries are dropped lazily when they reach the front.
#[derive(Default)]
pub struct TaskQueue {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due: Instant, task: Task, token: CancellationToken) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry {
            due,
            seq,
            task,
            token,
        });
    }

    /// Pops the earliest live task whose deadline is at or before `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<Scheduled> {
        while let Some(entry) = self.heap.peek() {
            if entry.token.is_cancelled() {
                self.heap.pop();
                continue;
            }
            if entry.due > now {
                return None;
            }
            let entry = self.heap.pop()?;
            return Some(Scheduled {
                due: entry.due,
                task: entry.task,
                token: entry.token,
            });
        }
        None
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap
            .iter()
            .filter(|entry| !entry.token.is_cancelled())
            .map(|entry| entry.due)
            .min()
    }

    /// Number of tasks that would still run.
    pub fn pending(&self) -> usize {
        self.heap
            .iter()
            .filter(|entry| !entry.token.is_cancelled())
            .count()
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("queued", &self.heap.len())
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn pops_in_deadline_then_insertion_order() {
        let start = Instant::now();
        let token = CancellationToken::new();
        let mut queue = TaskQueue::new();
        queue.schedule(start + Duration::from_millis(20), Task::Frame, token.clone());
        queue.schedule(
            start + Duration::from_millis(10),
            Task::Step {
                session: 1,
                step: 1,
            },
            token.clone(),
        );
        queue.schedule(
            start + Duration::from_millis(10),
            Task::Step {
                session: 1,
                step: 2,
            },
            token.clone(),
        );

        assert!(queue.pop_due(start).is_none());
        let later = start + Duration::from_millis(30);
        let order: Vec<_> = std::iter::from_fn(|| queue.pop_due(later))
            .map(|scheduled| scheduled.task)
            .collect();
        assert_eq!(
            order,
            vec![
                Task::Step {
                    session: 1,
                    step: 1
                },
                Task::Step {
                    session: 1,
                    step: 2
                },
                Task::Frame,
            ]
        );
    }

    #[test]
    fn cancelled_entries_are_skipped() {
        let start = Instant::now();
        let root = CancellationToken::new();
        let doomed = root.child_token();
        let mut queue = TaskQueue::new();
        queue.schedule(start, Task::Frame, doomed.clone());
        queue.schedule(start + Duration::from_millis(5), Task::Frame, root.clone());
        assert_eq!(queue.pending(), 2);

        doomed.cancel();
        assert_eq!(queue.pending(), 1);
        assert_eq!(
            queue.next_deadline(),
            Some(start + Duration::from_millis(5))
        );
        assert!(queue.pop_due(start).is_none());

        root.cancel();
        assert!(queue.is_idle());
        assert_eq!(queue.next_deadline(), None);
    }

    #[test]
    fn clear_drops_everything() {
        let mut queue = TaskQueue::new();
        queue.schedule(Instant::now(), Task::Frame, CancellationToken::new());
        queue.clear();
        assert_eq!(queue.pending(), 0);
        assert!(queue.pop_due(Instant::now()).is_none());
    }
}
