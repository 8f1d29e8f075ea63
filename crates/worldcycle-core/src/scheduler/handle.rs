//! Cancellable references to scheduled work

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct HandleState {
    id: u64,
    cancelled: AtomicBool,
    finished: AtomicBool,
}

/// Opaque handle to a scheduled task
///
/// Clones refer to the same task. Cancelling is idempotent: cancelling twice,
/// or cancelling a task that already ran, does nothing.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    state: Arc<HandleState>,
}

impl SchedulerHandle {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(HandleState {
                id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
                cancelled: AtomicBool::new(false),
                finished: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.state.id
    }

    /// Stop the task from running (again). Returns true only for the call that
    /// actually cancelled a still-pending task.
    pub fn cancel(&self) -> bool {
        if self.is_finished() {
            return false;
        }
        !self.state.cancelled.swap(true, Ordering::AcqRel)
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// True once a one-shot task has run (repeating tasks never finish on their own)
    pub fn is_finished(&self) -> bool {
        self.state.finished.load(Ordering::Acquire)
    }

    /// Neither cancelled nor finished
    pub fn is_pending(&self) -> bool {
        !self.is_cancelled() && !self.is_finished()
    }

    pub(crate) fn mark_finished(&self) {
        self.state.finished.store(true, Ordering::Release);
    }
}
