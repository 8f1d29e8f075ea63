//! Tick-based task queue shared by every scheduler variant

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{run_guarded, Job, SchedulerHandle, Ticks};

struct Entry {
    handle: SchedulerHandle,
    job: Job,
    /// False for dispatch entries whose real work finishes elsewhere (async pool)
    completes_handle: bool,
}

struct QueueState {
    tick: Ticks,
    seq: u64,
    entries: BTreeMap<(Ticks, u64), Entry>,
}

impl QueueState {
    fn insert(&mut self, due: Ticks, entry: Entry) {
        self.seq += 1;
        self.entries.insert((due, self.seq), entry);
    }
}

/// Delayed and repeating tasks keyed by due tick
///
/// Tasks submitted during a tick run on a later tick, never re-entrantly
/// inside the tick that submitted them. Same-tick tasks run in submission order.
pub(crate) struct TaskQueue {
    state: Mutex<QueueState>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                tick: 0,
                seq: 0,
                entries: BTreeMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current_tick(&self) -> Ticks {
        self.lock().tick
    }

    pub fn push(&self, delay: Ticks, job: Job, handle: SchedulerHandle, completes_handle: bool) {
        let mut state = self.lock();
        let due = state.tick + delay;
        log::trace!("[SCHED] Task {} due at tick {}", handle.id(), due);
        state.insert(
            due,
            Entry {
                handle,
                job,
                completes_handle,
            },
        );
    }

    /// Advance one tick and run everything due. Returns the number of tasks run.
    pub fn run_tick(&self) -> usize {
        let (now, due) = {
            let mut state = self.lock();
            state.tick += 1;
            let now = state.tick;
            let later = state.entries.split_off(&(now + 1, 0));
            (now, std::mem::replace(&mut state.entries, later))
        };

        let mut ran = 0;
        for (_, entry) in due {
            let Entry {
                handle,
                job,
                completes_handle,
            } = entry;

            if handle.is_cancelled() {
                continue;
            }
            ran += 1;

            match job {
                Job::Once(task) => {
                    run_guarded(handle.id(), task);
                    if completes_handle {
                        handle.mark_finished();
                    }
                }
                Job::Repeat { mut task, period } => {
                    run_guarded(handle.id(), || task());
                    if !handle.is_cancelled() {
                        self.lock().insert(
                            now + period.max(1),
                            Entry {
                                handle,
                                job: Job::Repeat { task, period },
                                completes_handle,
                            },
                        );
                    }
                }
            }
        }

        ran
    }

    /// One-shot tasks still waiting (repeating tasks never drain)
    pub fn pending_once(&self) -> usize {
        self.lock()
            .entries
            .values()
            .filter(|e| matches!(e.job, Job::Once(_)) && !e.handle.is_cancelled())
            .count()
    }

    /// Cancel and drop every queued task
    pub fn clear(&self) -> usize {
        let entries = std::mem::take(&mut self.lock().entries);
        let count = entries.len();
        // Dropped outside the lock: task captures may run arbitrary Drop code
        for (_, entry) in entries {
            entry.handle.cancel();
        }
        count
    }
}
