//! Scheduler facade over the host's two concurrency models
//!
//! The host runtime comes in two flavours:
//! - a single global authoritative loop ([`GlobalLoopScheduler`])
//! - region-parallel tick threads plus a global region ([`RegionScheduler`])
//!
//! Both expose the same [`Scheduler`] trait. Everything above this module
//! issues work through `run_now` / `run_async_*` / `run_at_region` and never
//! looks at which variant it is running on.
//!
//! Delays and periods are in ticks (see [`SchedulerConfig::tick_millis`]).

mod global;
mod handle;
mod manual;
mod queue;
mod region;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use glam::IVec3;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use web_time::Instant;

pub use global::GlobalLoopScheduler;
pub use handle::SchedulerHandle;
pub use manual::ManualScheduler;
pub use region::{RegionKey, RegionScheduler};

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use queue::TaskQueue;

/// Scheduler time unit
pub type Ticks = u64;

/// Concurrency model of the host runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeModel {
    /// One authoritative thread runs all world work
    GlobalLoop,
    /// Each spatial region is ticked by its own thread
    RegionThreaded,
}

static RUNTIME_MODEL: OnceCell<RuntimeModel> = OnceCell::new();

/// Probe the runtime model once; later calls return the first result
/// without running their probe.
pub fn detect_runtime_model(probe: impl FnOnce() -> RuntimeModel) -> RuntimeModel {
    *RUNTIME_MODEL.get_or_init(|| {
        let model = probe();
        log::info!("[SCHED] Detected runtime model: {:?}", model);
        model
    })
}

/// The probed runtime model, if probing already happened
pub fn runtime_model() -> Option<RuntimeModel> {
    RUNTIME_MODEL.get().copied()
}

/// Which context a task runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The authoritative context for global, non-spatial work
    Authoritative,
    /// Off the authoritative context (filesystem, network)
    Async,
    /// The context owning the region containing these block coordinates
    Region(IVec3),
}

/// Work to run
pub enum Job {
    Once(Box<dyn FnOnce() + Send + 'static>),
    Repeat {
        task: Box<dyn FnMut() + Send + 'static>,
        period: Ticks,
    },
}

/// Uniform task API; see the module docs
pub trait Scheduler: Send + Sync {
    /// Variant this scheduler implements (for diagnostics only)
    fn model(&self) -> RuntimeModel;

    /// Queue a job on a target context after `delay` ticks
    fn submit(&self, target: Target, delay: Ticks, job: Job) -> SchedulerHandle;

    /// Ticks elapsed on the authoritative context
    fn current_tick(&self) -> Ticks;

    /// Stop tick threads and cancel everything still queued
    fn shutdown(&self);
}

impl dyn Scheduler {
    pub fn run_now(&self, task: impl FnOnce() + Send + 'static) -> SchedulerHandle {
        self.submit(Target::Authoritative, 0, Job::Once(Box::new(task)))
    }

    pub fn run_after(&self, task: impl FnOnce() + Send + 'static, delay: Ticks) -> SchedulerHandle {
        self.submit(Target::Authoritative, delay, Job::Once(Box::new(task)))
    }

    pub fn run_every(
        &self,
        task: impl FnMut() + Send + 'static,
        delay: Ticks,
        period: Ticks,
    ) -> SchedulerHandle {
        self.submit(
            Target::Authoritative,
            delay,
            Job::Repeat {
                task: Box::new(task),
                period,
            },
        )
    }

    pub fn run_async_now(&self, task: impl FnOnce() + Send + 'static) -> SchedulerHandle {
        self.submit(Target::Async, 0, Job::Once(Box::new(task)))
    }

    pub fn run_async_after(
        &self,
        task: impl FnOnce() + Send + 'static,
        delay: Ticks,
    ) -> SchedulerHandle {
        self.submit(Target::Async, delay, Job::Once(Box::new(task)))
    }

    pub fn run_async_every(
        &self,
        task: impl FnMut() + Send + 'static,
        delay: Ticks,
        period: Ticks,
    ) -> SchedulerHandle {
        self.submit(
            Target::Async,
            delay,
            Job::Repeat {
                task: Box::new(task),
                period,
            },
        )
    }

    /// Run on whichever context owns the region containing `at`
    pub fn run_at_region(
        &self,
        task: impl FnOnce() + Send + 'static,
        at: IVec3,
    ) -> SchedulerHandle {
        self.submit(Target::Region(at), 0, Job::Once(Box::new(task)))
    }

    /// Idempotent; cancelling a finished or already-cancelled handle is a no-op
    pub fn cancel(&self, handle: &SchedulerHandle) {
        if handle.cancel() {
            log::trace!("[SCHED] Cancelled task {}", handle.id());
        }
    }
}

/// Build the scheduler matching a runtime model
pub fn for_model(
    model: RuntimeModel,
    config: &SchedulerConfig,
) -> Result<Arc<dyn Scheduler>, SchedulerError> {
    Ok(match model {
        RuntimeModel::GlobalLoop => Arc::new(GlobalLoopScheduler::start(config)?),
        RuntimeModel::RegionThreaded => Arc::new(RegionScheduler::start(config)?),
    })
}

/// Run a task, logging instead of propagating a panic
pub(crate) fn run_guarded(task_id: u64, task: impl FnOnce()) {
    if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(task)) {
        log::error!(
            "[SCHED] Task {} panicked: {}",
            task_id,
            panic_message(panic.as_ref())
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

fn build_async_pool(threads: usize) -> Result<Arc<rayon::ThreadPool>, SchedulerError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(|i| format!("worldcycle-async-{}", i))
        .build()?;
    Ok(Arc::new(pool))
}

fn spawn_on_pool(
    pool: &rayon::ThreadPool,
    handle: SchedulerHandle,
    task: Box<dyn FnOnce() + Send + 'static>,
) {
    pool.spawn(move || {
        if handle.is_cancelled() {
            return;
        }
        run_guarded(handle.id(), task);
        handle.mark_finished();
    });
}

/// Route async work: immediate one-shots go straight to the pool, anything
/// timed is clocked on `timer` and handed to the pool when due.
fn dispatch_async(
    pool: &Arc<rayon::ThreadPool>,
    timer: &TaskQueue,
    delay: Ticks,
    job: Job,
    handle: SchedulerHandle,
) {
    match job {
        Job::Once(task) if delay == 0 => spawn_on_pool(pool, handle, task),
        Job::Once(task) => {
            let pool = pool.clone();
            let task_handle = handle.clone();
            timer.push(
                delay,
                Job::Once(Box::new(move || spawn_on_pool(&pool, task_handle, task))),
                handle,
                false,
            );
        }
        Job::Repeat { task, period } => {
            let pool = pool.clone();
            let task_handle = handle.clone();
            let shared = Arc::new(Mutex::new(task));
            timer.push(
                delay,
                Job::Repeat {
                    task: Box::new(move || {
                        let shared = shared.clone();
                        let handle = task_handle.clone();
                        pool.spawn(move || {
                            if handle.is_cancelled() {
                                return;
                            }
                            let mut task = shared.lock().unwrap_or_else(PoisonError::into_inner);
                            run_guarded(handle.id(), || (*task)());
                        });
                    }),
                    period,
                },
                handle,
                false,
            );
        }
    }
}

/// Spawn a thread that calls `tick` at a fixed rate until `running` clears
fn spawn_tick_thread(
    name: String,
    running: Arc<AtomicBool>,
    interval: Duration,
    tick: impl Fn() + Send + 'static,
) -> Result<JoinHandle<()>, SchedulerError> {
    let thread_name = name.clone();
    std::thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            let name = thread_name;
            log::debug!("[SCHED] Tick thread '{}' started", name);
            let mut next = Instant::now();
            while running.load(Ordering::Acquire) {
                tick();

                next += interval;
                let now = Instant::now();
                if next > now {
                    std::thread::sleep(next - now);
                } else {
                    // Overloaded: skip the missed ticks instead of bursting
                    next = now;
                }
            }
            log::debug!("[SCHED] Tick thread '{}' stopped", name);
        })
        .map_err(|source| SchedulerError::Thread { name, source })
}

/// Join tick threads unless called from one of them
fn join_tick_threads(threads: Vec<JoinHandle<()>>) {
    let current = std::thread::current().id();
    for thread in threads {
        if thread.thread().id() == current {
            continue;
        }
        if thread.join().is_err() {
            log::error!("[SCHED] Tick thread terminated by panic");
        }
    }
}
