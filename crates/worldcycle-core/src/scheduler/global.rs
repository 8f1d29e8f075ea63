//! Single global authoritative loop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use super::queue::TaskQueue;
use super::{
    build_async_pool, dispatch_async, join_tick_threads, spawn_tick_thread, Job, RuntimeModel,
    Scheduler, SchedulerHandle, Target, Ticks,
};
use crate::config::SchedulerConfig;
use crate::error::SchedulerError;

struct LoopShared {
    queue: TaskQueue,
    pool: Arc<rayon::ThreadPool>,
    running: Arc<AtomicBool>,
}

/// Scheduler for runtimes with one authoritative thread
///
/// Region-targeted work has no owner other than the main loop, so it runs
/// there exactly like `run_now`.
pub struct GlobalLoopScheduler {
    shared: Arc<LoopShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl GlobalLoopScheduler {
    /// Start the main tick thread and the async pool
    pub fn start(config: &SchedulerConfig) -> Result<Self, SchedulerError> {
        let shared = Arc::new(LoopShared {
            queue: TaskQueue::new(),
            pool: build_async_pool(config.async_threads)?,
            running: Arc::new(AtomicBool::new(true)),
        });

        let tick_shared = shared.clone();
        let thread = spawn_tick_thread(
            "worldcycle-main".to_string(),
            shared.running.clone(),
            Duration::from_millis(config.tick_millis.max(1)),
            move || {
                tick_shared.queue.run_tick();
            },
        )?;

        log::info!(
            "[SCHED] Global loop scheduler started ({} ms ticks, {} async threads)",
            config.tick_millis,
            config.async_threads
        );

        Ok(Self {
            shared,
            thread: Mutex::new(Some(thread)),
        })
    }
}

impl Scheduler for GlobalLoopScheduler {
    fn model(&self) -> RuntimeModel {
        RuntimeModel::GlobalLoop
    }

    fn submit(&self, target: Target, delay: Ticks, job: Job) -> SchedulerHandle {
        let handle = SchedulerHandle::new();
        if !self.shared.running.load(Ordering::Acquire) {
            log::warn!("[SCHED] Task submitted after shutdown, dropping it");
            handle.cancel();
            return handle;
        }

        match target {
            Target::Authoritative | Target::Region(_) => {
                self.shared.queue.push(delay, job, handle.clone(), true)
            }
            Target::Async => {
                dispatch_async(&self.shared.pool, &self.shared.queue, delay, job, handle.clone())
            }
        }
        handle
    }

    fn current_tick(&self) -> Ticks {
        self.shared.queue.current_tick()
    }

    fn shutdown(&self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }

        let thread = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        join_tick_threads(thread.into_iter().collect());

        let dropped = self.shared.queue.clear();
        log::info!(
            "[SCHED] Global loop scheduler stopped ({} pending tasks dropped)",
            dropped
        );
    }
}

impl Drop for GlobalLoopScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
