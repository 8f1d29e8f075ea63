//! Deterministic caller-driven scheduler
//!
//! Nothing runs until the owner calls [`ManualScheduler::tick`]. Every
//! context (authoritative, region and async) executes on the calling thread,
//! which makes each reset phase observable one tick at a time.

use std::sync::atomic::{AtomicBool, Ordering};

use super::queue::TaskQueue;
use super::{Job, RuntimeModel, Scheduler, SchedulerHandle, Target, Ticks};

pub struct ManualScheduler {
    model: RuntimeModel,
    /// One clock for every context, so work submitted during a tick always
    /// runs on a later tick no matter which context it targets
    queue: TaskQueue,
    stopped: AtomicBool,
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::with_model(RuntimeModel::GlobalLoop)
    }

    /// Report `model` from [`Scheduler::model`]; execution stays single-threaded
    pub fn with_model(model: RuntimeModel) -> Self {
        Self {
            model,
            queue: TaskQueue::new(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Advance one tick. Returns the number of tasks that ran.
    pub fn tick(&self) -> usize {
        self.queue.run_tick()
    }

    /// Advance `ticks` ticks. Returns the number of tasks that ran.
    pub fn advance(&self, ticks: Ticks) -> usize {
        (0..ticks).map(|_| self.tick()).sum()
    }

    /// Tick until no one-shot work is queued, at most `max_ticks` times.
    /// Returns the number of ticks taken.
    pub fn run_until_idle(&self, max_ticks: Ticks) -> Ticks {
        let mut ticks = 0;
        while ticks < max_ticks && !self.is_idle() {
            self.tick();
            ticks += 1;
        }
        ticks
    }

    /// No one-shot work queued on any context
    pub fn is_idle(&self) -> bool {
        self.queue.pending_once() == 0
    }
}

impl Scheduler for ManualScheduler {
    fn model(&self) -> RuntimeModel {
        self.model
    }

    fn submit(&self, target: Target, delay: Ticks, job: Job) -> SchedulerHandle {
        let handle = SchedulerHandle::new();
        if self.stopped.load(Ordering::Acquire) {
            handle.cancel();
            return handle;
        }

        if let Target::Region(at) = target {
            log::trace!("[SCHED] Task {} for region at {:?}", handle.id(), at);
        }
        self.queue.push(delay, job, handle.clone(), true);
        handle
    }

    fn current_tick(&self) -> Ticks {
        self.queue.current_tick()
    }

    fn shutdown(&self) {
        self.stopped.store(true, Ordering::Release);
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::IVec3;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex};

    fn manual() -> (Arc<ManualScheduler>, Arc<dyn Scheduler>) {
        let manual = Arc::new(ManualScheduler::new());
        let scheduler: Arc<dyn Scheduler> = manual.clone();
        (manual, scheduler)
    }

    #[test]
    fn test_nothing_runs_until_ticked() {
        let (manual, scheduler) = manual();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        scheduler.run_now(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(manual.tick(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(manual.is_idle());
    }

    #[test]
    fn test_nested_submissions_run_on_later_ticks() {
        let (manual, scheduler) = manual();
        let order = Arc::new(Mutex::new(Vec::new()));

        let inner_scheduler = scheduler.clone();
        let o = order.clone();
        scheduler.run_now(move || {
            o.lock().unwrap().push("outer");
            let o2 = o.clone();
            inner_scheduler.run_async_now(move || o2.lock().unwrap().push("async"));
            let o3 = o.clone();
            inner_scheduler.run_at_region(move || o3.lock().unwrap().push("region"), IVec3::ZERO);
        });

        manual.tick();
        assert_eq!(*order.lock().unwrap(), vec!["outer"]);

        assert_eq!(manual.run_until_idle(10), 1);
        let order = order.lock().unwrap();
        assert_eq!(order.len(), 3);
        assert!(order.contains(&"async") && order.contains(&"region"));
    }

    #[test]
    fn test_run_every_and_cancel() {
        let (manual, scheduler) = manual();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let handle = scheduler.run_every(
            move || {
                c.fetch_add(1, Ordering::SeqCst);
            },
            2,
            5,
        );

        manual.advance(12);
        // Ticks 2, 7, 12
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        scheduler.cancel(&handle);
        scheduler.cancel(&handle);
        manual.advance(20);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.current_tick(), 32);
    }

    #[test]
    fn test_cancel_finished_handle_is_noop() {
        let (manual, scheduler) = manual();
        let handle = scheduler.run_async_after(|| {}, 1);
        manual.tick();

        assert!(handle.is_finished());
        scheduler.cancel(&handle);
        assert!(!handle.is_cancelled());
    }

    #[test]
    fn test_run_until_idle_respects_limit() {
        let (manual, scheduler) = manual();
        scheduler.run_after(|| {}, 100);
        assert_eq!(manual.run_until_idle(10), 10);
        assert!(!manual.is_idle());
        assert_eq!(manual.run_until_idle(1000), 90);
    }

    #[test]
    fn test_shutdown_cancels_and_rejects() {
        let (manual, scheduler) = manual();
        let pending = scheduler.run_after(|| {}, 5);
        scheduler.shutdown();
        assert!(pending.is_cancelled());

        let late = scheduler.run_now(|| panic!("must not run"));
        assert!(late.is_cancelled());
        assert_eq!(manual.advance(10), 0);
    }
}
