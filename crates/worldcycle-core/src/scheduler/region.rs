//! Region-parallel runtime: one global-region thread plus region tick threads

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use glam::IVec3;

use super::queue::TaskQueue;
use super::{
    build_async_pool, dispatch_async, join_tick_threads, spawn_tick_thread, Job, RuntimeModel,
    Scheduler, SchedulerHandle, Target, Ticks,
};
use crate::config::SchedulerConfig;
use crate::error::SchedulerError;

/// Chunks are 16 blocks wide
const CHUNK_SHIFT: i32 = 4;

/// Identifies a square block of chunks ticked by a single thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionKey {
    pub x: i32,
    pub z: i32,
}

impl RegionKey {
    /// Region containing the given block coordinates (y is ignored)
    pub fn containing(block: IVec3, region_shift: u32) -> Self {
        let shift = CHUNK_SHIFT + region_shift.min(16) as i32;
        Self {
            x: block.x >> shift,
            z: block.z >> shift,
        }
    }

    /// Index of the thread owning this region; stable for a given thread count
    pub fn owner(self, threads: usize) -> usize {
        let h = (self.x as i64 as u64)
            .wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ (self.z as i64 as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
        ((h ^ (h >> 29)) % threads.max(1) as u64) as usize
    }
}

struct RegionShared {
    global: TaskQueue,
    regions: Vec<TaskQueue>,
    region_shift: u32,
    pool: Arc<rayon::ThreadPool>,
    running: Arc<AtomicBool>,
}

impl RegionShared {
    fn region_queue(&self, at: IVec3) -> (usize, &TaskQueue) {
        let index = RegionKey::containing(at, self.region_shift).owner(self.regions.len());
        (index, &self.regions[index])
    }
}

/// Scheduler for region-threaded runtimes
///
/// Global work runs on `worldcycle-global`. Region work runs on the
/// `worldcycle-region-N` thread that owns the region, so two tasks for the
/// same region never run concurrently.
pub struct RegionScheduler {
    shared: Arc<RegionShared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl RegionScheduler {
    pub fn start(config: &SchedulerConfig) -> Result<Self, SchedulerError> {
        let region_threads = config.region_threads.max(1);
        let shared = Arc::new(RegionShared {
            global: TaskQueue::new(),
            regions: (0..region_threads).map(|_| TaskQueue::new()).collect(),
            region_shift: config.region_shift,
            pool: build_async_pool(config.async_threads)?,
            running: Arc::new(AtomicBool::new(true)),
        });
        let interval = Duration::from_millis(config.tick_millis.max(1));

        let mut threads = Vec::with_capacity(region_threads + 1);
        let started = (|| {
            let tick_shared = shared.clone();
            threads.push(spawn_tick_thread(
                "worldcycle-global".to_string(),
                shared.running.clone(),
                interval,
                move || {
                    tick_shared.global.run_tick();
                },
            )?);

            for index in 0..region_threads {
                let tick_shared = shared.clone();
                threads.push(spawn_tick_thread(
                    format!("worldcycle-region-{}", index),
                    shared.running.clone(),
                    interval,
                    move || {
                        tick_shared.regions[index].run_tick();
                    },
                )?);
            }
            Ok::<(), SchedulerError>(())
        })();

        if let Err(e) = started {
            shared.running.store(false, Ordering::Release);
            join_tick_threads(threads);
            return Err(e);
        }

        log::info!(
            "[SCHED] Region scheduler started ({} region threads, {} async threads, regions of {} chunks)",
            region_threads,
            config.async_threads,
            1u32 << config.region_shift.min(16)
        );

        Ok(Self {
            shared,
            threads: Mutex::new(threads),
        })
    }

    /// Number of region tick threads
    pub fn region_threads(&self) -> usize {
        self.shared.regions.len()
    }
}

impl Scheduler for RegionScheduler {
    fn model(&self) -> RuntimeModel {
        RuntimeModel::RegionThreaded
    }

    fn submit(&self, target: Target, delay: Ticks, job: Job) -> SchedulerHandle {
        let handle = SchedulerHandle::new();
        if !self.shared.running.load(Ordering::Acquire) {
            log::warn!("[SCHED] Task submitted after shutdown, dropping it");
            handle.cancel();
            return handle;
        }

        match target {
            Target::Authoritative => self.shared.global.push(delay, job, handle.clone(), true),
            Target::Region(at) => {
                let (index, queue) = self.shared.region_queue(at);
                log::trace!(
                    "[SCHED] Task {} for {:?} routed to region thread {}",
                    handle.id(),
                    at,
                    index
                );
                queue.push(delay, job, handle.clone(), true);
            }
            Target::Async => {
                dispatch_async(&self.shared.pool, &self.shared.global, delay, job, handle.clone())
            }
        }
        handle
    }

    fn current_tick(&self) -> Ticks {
        self.shared.global.current_tick()
    }

    fn shutdown(&self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }

        let threads = std::mem::take(
            &mut *self.threads.lock().unwrap_or_else(PoisonError::into_inner),
        );
        join_tick_threads(threads);

        let mut dropped = self.shared.global.clear();
        for queue in &self.shared.regions {
            dropped += queue.clear();
        }
        log::info!(
            "[SCHED] Region scheduler stopped ({} pending tasks dropped)",
            dropped
        );
    }
}

impl Drop for RegionScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
