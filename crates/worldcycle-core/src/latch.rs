//! Fire-once fan-in over many asynchronous completions

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

type Continuation<T> = Box<dyn FnOnce(T) + Send + 'static>;

/// Counts completions and runs a continuation exactly once when the expected
/// number has arrived
///
/// Completions may arrive from any thread in any order. The continuation
/// receives the payload the latch was created with (typically the reset
/// session), so ownership flows through the fan-in without shared state.
pub struct CompletionLatch<T> {
    expected: usize,
    completed: AtomicUsize,
    fired: AtomicBool,
    pending: Mutex<Option<(T, Continuation<T>)>>,
}

impl<T: Send + 'static> CompletionLatch<T> {
    /// `expected` must be at least 1; callers with nothing to wait for should
    /// continue directly.
    pub fn new(
        expected: usize,
        payload: T,
        continuation: impl FnOnce(T) + Send + 'static,
    ) -> Arc<Self> {
        debug_assert!(expected > 0, "latch with nothing to wait for");
        Arc::new(Self {
            expected,
            completed: AtomicUsize::new(0),
            fired: AtomicBool::new(false),
            pending: Mutex::new(Some((payload, Box::new(continuation)))),
        })
    }

    /// Record one completion. Returns true for the call that fired the continuation.
    pub fn count_down(&self) -> bool {
        let done = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        if done < self.expected {
            return false;
        }
        if done > self.expected {
            log::warn!(
                "[LATCH] Unexpected completion {} of {}",
                done,
                self.expected
            );
            return false;
        }

        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match pending {
            Some((payload, continuation)) => {
                continuation(payload);
                true
            }
            None => false,
        }
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire).min(self.expected)
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}
