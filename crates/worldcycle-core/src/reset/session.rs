//! Reset phases and the per-reset session record

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use web_time::Instant;

use crate::error::ResetError;
use crate::host::{Broadcaster, Initiator, PlayerId};

/// Where a reset currently is
///
/// Phases only ever move forward to their successor, or to `Aborted` from
/// any active phase. `Complete` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResetPhase {
    Idle = 0,
    Announced = 1,
    Evacuated = 2,
    TornDown = 3,
    Regenerated = 4,
    ChunksPreloaded = 5,
    SpawnResolved = 6,
    Complete = 7,
    Aborted = 8,
}

impl ResetPhase {
    /// Successor on the success path
    pub fn next(self) -> Option<ResetPhase> {
        match self {
            ResetPhase::Idle => Some(ResetPhase::Announced),
            ResetPhase::Announced => Some(ResetPhase::Evacuated),
            ResetPhase::Evacuated => Some(ResetPhase::TornDown),
            ResetPhase::TornDown => Some(ResetPhase::Regenerated),
            ResetPhase::Regenerated => Some(ResetPhase::ChunksPreloaded),
            ResetPhase::ChunksPreloaded => Some(ResetPhase::SpawnResolved),
            ResetPhase::SpawnResolved => Some(ResetPhase::Complete),
            ResetPhase::Complete | ResetPhase::Aborted => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ResetPhase::Complete | ResetPhase::Aborted)
    }

    /// Between `Idle` and a terminal phase
    pub fn is_active(self) -> bool {
        self != ResetPhase::Idle && !self.is_terminal()
    }

    pub fn can_transition_to(self, to: ResetPhase) -> bool {
        if to == ResetPhase::Aborted {
            return self.is_active();
        }
        self.next() == Some(to)
    }

    pub fn label(self) -> &'static str {
        match self {
            ResetPhase::Idle => "idle",
            ResetPhase::Announced => "announced",
            ResetPhase::Evacuated => "evacuated",
            ResetPhase::TornDown => "torn down",
            ResetPhase::Regenerated => "regenerated",
            ResetPhase::ChunksPreloaded => "chunks preloaded",
            ResetPhase::SpawnResolved => "spawn resolved",
            ResetPhase::Complete => "complete",
            ResetPhase::Aborted => "aborted",
        }
    }

    fn from_u8(value: u8) -> ResetPhase {
        match value {
            1 => ResetPhase::Announced,
            2 => ResetPhase::Evacuated,
            3 => ResetPhase::TornDown,
            4 => ResetPhase::Regenerated,
            5 => ResetPhase::ChunksPreloaded,
            6 => ResetPhase::SpawnResolved,
            7 => ResetPhase::Complete,
            8 => ResetPhase::Aborted,
            _ => ResetPhase::Idle,
        }
    }
}

impl std::fmt::Display for ResetPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Read-only view of the orchestrator's state, shared with the active session
#[derive(Debug)]
pub(crate) struct ResetStatus {
    in_progress: AtomicBool,
    phase: AtomicU8,
    /// Terminal phase of the last finished session (`Idle` if none yet)
    last_outcome: AtomicU8,
}

impl ResetStatus {
    pub fn new() -> Self {
        Self {
            in_progress: AtomicBool::new(false),
            phase: AtomicU8::new(ResetPhase::Idle as u8),
            last_outcome: AtomicU8::new(ResetPhase::Idle as u8),
        }
    }

    /// Claim the single session slot. False if a session already holds it.
    pub fn try_claim(&self) -> bool {
        self.in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> ResetPhase {
        ResetPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn last_outcome(&self) -> Option<ResetPhase> {
        match ResetPhase::from_u8(self.last_outcome.load(Ordering::Acquire)) {
            ResetPhase::Idle => None,
            phase => Some(phase),
        }
    }

    fn set_phase(&self, phase: ResetPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    fn release(&self, outcome: ResetPhase) {
        self.last_outcome.store(outcome as u8, Ordering::Release);
        self.set_phase(ResetPhase::Idle);
        self.in_progress.store(false, Ordering::Release);
    }
}

/// Releases the in-progress flag when the session goes away, however that happens
///
/// A session dropped before reaching a terminal phase (a panicking phase, a
/// scheduler shut down under it) is reported as a failed reset.
pub(crate) struct SessionGuard {
    status: Arc<ResetStatus>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl SessionGuard {
    pub fn new(status: Arc<ResetStatus>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self {
            status,
            broadcaster,
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let phase = self.status.phase();
        let outcome = if phase.is_terminal() {
            phase
        } else {
            let err = ResetError::PhasePanicked { phase };
            log::error!("[RESET] {}", err);
            self.broadcaster.broadcast(&format!(
                "World reset failed during the '{}' phase. Manual intervention may be required.",
                phase
            ));
            ResetPhase::Aborted
        };
        self.status.release(outcome);
    }
}

/// State of one reset, owned by whichever phase is currently running
pub struct ResetSession {
    phase: ResetPhase,
    pub seed: u64,
    pub initiator: Initiator,
    /// Players moved to the holding area, in roster order
    pub evacuated_players: Vec<PlayerId>,
    pub started_at: Instant,
    guard: SessionGuard,
}

impl ResetSession {
    /// New session in `Idle`; the caller must already hold the status claim
    pub(crate) fn new(seed: u64, initiator: Initiator, guard: SessionGuard) -> Self {
        Self {
            phase: ResetPhase::Idle,
            seed,
            initiator,
            evacuated_players: Vec::new(),
            started_at: Instant::now(),
            guard,
        }
    }

    pub fn phase(&self) -> ResetPhase {
        self.phase
    }

    pub(crate) fn advance(&mut self, to: ResetPhase) -> Result<(), ResetError> {
        if !self.phase.can_transition_to(to) {
            return Err(ResetError::InvalidTransition {
                from: self.phase,
                to,
            });
        }

        log::info!(
            "[RESET] {} -> {} ({:.1}s elapsed)",
            self.phase,
            to,
            self.started_at.elapsed().as_secs_f32()
        );
        self.phase = to;
        self.guard.status.set_phase(to);
        Ok(())
    }
}

impl std::fmt::Debug for ResetSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResetSession")
            .field("phase", &self.phase)
            .field("seed", &self.seed)
            .field("initiator", &self.initiator)
            .field("evacuated_players", &self.evacuated_players.len())
            .finish()
    }
}
