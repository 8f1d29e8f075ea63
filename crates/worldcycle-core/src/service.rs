//! One entry point for both reset strategies
//!
//! Hosts that can create and delete worlds at runtime get an instant reset.
//! Hosts that cannot get pool rotation instead. The choice is made once, from
//! the host's declared capabilities.

use crate::config::CoreConfig;
use crate::error::ResetError;
use crate::host::{Collaborators, Initiator, WorldInfo};
use crate::pool::WorldPoolManager;
use crate::reset::{ResetOrchestrator, ResetPhase};

/// What a successful reset request did
#[derive(Debug, Clone, PartialEq)]
pub enum ResetOutcome {
    /// An instant reset is now running on the scheduler
    Started,
    /// The pool rotated; players were sent to this world
    Rotated(WorldInfo),
}

pub enum ResetService {
    Instant(ResetOrchestrator),
    Rotating(WorldPoolManager),
}

impl ResetService {
    /// Pick the strategy the host supports. The rotating variant still needs
    /// [`WorldPoolManager::initialize_pool`] before its first reset.
    pub fn new(deps: Collaborators, config: &CoreConfig) -> Self {
        if deps.host.capabilities().dynamic_worlds {
            log::info!("[RESET] Host supports runtime world creation, using instant resets");
            ResetService::Instant(ResetOrchestrator::new(
                deps,
                config.reset.clone(),
                config.spawn.clone(),
            ))
        } else {
            log::info!("[RESET] Host has a fixed world set, using pool rotation");
            ResetService::Rotating(WorldPoolManager::new(deps, config.pool.clone()))
        }
    }

    pub fn begin_full_reset(&self, initiator: Initiator) -> Result<ResetOutcome, ResetError> {
        match self {
            ResetService::Instant(orchestrator) => {
                orchestrator.begin_full_reset(initiator)?;
                Ok(ResetOutcome::Started)
            }
            ResetService::Rotating(pool) => {
                log::info!("[RESET] Rotation requested by {}", initiator);
                let info = pool.rotate_to_next_world()?;
                pool.send_everyone_to(&info);
                Ok(ResetOutcome::Rotated(info))
            }
        }
    }

    /// Rotation finishes inside `begin_full_reset`, so only instant resets
    /// are ever observed in progress.
    pub fn is_reset_in_progress(&self) -> bool {
        match self {
            ResetService::Instant(orchestrator) => orchestrator.is_reset_in_progress(),
            ResetService::Rotating(_) => false,
        }
    }

    pub fn current_phase(&self) -> ResetPhase {
        match self {
            ResetService::Instant(orchestrator) => orchestrator.current_phase(),
            ResetService::Rotating(_) => ResetPhase::Idle,
        }
    }

    pub fn pool(&self) -> Option<&WorldPoolManager> {
        match self {
            ResetService::Rotating(pool) => Some(pool),
            ResetService::Instant(_) => None,
        }
    }

    pub fn orchestrator(&self) -> Option<&ResetOrchestrator> {
        match self {
            ResetService::Instant(orchestrator) => Some(orchestrator),
            ResetService::Rotating(_) => None,
        }
    }
}
