//! Instant world reset
//!
//! A reset walks one [`ResetSession`] through these phases:
//!
//! 1. **Announced**: broadcast, capture the online roster and a seed
//! 2. **Evacuated**: move every captured player to the holding area
//! 3. **TornDown**: unload the base world and its sub-dimensions without
//!    saving, then delete their directories off the main thread
//! 4. **Regenerated**: create all three worlds again with the new seed
//! 5. **ChunksPreloaded**: load and pin a square of chunks around the base point
//! 6. **SpawnResolved**: search for a safe spawn and store it
//! 7. **Complete**: announce the new world
//!
//! Each phase runs as a scheduler task that owns the session and hands it to
//! the next task. A failed teardown or creation ends the session in
//! `Aborted`; nothing is retried or rolled back.

mod session;

use std::sync::Arc;

use glam::{IVec2, IVec3};

pub use session::{ResetPhase, ResetSession};

use crate::config::{ResetConfig, SpawnSearchConfig};
use crate::error::ResetError;
use crate::host::{Collaborators, Dimension, Initiator};
use crate::latch::CompletionLatch;
use crate::spawn::{find_safe_spawn, SpawnCandidate};
use crate::spiral::SquareSpiral;
use session::{ResetStatus, SessionGuard};

/// Blocks per chunk edge
const CHUNK_SIZE: i32 = 16;

/// Drives full resets of the base world and its sub-dimensions
///
/// Cheap to clone; clones drive the same state and share the
/// one-reset-at-a-time guarantee.
#[derive(Clone)]
pub struct ResetOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    deps: Collaborators,
    config: ResetConfig,
    spawn: SpawnSearchConfig,
    status: Arc<ResetStatus>,
}

impl ResetOrchestrator {
    pub fn new(deps: Collaborators, config: ResetConfig, spawn: SpawnSearchConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                deps,
                config,
                spawn,
                status: Arc::new(ResetStatus::new()),
            }),
        }
    }

    /// Start a reset with a fresh random seed
    pub fn begin_full_reset(&self, initiator: Initiator) -> Result<(), ResetError> {
        self.begin_full_reset_with_seed(initiator, rand::random())
    }

    /// Start a reset that regenerates the worlds from `seed`
    ///
    /// Returns as soon as the reset is announced; the remaining phases run
    /// on the scheduler. Fails with [`ResetError::AlreadyInProgress`]
    /// without touching anything if another reset is running.
    pub fn begin_full_reset_with_seed(
        &self,
        initiator: Initiator,
        seed: u64,
    ) -> Result<(), ResetError> {
        let inner = &self.inner;
        if !inner.status.try_claim() {
            log::warn!(
                "[RESET] Reset requested by {} while another reset is running",
                initiator
            );
            return Err(ResetError::AlreadyInProgress);
        }

        let guard = SessionGuard::new(inner.status.clone(), inner.deps.broadcaster.clone());
        let mut session = ResetSession::new(seed, initiator, guard);
        session.advance(ResetPhase::Announced)?;

        inner.deps.broadcaster.broadcast(&format!(
            "The world is being reset by {}. You will wait in a holding area until the new world is ready.",
            initiator
        ));
        session.evacuated_players = inner.deps.roster.online_players();
        log::info!(
            "[RESET] Reset of '{}' started by {} (seed {}, {} players online)",
            inner.config.base_world,
            initiator,
            seed,
            session.evacuated_players.len()
        );

        let next = inner.clone();
        inner.deps.scheduler.run_now(move || next.evacuate(session));
        Ok(())
    }

    pub fn is_reset_in_progress(&self) -> bool {
        self.inner.status.in_progress()
    }

    /// Phase of the running reset, `Idle` when none is running
    pub fn current_phase(&self) -> ResetPhase {
        self.inner.status.phase()
    }

    /// How the most recent reset ended (`Complete` or `Aborted`)
    pub fn last_outcome(&self) -> Option<ResetPhase> {
        self.inner.status.last_outcome()
    }

    pub fn config(&self) -> &ResetConfig {
        &self.inner.config
    }
}

impl Inner {
    fn world_names(&self) -> Vec<String> {
        Dimension::ALL
            .iter()
            .map(|dim| dim.world_name(&self.config.base_world))
            .collect()
    }

    /// Move the session forward. On `false` the caller drops the session and
    /// its guard reports the reset as failed.
    fn advance(self: &Arc<Self>, session: &mut ResetSession, to: ResetPhase) -> bool {
        match session.advance(to) {
            Ok(()) => true,
            Err(e) => {
                log::error!("[RESET] {}", e);
                false
            }
        }
    }

    fn evacuate(self: &Arc<Self>, session: ResetSession) {
        let players = session.evacuated_players.clone();
        if players.is_empty() {
            log::debug!("[RESET] Nobody online, skipping evacuation");
            self.finish_evacuation(session);
            return;
        }

        let next = self.clone();
        let latch = CompletionLatch::new(players.len(), session, move |session| {
            let scheduler = next.deps.scheduler.clone();
            scheduler.run_now(move || next.finish_evacuation(session));
        });

        let holding = self.config.holding_area.clone();
        let mode = self.config.holding_game_mode;
        for player in players {
            // Players are moved by the region they stand in
            let at = self
                .deps
                .roster
                .location(player)
                .map_or_else(|| holding.block(), |loc| loc.block());
            let roster = self.deps.roster.clone();
            let holding = holding.clone();
            let latch = latch.clone();
            self.deps.scheduler.run_at_region(
                move || {
                    if roster.teleport(player, &holding) {
                        roster.set_game_mode(player, mode);
                        log::debug!("[RESET] Moved {} to the holding area", player);
                    } else {
                        log::warn!("[RESET] Could not move {} to the holding area", player);
                    }
                    latch.count_down();
                },
                at,
            );
        }
    }

    fn finish_evacuation(self: &Arc<Self>, mut session: ResetSession) {
        if !self.advance(&mut session, ResetPhase::Evacuated) {
            return;
        }
        self.unload_worlds(session);
    }

    fn unload_worlds(self: &Arc<Self>, session: ResetSession) {
        let names = self.world_names();
        for name in &names {
            if self.deps.host.unload_world(name, false) {
                log::info!("[RESET] Unloaded '{}' without saving", name);
            } else {
                log::debug!("[RESET] '{}' was not loaded", name);
            }
        }

        let next = self.clone();
        self.deps
            .scheduler
            .run_async_now(move || next.delete_worlds(session, names));
    }

    /// Runs off the main thread; hands the session back before touching it
    fn delete_worlds(self: &Arc<Self>, session: ResetSession, names: Vec<String>) {
        for name in names {
            match self.deps.storage.delete_world(&name) {
                Ok(true) => log::info!("[RESET] Deleted '{}'", name),
                Ok(false) => log::debug!("[RESET] '{}' had no directory", name),
                Err(source) => {
                    let err = ResetError::TeardownIo { world: name, source };
                    let next = self.clone();
                    self.deps
                        .scheduler
                        .run_now(move || next.abort(session, err));
                    return;
                }
            }
        }

        let next = self.clone();
        self.deps
            .scheduler
            .run_now(move || next.finish_teardown(session));
    }

    fn finish_teardown(self: &Arc<Self>, mut session: ResetSession) {
        if !self.advance(&mut session, ResetPhase::TornDown) {
            return;
        }
        let next = self.clone();
        self.deps
            .scheduler
            .run_now(move || next.regenerate(session));
    }

    fn regenerate(self: &Arc<Self>, mut session: ResetSession) {
        for dimension in Dimension::ALL {
            let name = dimension.world_name(&self.config.base_world);
            let settings = self.deps.world_settings(session.seed, dimension);
            match self.deps.host.create_world(&name, &settings) {
                Some(info) => log::info!(
                    "[RESET] Created '{}' (seed {}, spawn {:?})",
                    info.name,
                    info.seed,
                    info.spawn
                ),
                None => {
                    self.abort(session, ResetError::WorldCreation { world: name });
                    return;
                }
            }
        }

        if let Err(e) = self.deps.settings.save_world_seed(session.seed) {
            log::warn!("[RESET] Failed to persist seed {}: {:#}", session.seed, e);
        }

        if !self.advance(&mut session, ResetPhase::Regenerated) {
            return;
        }
        self.preload_chunks(session);
    }

    fn preload_chunks(self: &Arc<Self>, session: ResetSession) {
        let base = self.config.base_point;
        let center = IVec2::new(base.x.div_euclid(CHUNK_SIZE), base.z.div_euclid(CHUNK_SIZE));
        let spiral = SquareSpiral::new(center, self.config.preload_radius);
        let total = spiral.total_points();
        log::info!(
            "[RESET] Preloading {} chunks around chunk ({}, {})",
            total,
            center.x,
            center.y
        );

        let next = self.clone();
        let latch = CompletionLatch::new(total, session, move |session| {
            let scheduler = next.deps.scheduler.clone();
            scheduler.run_now(move || next.finish_preload(session));
        });

        let world = self.config.base_world.clone();
        for chunk in spiral {
            let inner = self.clone();
            let latch = latch.clone();
            let chunk_world = world.clone();
            self.deps.host.load_chunk_async(
                &world,
                chunk,
                Box::new(move |result| {
                    let at = IVec3::new(
                        chunk.x * CHUNK_SIZE + CHUNK_SIZE / 2,
                        0,
                        chunk.y * CHUNK_SIZE + CHUNK_SIZE / 2,
                    );
                    let host = inner.deps.host.clone();
                    inner.deps.scheduler.run_at_region(
                        move || {
                            match result {
                                Ok(()) => host.set_chunk_force_loaded(&chunk_world, chunk, true),
                                Err(e) => log::warn!(
                                    "[RESET] Chunk ({}, {}) did not load: {}",
                                    chunk.x,
                                    chunk.y,
                                    e
                                ),
                            }
                            latch.count_down();
                        },
                        at,
                    );
                }),
            );
        }
    }

    fn finish_preload(self: &Arc<Self>, mut session: ResetSession) {
        if !self.advance(&mut session, ResetPhase::ChunksPreloaded) {
            return;
        }
        let next = self.clone();
        self.deps
            .scheduler
            .run_at_region(move || next.resolve_spawn(session), self.config.base_point);
    }

    /// Runs on the region owning the base point
    fn resolve_spawn(self: &Arc<Self>, mut session: ResetSession) {
        let world = &self.config.base_world;
        let start = self.config.base_point;
        let candidate = match self.deps.host.block_query(world) {
            Some(query) => find_safe_spawn(query.as_ref(), start, &self.spawn),
            None => {
                log::warn!(
                    "[RESET] No block access for '{}', keeping base point as spawn",
                    world
                );
                SpawnCandidate {
                    position: start,
                    score: 0,
                }
            }
        };

        if !self.deps.host.set_spawn_location(world, candidate.position) {
            log::warn!(
                "[RESET] Host refused spawn {:?} for '{}'",
                candidate.position,
                world
            );
        }
        log::info!(
            "[RESET] Spawn set to {:?} (score {})",
            candidate.position,
            candidate.score
        );

        if !self.advance(&mut session, ResetPhase::SpawnResolved) {
            return;
        }
        let next = self.clone();
        self.deps.scheduler.run_now(move || next.complete(session));
    }

    fn complete(self: &Arc<Self>, mut session: ResetSession) {
        if !self.advance(&mut session, ResetPhase::Complete) {
            return;
        }
        log::info!(
            "[RESET] Reset complete in {:.1}s (seed {}, {} players in the holding area)",
            session.started_at.elapsed().as_secs_f32(),
            session.seed,
            session.evacuated_players.len()
        );
        self.deps.broadcaster.broadcast(&format!(
            "The world has been reset (seed {}). It is ready to play.",
            session.seed
        ));
    }

    fn abort(self: &Arc<Self>, mut session: ResetSession, err: ResetError) {
        let phase = session.phase();
        match std::error::Error::source(&err) {
            Some(source) => log::error!(
                "[RESET] Reset aborted during '{}': {} ({})",
                phase,
                err,
                source
            ),
            None => log::error!("[RESET] Reset aborted during '{}': {}", phase, err),
        }
        self.deps.broadcaster.broadcast(&format!(
            "The world reset failed: {}. Manual intervention may be required.",
            err
        ));
        self.advance(&mut session, ResetPhase::Aborted);
    }
}

