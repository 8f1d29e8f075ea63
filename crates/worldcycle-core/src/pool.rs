//! Fixed ring of pre-built worlds for hosts that cannot reset in place
//!
//! Slots are named `<base_name>_<index>`. Exactly one slot is current at a
//! time; rotating moves to the next slot and schedules the retired one to be
//! rebuilt with a fresh seed once players have had time to leave it.
//!
//! World-mutating methods must be called from the authoritative context.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::{PoolConfig, FALLBACK_POOL_SIZE, MAX_RECOMMENDED_POOL_SIZE};
use crate::error::{PoolError, PoolWarning};
use crate::host::{Collaborators, Dimension, WorldInfo};
use crate::latch::CompletionLatch;

/// One world in the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldSlot {
    pub name: String,
    /// Unknown until the slot's world is first loaded or created
    pub seed: Option<u64>,
    pub in_use: bool,
    /// Between teardown and recreation; the slot cannot become current meanwhile
    pub rebuilding: bool,
}

/// Snapshot for status displays
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub pool_size: usize,
    pub current_index: usize,
    pub current_name: String,
    pub current_seed: Option<u64>,
    /// Slots whose world is currently loaded
    pub materialized: usize,
}

/// Coerce a configured pool size into one that can rotate
pub fn validate_pool_size(requested: usize) -> (usize, Option<PoolWarning>) {
    if requested < 2 {
        (
            FALLBACK_POOL_SIZE,
            Some(PoolWarning::SizeTooSmall {
                requested,
                coerced: FALLBACK_POOL_SIZE,
            }),
        )
    } else if requested > MAX_RECOMMENDED_POOL_SIZE {
        (requested, Some(PoolWarning::SizeLarge { requested }))
    } else {
        (requested, None)
    }
}

struct PoolState {
    slots: Vec<WorldSlot>,
    current: usize,
}

struct PoolInner {
    deps: Collaborators,
    config: PoolConfig,
    warnings: Vec<PoolWarning>,
    state: Mutex<PoolState>,
}

/// Rotates through a fixed set of world slots
#[derive(Clone)]
pub struct WorldPoolManager {
    inner: Arc<PoolInner>,
}

impl WorldPoolManager {
    pub fn new(deps: Collaborators, config: PoolConfig) -> Self {
        let (size, warning) = validate_pool_size(config.size);
        if let Some(warning) = warning {
            log::warn!("[POOL] {}", warning);
        }

        let slots = (0..size)
            .map(|i| WorldSlot {
                name: config.slot_name(i),
                seed: None,
                in_use: false,
                rebuilding: false,
            })
            .collect();

        Self {
            inner: Arc::new(PoolInner {
                deps,
                config,
                warnings: warning.into_iter().collect(),
                state: Mutex::new(PoolState { slots, current: 0 }),
            }),
        }
    }

    /// Configuration problems found when the pool was built
    pub fn warnings(&self) -> &[PoolWarning] {
        &self.inner.warnings
    }

    /// Effective number of slots (after coercion)
    pub fn size(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn slots(&self) -> Vec<WorldSlot> {
        self.inner.lock().slots.clone()
    }

    /// Bring every slot to a known state, one slot at a time
    ///
    /// Loaded slots just record their seed. Slots on disk are loaded if they
    /// are slot 0 or `pregenerate_on_startup` is set, and otherwise left to
    /// load on first use. Missing slots are created with a fresh seed.
    pub fn initialize_pool(&self) -> Result<(), PoolError> {
        let inner = &self.inner;
        let mut state = inner.lock();
        let size = state.slots.len();
        log::info!(
            "[POOL] Initializing {} slots ({})",
            size,
            if inner.config.pregenerate_on_startup {
                "eager"
            } else {
                "lazy"
            }
        );

        for index in 0..size {
            let name = state.slots[index].name.clone();
            if let Some(info) = inner.deps.host.loaded_world(&name) {
                log::debug!("[POOL] Slot '{}' already loaded", name);
                state.slots[index].seed = Some(info.seed);
            } else if inner.deps.storage.exists(&name) {
                if index == 0 || inner.config.pregenerate_on_startup {
                    let info = inner
                        .deps
                        .host
                        .load_world(&name)
                        .ok_or_else(|| PoolError::WorldUnavailable { slot: name.clone() })?;
                    log::info!("[POOL] Loaded slot '{}' (seed {})", name, info.seed);
                    state.slots[index].seed = Some(info.seed);
                } else {
                    log::debug!("[POOL] Slot '{}' on disk, deferring load", name);
                }
            } else {
                let info = inner.create_slot_world(&name)?;
                state.slots[index].seed = Some(info.seed);
            }
        }

        for slot in state.slots.iter_mut() {
            slot.in_use = false;
        }
        state.slots[0].in_use = true;
        state.current = 0;
        log::info!("[POOL] Pool ready, current world '{}'", state.slots[0].name);
        Ok(())
    }

    /// World of the current slot, loading or creating it if needed
    pub fn get_current_world(&self) -> Result<WorldInfo, PoolError> {
        let mut state = self.inner.lock();
        let index = state.current;
        self.inner.materialize(&mut state, index)
    }

    /// Make the next slot current and schedule the retired slot's rebuild
    ///
    /// On failure the previous slot stays current.
    pub fn rotate_to_next_world(&self) -> Result<WorldInfo, PoolError> {
        let inner = &self.inner;
        let (previous, info) = {
            let mut state = inner.lock();
            let previous = state.current;
            let next = (previous + 1) % state.slots.len();

            state.slots[previous].in_use = false;
            match inner.materialize(&mut state, next) {
                Ok(info) => {
                    state.slots[next].in_use = true;
                    state.current = next;
                    (previous, info)
                }
                Err(e) => {
                    state.slots[previous].in_use = true;
                    log::error!("[POOL] Rotation to slot {} failed: {}", next, e);
                    return Err(e);
                }
            }
        };

        log::info!(
            "[POOL] Rotated to '{}' (seed {}), slot {} rebuilds in {} ticks",
            info.name,
            info.seed,
            previous,
            inner.config.regeneration_delay_ticks
        );

        let regen = inner.clone();
        inner.deps.scheduler.run_after(
            move || regen.regenerate_slot(previous),
            inner.config.regeneration_delay_ticks,
        );
        Ok(info)
    }

    /// Teleport every online player to a world's spawn, each on their own region
    pub fn send_everyone_to(&self, world: &WorldInfo) {
        let target = world.spawn_location();
        for player in self.inner.deps.roster.online_players() {
            let at = self
                .inner
                .deps
                .roster
                .location(player)
                .map_or_else(|| target.block(), |loc| loc.block());
            let roster = self.inner.deps.roster.clone();
            let target = target.clone();
            self.inner.deps.scheduler.run_at_region(
                move || {
                    if !roster.teleport(player, &target) {
                        log::warn!("[POOL] Could not move {} to '{}'", player, target.world);
                    }
                },
                at,
            );
        }
    }

    pub fn get_pool_stats(&self) -> PoolStats {
        let state = self.inner.lock();
        let current = &state.slots[state.current];
        let materialized = state
            .slots
            .iter()
            .filter(|slot| self.inner.deps.host.loaded_world(&slot.name).is_some())
            .count();

        PoolStats {
            pool_size: state.slots.len(),
            current_index: state.current,
            current_name: current.name.clone(),
            current_seed: current.seed,
            materialized,
        }
    }
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn create_slot_world(&self, name: &str) -> Result<WorldInfo, PoolError> {
        let seed = rand::random();
        let settings = self.deps.world_settings(seed, Dimension::Overworld);
        let info = self
            .deps
            .host
            .create_world(name, &settings)
            .ok_or_else(|| PoolError::WorldUnavailable {
                slot: name.to_string(),
            })?;
        log::info!("[POOL] Created slot '{}' (seed {})", name, info.seed);
        Ok(info)
    }

    /// Loaded world for a slot, loading it from disk or creating it as needed
    fn materialize(&self, state: &mut PoolState, index: usize) -> Result<WorldInfo, PoolError> {
        let name = state.slots[index].name.clone();
        if state.slots[index].rebuilding {
            log::warn!("[POOL] Slot '{}' is being rebuilt", name);
            return Err(PoolError::WorldUnavailable { slot: name });
        }
        let info = match self.deps.host.loaded_world(&name) {
            Some(info) => info,
            None if self.deps.storage.exists(&name) => {
                let info = self
                    .deps
                    .host
                    .load_world(&name)
                    .ok_or_else(|| PoolError::WorldUnavailable { slot: name.clone() })?;
                log::info!("[POOL] Loaded slot '{}' on demand", name);
                info
            }
            None => self.create_slot_world(&name)?,
        };
        state.slots[index].seed = Some(info.seed);
        Ok(info)
    }

    /// First step of a rebuild: move anyone still in the slot's world out
    fn regenerate_slot(self: &Arc<Self>, index: usize) {
        let (name, target) = {
            let state = self.lock();
            let slot = &state.slots[index];
            if slot.in_use {
                log::warn!(
                    "[POOL] Slot '{}' is current again, skipping its rebuild",
                    slot.name
                );
                return;
            }
            let current = &state.slots[state.current].name;
            let target = self
                .deps
                .host
                .loaded_world(current)
                .map(|world| world.spawn_location());
            (slot.name.clone(), target)
        };

        let stragglers = self.deps.roster.players_in_world(&name);
        if stragglers.is_empty() {
            self.teardown_slot(index);
            return;
        }
        let Some(target) = target else {
            log::error!(
                "[POOL] Current world is not loaded, leaving {} players in '{}' and skipping its rebuild",
                stragglers.len(),
                name
            );
            return;
        };

        log::info!(
            "[POOL] Moving {} players out of '{}' before rebuilding it",
            stragglers.len(),
            name
        );
        let next = self.clone();
        let latch = CompletionLatch::new(stragglers.len(), (), move |()| {
            let scheduler = next.deps.scheduler.clone();
            scheduler.run_now(move || next.teardown_slot(index));
        });
        for player in stragglers {
            let Some(at) = self.deps.roster.location(player).map(|loc| loc.block()) else {
                latch.count_down();
                continue;
            };
            let roster = self.deps.roster.clone();
            let target = target.clone();
            let latch = latch.clone();
            self.deps.scheduler.run_at_region(
                move || {
                    if !roster.teleport(player, &target) {
                        log::warn!("[POOL] Could not move {} to '{}'", player, target.world);
                    }
                    latch.count_down();
                },
                at,
            );
        }
    }

    fn teardown_slot(self: &Arc<Self>, index: usize) {
        let name = {
            let mut state = self.lock();
            let slot = &mut state.slots[index];
            if slot.in_use {
                log::warn!(
                    "[POOL] Slot '{}' became current during its rebuild, stopping",
                    slot.name
                );
                return;
            }
            slot.seed = None;
            slot.rebuilding = true;
            slot.name.clone()
        };

        if self.deps.host.unload_world(&name, false) {
            log::debug!("[POOL] Unloaded '{}' without saving", name);
        }

        let next = self.clone();
        self.deps.scheduler.run_async_now(move || {
            {
                let mut state = next.lock();
                let slot = &mut state.slots[index];
                if slot.in_use {
                    log::warn!("[POOL] Slot '{}' is current, not deleting it", name);
                    slot.rebuilding = false;
                    return;
                }
            }
            let recreate = next.clone();
            match next.deps.storage.delete_world(&name) {
                Ok(_) => {
                    next.deps
                        .scheduler
                        .run_now(move || recreate.recreate_slot(index));
                }
                Err(e) => {
                    log::error!("[POOL] Failed to delete '{}': {}", name, e);
                    // The old world stays on disk and loads again on next use
                    next.deps.scheduler.run_now(move || {
                        recreate.lock().slots[index].rebuilding = false;
                    });
                }
            }
        });
    }

    fn recreate_slot(&self, index: usize) {
        let mut state = self.lock();
        state.slots[index].rebuilding = false;
        let name = state.slots[index].name.clone();
        if let Some(info) = self.deps.host.loaded_world(&name) {
            log::warn!("[POOL] Slot '{}' already loaded, not recreating", name);
            state.slots[index].seed = Some(info.seed);
            return;
        }

        match self.create_slot_world(&name) {
            Ok(info) => state.slots[index].seed = Some(info.seed),
            Err(e) => log::error!("[POOL] Rebuild of '{}' failed: {}", name, e),
        }
    }
}
