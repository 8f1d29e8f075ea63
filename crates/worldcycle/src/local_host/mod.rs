//! Headless in-process host
//!
//! Stands in for a game server: worlds are directories with a `world.meta`
//! file, terrain comes from [`NoiseTerrain`], players are simulated and
//! broadcasts go to the log. Chunk loads finish on the scheduler's async pool
//! so the reset's fan-in sees completions from arbitrary threads.

pub mod terrain;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use glam::{IVec2, IVec3, Vec3};
use worldcycle_core::error::ChunkLoadError;
use worldcycle_core::host::ChunkCallback;
use worldcycle_core::{
    BlockQuery, Broadcaster, Difficulty, FsWorldStorage, GameMode, HostCapabilities, Location,
    PlayerId, PlayerRoster, Scheduler, WorldHost, WorldInfo, WorldMetadata, WorldSettings,
    WorldStorage,
};

pub use terrain::NoiseTerrain;

struct LoadedWorld {
    info: WorldInfo,
    generate_structures: bool,
    difficulty: Difficulty,
    terrain: Arc<NoiseTerrain>,
    chunks: HashSet<IVec2>,
    forced: HashSet<IVec2>,
}

impl LoadedWorld {
    fn new(info: WorldInfo, generate_structures: bool, difficulty: Difficulty) -> Self {
        let terrain = Arc::new(NoiseTerrain::for_dimension(info.seed, info.dimension));
        Self {
            info,
            generate_structures,
            difficulty,
            terrain,
            chunks: HashSet::new(),
            forced: HashSet::new(),
        }
    }

    fn metadata(&self) -> WorldMetadata {
        let settings = WorldSettings {
            seed: self.info.seed,
            dimension: self.info.dimension,
            generate_structures: self.generate_structures,
            difficulty: self.difficulty,
        };
        let spawn = self.info.spawn;
        WorldMetadata::new(&settings, (spawn.x, spawn.y, spawn.z))
    }
}

#[derive(Debug, Clone)]
struct SimulatedPlayer {
    location: Location,
    mode: GameMode,
}

/// Per-world chunk counts, for reporting
#[derive(Debug, Clone, PartialEq)]
pub struct WorldReport {
    pub info: WorldInfo,
    pub loaded_chunks: usize,
    pub forced_chunks: usize,
}

pub struct LocalHost {
    storage: Arc<FsWorldStorage>,
    scheduler: Arc<dyn Scheduler>,
    capabilities: HostCapabilities,
    /// World players wait in during a reset; always accepts teleports
    holding_world: String,
    worlds: Arc<Mutex<HashMap<String, LoadedWorld>>>,
    players: Mutex<BTreeMap<PlayerId, SimulatedPlayer>>,
    next_player: AtomicU64,
    broadcasts: Mutex<Vec<String>>,
}

impl LocalHost {
    pub fn new(
        storage: Arc<FsWorldStorage>,
        scheduler: Arc<dyn Scheduler>,
        capabilities: HostCapabilities,
        holding_world: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            scheduler,
            capabilities,
            holding_world: holding_world.into(),
            worlds: Arc::new(Mutex::new(HashMap::new())),
            players: Mutex::new(BTreeMap::new()),
            next_player: AtomicU64::new(1),
            broadcasts: Mutex::new(Vec::new()),
        }
    }

    fn worlds(&self) -> MutexGuard<'_, HashMap<String, LoadedWorld>> {
        lock(&self.worlds)
    }

    /// Connect `count` simulated players around a world's spawn
    pub fn connect_players(&self, count: usize, world: &WorldInfo) -> Vec<PlayerId> {
        let spawn = world.spawn_location();
        let mut players = lock(&self.players);
        (0..count)
            .map(|i| {
                let id = PlayerId::from_raw(self.next_player.fetch_add(1, Ordering::Relaxed));
                let offset = Vec3::new((i % 4) as f32 * 2.0, 0.0, (i / 4) as f32 * 2.0);
                let location = Location::new(spawn.world.clone(), spawn.position + offset);
                log::debug!("[HOST] {} joined at {:?}", id, location.position);
                players.insert(
                    id,
                    SimulatedPlayer {
                        location,
                        mode: GameMode::Survival,
                    },
                );
                id
            })
            .collect()
    }

    pub fn game_mode(&self, player: PlayerId) -> Option<GameMode> {
        lock(&self.players).get(&player).map(|p| p.mode)
    }

    /// Loaded worlds, sorted by name
    pub fn world_reports(&self) -> Vec<WorldReport> {
        let worlds = self.worlds();
        let mut reports: Vec<WorldReport> = worlds
            .values()
            .map(|w| WorldReport {
                info: w.info.clone(),
                loaded_chunks: w.chunks.len(),
                forced_chunks: w.forced.len(),
            })
            .collect();
        reports.sort_by(|a, b| a.info.name.cmp(&b.info.name));
        reports
    }

    /// Every message broadcast so far
    pub fn broadcasts(&self) -> Vec<String> {
        lock(&self.broadcasts).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl WorldHost for LocalHost {
    fn capabilities(&self) -> HostCapabilities {
        self.capabilities
    }

    fn loaded_world(&self, name: &str) -> Option<WorldInfo> {
        self.worlds().get(name).map(|w| w.info.clone())
    }

    fn load_world(&self, name: &str) -> Option<WorldInfo> {
        if let Some(loaded) = self.loaded_world(name) {
            return Some(loaded);
        }

        let meta = match self.storage.read_metadata(name) {
            Ok(Some(meta)) => meta,
            Ok(None) => {
                log::debug!("[HOST] World '{}' has no metadata, cannot load", name);
                return None;
            }
            Err(e) => {
                log::warn!("[HOST] Failed to read metadata of '{}': {}", name, e);
                return None;
            }
        };

        let (x, y, z) = meta.spawn_point;
        let info = WorldInfo {
            name: name.to_string(),
            seed: meta.seed,
            dimension: meta.dimension,
            spawn: IVec3::new(x, y, z),
        };
        log::info!("[HOST] Loaded world '{}' (seed {})", name, info.seed);
        self.worlds().insert(
            name.to_string(),
            LoadedWorld::new(info.clone(), meta.generate_structures, meta.difficulty),
        );
        Some(info)
    }

    fn create_world(&self, name: &str, settings: &WorldSettings) -> Option<WorldInfo> {
        let terrain = NoiseTerrain::for_dimension(settings.seed, settings.dimension);
        let spawn_y = terrain.highest_block_y(0, 0).unwrap_or(terrain::SEA_LEVEL) + 1;
        let info = WorldInfo {
            name: name.to_string(),
            seed: settings.seed,
            dimension: settings.dimension,
            spawn: IVec3::new(0, spawn_y, 0),
        };
        let world =
            LoadedWorld::new(info.clone(), settings.generate_structures, settings.difficulty);

        if let Err(e) = self.storage.write_metadata(name, &world.metadata()) {
            log::error!("[HOST] Failed to create world '{}': {}", name, e);
            return None;
        }
        log::info!(
            "[HOST] Created world '{}' ({:?}, seed {}, structures {}, {:?})",
            name,
            settings.dimension,
            settings.seed,
            settings.generate_structures,
            settings.difficulty
        );
        self.worlds().insert(name.to_string(), world);
        Some(info)
    }

    fn unload_world(&self, name: &str, save: bool) -> bool {
        let Some(world) = self.worlds().remove(name) else {
            return false;
        };
        if save {
            if let Err(e) = self.storage.write_metadata(name, &world.metadata()) {
                log::warn!("[HOST] Failed to save '{}' while unloading: {}", name, e);
            }
        }
        log::info!(
            "[HOST] Unloaded world '{}' ({} chunks{})",
            name,
            world.chunks.len(),
            if save { ", saved" } else { "" }
        );
        true
    }

    fn load_chunk_async(&self, world: &str, chunk: IVec2, done: ChunkCallback) {
        let terrain = self.worlds().get(world).map(|w| w.terrain.clone());
        let Some(terrain) = terrain else {
            done(Err(ChunkLoadError(format!("world '{}' is not loaded", world))));
            return;
        };

        let worlds = self.worlds.clone();
        let world = world.to_string();
        self.scheduler.run_async_now(move || {
            // Touch every column so the load has real work to do
            let origin = chunk * 16;
            let mut top = i32::MIN;
            for dz in 0..16 {
                for dx in 0..16 {
                    if let Some(y) = terrain.highest_block_y(origin.x + dx, origin.y + dz) {
                        top = top.max(y);
                    }
                }
            }

            let result = match lock(&worlds).get_mut(&world) {
                Some(loaded) => {
                    loaded.chunks.insert(chunk);
                    log::trace!("[HOST] Chunk {:?} of '{}' loaded (top {})", chunk, world, top);
                    Ok(())
                }
                None => Err(ChunkLoadError(format!(
                    "world '{}' unloaded while loading chunk {:?}",
                    world, chunk
                ))),
            };
            done(result);
        });
    }

    fn set_chunk_force_loaded(&self, world: &str, chunk: IVec2, forced: bool) {
        let mut worlds = self.worlds();
        let Some(loaded) = worlds.get_mut(world) else {
            log::warn!("[HOST] Cannot pin chunk {:?} of unloaded world '{}'", chunk, world);
            return;
        };
        if forced {
            loaded.chunks.insert(chunk);
            loaded.forced.insert(chunk);
        } else {
            loaded.forced.remove(&chunk);
        }
    }

    fn set_spawn_location(&self, world: &str, position: IVec3) -> bool {
        match self.worlds().get_mut(world) {
            Some(loaded) => {
                loaded.info.spawn = position;
                true
            }
            None => false,
        }
    }

    fn block_query(&self, world: &str) -> Option<Arc<dyn BlockQuery>> {
        self.worlds()
            .get(world)
            .map(|w| w.terrain.clone() as Arc<dyn BlockQuery>)
    }
}

impl PlayerRoster for LocalHost {
    fn online_players(&self) -> Vec<PlayerId> {
        lock(&self.players).keys().copied().collect()
    }

    fn location(&self, player: PlayerId) -> Option<Location> {
        lock(&self.players).get(&player).map(|p| p.location.clone())
    }

    fn teleport(&self, player: PlayerId, to: &Location) -> bool {
        if to.world != self.holding_world && self.loaded_world(&to.world).is_none() {
            log::warn!("[HOST] Refused to move {} into unloaded world '{}'", player, to.world);
            return false;
        }
        match lock(&self.players).get_mut(&player) {
            Some(p) => {
                log::debug!("[HOST] {} -> {} {:?}", player, to.world, to.position);
                p.location = to.clone();
                true
            }
            None => false,
        }
    }

    fn set_game_mode(&self, player: PlayerId, mode: GameMode) {
        if let Some(p) = lock(&self.players).get_mut(&player) {
            p.mode = mode;
        }
    }
}

impl Broadcaster for LocalHost {
    fn broadcast(&self, message: &str) {
        log::info!("[CHAT] {}", message);
        lock(&self.broadcasts).push(message.to_string());
    }
}
