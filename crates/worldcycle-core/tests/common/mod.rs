//! In-memory host doubles shared by the integration tests
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use glam::{IVec2, IVec3};
use tempfile::TempDir;
use worldcycle_core::host::ChunkCallback;
use worldcycle_core::scheduler::ManualScheduler;
use worldcycle_core::{
    Block, BlockQuery, Broadcaster, Collaborators, Difficulty, Dimension, FsWorldStorage,
    GameMode, HostCapabilities, Location, PlayerId, PlayerRoster, Scheduler, SettingsStore,
    StorageError, WorldHost, WorldInfo, WorldMetadata, WorldSettings, WorldStorage,
};

/// Flat terrain: solid up to `height`, air above
pub struct FlatTerrain {
    pub height: i32,
}

impl BlockQuery for FlatTerrain {
    fn highest_block_y(&self, _x: i32, _z: i32) -> Option<i32> {
        Some(self.height)
    }

    fn block_at(&self, _x: i32, y: i32, _z: i32) -> Block {
        if y <= self.height {
            Block::Solid
        } else {
            Block::Air
        }
    }
}

/// World host backed by real directories and an in-memory "loaded" set
pub struct FakeHost {
    storage: FsWorldStorage,
    capabilities: HostCapabilities,
    loaded: Mutex<HashMap<String, WorldInfo>>,
    fail_create: Mutex<HashSet<String>>,
    defer_chunks: AtomicBool,
    pending_chunks: Mutex<Vec<(IVec2, ChunkCallback)>>,
    forced: Mutex<HashSet<(String, IVec2)>>,
    panic_on_block_query: AtomicBool,
    pub created: Mutex<Vec<String>>,
    terrain: Arc<FlatTerrain>,
}

impl FakeHost {
    pub fn new(root: PathBuf, dynamic_worlds: bool) -> Self {
        Self {
            storage: FsWorldStorage::new(root).unwrap(),
            capabilities: HostCapabilities {
                region_threading: false,
                dynamic_worlds,
            },
            loaded: Mutex::new(HashMap::new()),
            fail_create: Mutex::new(HashSet::new()),
            defer_chunks: AtomicBool::new(false),
            pending_chunks: Mutex::new(Vec::new()),
            forced: Mutex::new(HashSet::new()),
            panic_on_block_query: AtomicBool::new(false),
            created: Mutex::new(Vec::new()),
            terrain: Arc::new(FlatTerrain { height: 70 }),
        }
    }

    pub fn fail_create(&self, name: &str) {
        self.fail_create.lock().unwrap().insert(name.to_string());
    }

    /// Hold chunk callbacks until the test fires them
    pub fn defer_chunks(&self, defer: bool) {
        self.defer_chunks.store(defer, Ordering::SeqCst);
    }

    pub fn take_pending_chunks(&self) -> Vec<(IVec2, ChunkCallback)> {
        std::mem::take(&mut *self.pending_chunks.lock().unwrap())
    }

    pub fn panic_on_block_query(&self) {
        self.panic_on_block_query.store(true, Ordering::SeqCst);
    }

    pub fn forced_chunks(&self, world: &str) -> usize {
        self.forced
            .lock()
            .unwrap()
            .iter()
            .filter(|(w, _)| w == world)
            .count()
    }

    pub fn loaded_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.loaded.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    /// Create the base world and its sub-dimensions with a known seed
    pub fn seed_world_set(&self, base: &str, seed: u64) {
        for dimension in Dimension::ALL {
            let settings = WorldSettings {
                seed,
                dimension,
                generate_structures: true,
                difficulty: Difficulty::Normal,
            };
            self.create_world(&dimension.world_name(base), &settings)
                .unwrap();
        }
    }
}

impl WorldHost for FakeHost {
    fn capabilities(&self) -> HostCapabilities {
        self.capabilities
    }

    fn loaded_world(&self, name: &str) -> Option<WorldInfo> {
        self.loaded.lock().unwrap().get(name).cloned()
    }

    fn load_world(&self, name: &str) -> Option<WorldInfo> {
        let meta = self.storage.read_metadata(name).ok()??;
        let (x, y, z) = meta.spawn_point;
        let info = WorldInfo {
            name: name.to_string(),
            seed: meta.seed,
            dimension: meta.dimension,
            spawn: IVec3::new(x, y, z),
        };
        self.loaded
            .lock()
            .unwrap()
            .insert(name.to_string(), info.clone());
        Some(info)
    }

    fn create_world(&self, name: &str, settings: &WorldSettings) -> Option<WorldInfo> {
        if self.fail_create.lock().unwrap().contains(name) {
            return None;
        }
        let spawn = IVec3::new(0, self.terrain.height + 1, 0);
        self.storage
            .write_metadata(name, &WorldMetadata::new(settings, (spawn.x, spawn.y, spawn.z)))
            .ok()?;

        let info = WorldInfo {
            name: name.to_string(),
            seed: settings.seed,
            dimension: settings.dimension,
            spawn,
        };
        self.loaded
            .lock()
            .unwrap()
            .insert(name.to_string(), info.clone());
        self.created.lock().unwrap().push(name.to_string());
        Some(info)
    }

    fn unload_world(&self, name: &str, _save: bool) -> bool {
        self.forced.lock().unwrap().retain(|(w, _)| w != name);
        self.loaded.lock().unwrap().remove(name).is_some()
    }

    fn load_chunk_async(&self, _world: &str, chunk: IVec2, done: ChunkCallback) {
        if self.defer_chunks.load(Ordering::SeqCst) {
            self.pending_chunks.lock().unwrap().push((chunk, done));
        } else {
            done(Ok(()));
        }
    }

    fn set_chunk_force_loaded(&self, world: &str, chunk: IVec2, forced: bool) {
        let mut set = self.forced.lock().unwrap();
        if forced {
            set.insert((world.to_string(), chunk));
        } else {
            set.remove(&(world.to_string(), chunk));
        }
    }

    fn set_spawn_location(&self, world: &str, position: IVec3) -> bool {
        match self.loaded.lock().unwrap().get_mut(world) {
            Some(info) => {
                info.spawn = position;
                true
            }
            None => false,
        }
    }

    fn block_query(&self, world: &str) -> Option<Arc<dyn BlockQuery>> {
        if self.panic_on_block_query.load(Ordering::SeqCst) {
            panic!("terrain unavailable");
        }
        self.loaded_world(world)?;
        Some(self.terrain.clone())
    }
}

#[derive(Default)]
pub struct FakeRoster {
    players: Mutex<BTreeMap<PlayerId, Location>>,
    modes: Mutex<HashMap<PlayerId, GameMode>>,
}

impl FakeRoster {
    pub fn add(&self, id: u64, location: Location) -> PlayerId {
        let player = PlayerId::from_raw(id);
        self.players.lock().unwrap().insert(player, location);
        player
    }

    pub fn mode(&self, player: PlayerId) -> Option<GameMode> {
        self.modes.lock().unwrap().get(&player).copied()
    }
}

impl PlayerRoster for FakeRoster {
    fn online_players(&self) -> Vec<PlayerId> {
        self.players.lock().unwrap().keys().copied().collect()
    }

    fn location(&self, player: PlayerId) -> Option<Location> {
        self.players.lock().unwrap().get(&player).cloned()
    }

    fn teleport(&self, player: PlayerId, to: &Location) -> bool {
        match self.players.lock().unwrap().get_mut(&player) {
            Some(location) => {
                *location = to.clone();
                true
            }
            None => false,
        }
    }

    fn set_game_mode(&self, player: PlayerId, mode: GameMode) {
        self.modes.lock().unwrap().insert(player, mode);
    }
}

#[derive(Default)]
pub struct RecordingBroadcaster {
    messages: Mutex<Vec<String>>,
}

impl RecordingBroadcaster {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.contains(needle))
            .count()
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn broadcast(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

#[derive(Default)]
pub struct MemorySettings {
    pub structures: Mutex<Option<bool>>,
    pub difficulty: Mutex<Option<Difficulty>>,
    pub saved_seeds: Mutex<Vec<u64>>,
}

impl SettingsStore for MemorySettings {
    fn saved_structure_generation(&self) -> Option<bool> {
        *self.structures.lock().unwrap()
    }

    fn saved_difficulty(&self) -> Option<Difficulty> {
        *self.difficulty.lock().unwrap()
    }

    fn save_world_seed(&self, seed: u64) -> anyhow::Result<()> {
        self.saved_seeds.lock().unwrap().push(seed);
        Ok(())
    }
}

/// Storage whose deletes fail for chosen worlds
pub struct FailingStorage {
    inner: FsWorldStorage,
    fail_delete: HashSet<String>,
}

impl FailingStorage {
    pub fn new(inner: FsWorldStorage, fail_delete: &[&str]) -> Self {
        Self {
            inner,
            fail_delete: fail_delete.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl WorldStorage for FailingStorage {
    fn world_dir(&self, name: &str) -> PathBuf {
        self.inner.world_dir(name)
    }

    fn create_world_dir(&self, name: &str) -> Result<PathBuf, StorageError> {
        self.inner.create_world_dir(name)
    }

    fn delete_world(&self, name: &str) -> Result<bool, StorageError> {
        if self.fail_delete.contains(name) {
            return Err(StorageError::Io {
                path: self.world_dir(name),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        self.inner.delete_world(name)
    }

    fn read_metadata(&self, name: &str) -> Result<Option<WorldMetadata>, StorageError> {
        self.inner.read_metadata(name)
    }

    fn write_metadata(&self, name: &str, meta: &WorldMetadata) -> Result<(), StorageError> {
        self.inner.write_metadata(name, meta)
    }

    fn list_worlds(&self) -> Result<Vec<String>, StorageError> {
        self.inner.list_worlds()
    }
}

/// Everything a test needs, driven by a [`ManualScheduler`]
pub struct Harness {
    pub dir: TempDir,
    pub manual: Arc<ManualScheduler>,
    pub scheduler: Arc<dyn Scheduler>,
    pub host: Arc<FakeHost>,
    pub storage: Arc<dyn WorldStorage>,
    pub roster: Arc<FakeRoster>,
    pub broadcaster: Arc<RecordingBroadcaster>,
    pub settings: Arc<MemorySettings>,
}

impl Harness {
    pub fn new(dynamic_worlds: bool) -> Self {
        Self::build(dynamic_worlds, &[])
    }

    /// Harness whose storage refuses to delete the named worlds
    pub fn with_failing_deletes(names: &[&str]) -> Self {
        Self::build(true, names)
    }

    fn build(dynamic_worlds: bool, fail_delete: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let manual = Arc::new(ManualScheduler::new());
        let scheduler: Arc<dyn Scheduler> = manual.clone();
        let host = Arc::new(FakeHost::new(dir.path().to_path_buf(), dynamic_worlds));
        let fs = FsWorldStorage::new(dir.path()).unwrap();
        let storage: Arc<dyn WorldStorage> = if fail_delete.is_empty() {
            Arc::new(fs)
        } else {
            Arc::new(FailingStorage::new(fs, fail_delete))
        };

        Self {
            dir,
            manual,
            scheduler,
            host,
            storage,
            roster: Arc::new(FakeRoster::default()),
            broadcaster: Arc::new(RecordingBroadcaster::default()),
            settings: Arc::new(MemorySettings::default()),
        }
    }

    pub fn deps(&self) -> Collaborators {
        self.deps_with(self.scheduler.clone())
    }

    /// Same collaborators on a different scheduler
    pub fn deps_with(&self, scheduler: Arc<dyn Scheduler>) -> Collaborators {
        Collaborators {
            scheduler,
            host: self.host.clone(),
            storage: self.storage.clone(),
            roster: self.roster.clone(),
            broadcaster: self.broadcaster.clone(),
            settings: self.settings.clone(),
        }
    }
}
