//! Host capabilities consumed by the core
//!
//! The core never talks to a game server directly. Everything it needs from
//! the host (world lifecycle, players, chat, persisted settings) goes through
//! the traits in this module so resets and rotations can run against a real
//! server, the headless local host, or a test double.

use std::sync::Arc;

use glam::{IVec2, IVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::ChunkLoadError;
use crate::persistence::WorldStorage;
use crate::scheduler::Scheduler;

/// Connected player identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(u64);

impl PlayerId {
    pub fn from_raw(id: u64) -> Self {
        PlayerId(id)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Player({})", self.0)
    }
}

/// Who asked for a reset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initiator {
    Console,
    Player(PlayerId),
}

impl std::fmt::Display for Initiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Initiator::Console => write!(f, "console"),
            Initiator::Player(id) => write!(f, "{}", id),
        }
    }
}

/// A position inside a named world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub world: String,
    pub position: Vec3,
}

impl Location {
    pub fn new(world: impl Into<String>, position: Vec3) -> Self {
        Self {
            world: world.into(),
            position,
        }
    }

    /// Location standing on top of a block position (centred in the column)
    pub fn above_block(world: impl Into<String>, block: IVec3) -> Self {
        Self::new(
            world,
            Vec3::new(block.x as f32 + 0.5, (block.y + 1) as f32, block.z as f32 + 0.5),
        )
    }

    /// Block coordinates containing this location
    pub fn block(&self) -> IVec3 {
        self.position.floor().as_ivec3()
    }
}

/// Primary world or one of its paired sub-dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Dimension {
    #[default]
    Overworld,
    Nether,
    End,
}

impl Dimension {
    /// Base world first, so teardown and creation always run in this order
    pub const ALL: [Dimension; 3] = [Dimension::Overworld, Dimension::Nether, Dimension::End];

    /// Directory suffix appended to the base world name
    pub fn suffix(self) -> &'static str {
        match self {
            Dimension::Overworld => "",
            Dimension::Nether => "_nether",
            Dimension::End => "_end",
        }
    }

    /// Name of this dimension's world for a given base name
    pub fn world_name(self, base: &str) -> String {
        format!("{}{}", base, self.suffix())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Peaceful,
    Easy,
    #[default]
    Normal,
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    #[default]
    Survival,
    Creative,
    Adventure,
    Spectator,
}

/// Everything the host needs to create a world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSettings {
    pub seed: u64,
    pub dimension: Dimension,
    pub generate_structures: bool,
    pub difficulty: Difficulty,
}

/// A world the host currently has loaded
#[derive(Debug, Clone, PartialEq)]
pub struct WorldInfo {
    pub name: String,
    pub seed: u64,
    pub dimension: Dimension,
    pub spawn: IVec3,
}

impl WorldInfo {
    pub fn spawn_location(&self) -> Location {
        Location::above_block(self.name.clone(), self.spawn - IVec3::Y)
    }
}

/// What the host runtime can do; probed once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostCapabilities {
    /// Work is partitioned into regions owned by separate threads
    pub region_threading: bool,
    /// Worlds can be unloaded, deleted and created after startup
    pub dynamic_worlds: bool,
}

/// Terrain classification as far as spawn safety is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Block {
    Air,
    Solid,
    Water,
    Lava,
    Leaves,
    Ice,
    /// Sand, gravel and anything else that falls when unsupported
    Falling,
    /// Magma, cactus, fire and other blocks that hurt on contact
    Damaging,
    /// Below the world floor
    Void,
}

impl Block {
    pub fn is_liquid(self) -> bool {
        matches!(self, Block::Water | Block::Lava)
    }

    /// Blocks a player must never be placed on
    pub fn is_hazard(self) -> bool {
        matches!(
            self,
            Block::Water
                | Block::Lava
                | Block::Leaves
                | Block::Ice
                | Block::Falling
                | Block::Damaging
                | Block::Void
        )
    }
}

/// Read-only block access used by the spawn locator
pub trait BlockQuery: Send + Sync {
    /// Y of the highest non-air block in a column, `None` for an empty (void) column
    fn highest_block_y(&self, x: i32, z: i32) -> Option<i32>;

    /// Block at world coordinates
    fn block_at(&self, x: i32, y: i32, z: i32) -> Block;
}

/// Callback invoked by the host once an async chunk load finishes
pub type ChunkCallback = Box<dyn FnOnce(Result<(), ChunkLoadError>) + Send + 'static>;

/// World lifecycle operations of the host runtime
///
/// World-mutating calls are only made from the authoritative (or owning
/// region) context; the host may rely on that.
pub trait WorldHost: Send + Sync {
    fn capabilities(&self) -> HostCapabilities;

    /// World if it is currently loaded
    fn loaded_world(&self, name: &str) -> Option<WorldInfo>;

    /// Load an existing world from disk
    fn load_world(&self, name: &str) -> Option<WorldInfo>;

    /// Create (generate) a world; `None` means creation failed
    fn create_world(&self, name: &str, settings: &WorldSettings) -> Option<WorldInfo>;

    /// Unload a world, optionally saving it first. Returns false if it was not loaded.
    fn unload_world(&self, name: &str, save: bool) -> bool;

    /// Start loading a chunk; `done` fires exactly once, on any thread
    fn load_chunk_async(&self, world: &str, chunk: IVec2, done: ChunkCallback);

    /// Pin or unpin a chunk so it cannot unload
    fn set_chunk_force_loaded(&self, world: &str, chunk: IVec2, forced: bool);

    /// Set the default entry point of a world
    fn set_spawn_location(&self, world: &str, position: IVec3) -> bool;

    /// Read-only view of a loaded world's blocks
    fn block_query(&self, world: &str) -> Option<Arc<dyn BlockQuery>>;
}

/// Connected players and the ability to move them
pub trait PlayerRoster: Send + Sync {
    fn online_players(&self) -> Vec<PlayerId>;

    fn location(&self, player: PlayerId) -> Option<Location>;

    /// Returns false if the player is gone or the move was refused
    fn teleport(&self, player: PlayerId, to: &Location) -> bool;

    fn set_game_mode(&self, player: PlayerId, mode: GameMode);

    fn players_in_world(&self, world: &str) -> Vec<PlayerId> {
        self.online_players()
            .into_iter()
            .filter(|p| self.location(*p).is_some_and(|loc| loc.world == world))
            .collect()
    }
}

/// Chat/notification sink reaching every connected player
pub trait Broadcaster: Send + Sync {
    fn broadcast(&self, message: &str);
}

/// Durable settings owned outside the core
pub trait SettingsStore: Send + Sync {
    fn saved_structure_generation(&self) -> Option<bool>;

    fn saved_difficulty(&self) -> Option<Difficulty>;

    fn save_world_seed(&self, seed: u64) -> anyhow::Result<()>;
}

/// Shared handles to every collaborator the core needs
#[derive(Clone)]
pub struct Collaborators {
    pub scheduler: Arc<dyn Scheduler>,
    pub host: Arc<dyn WorldHost>,
    pub storage: Arc<dyn WorldStorage>,
    pub roster: Arc<dyn PlayerRoster>,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub settings: Arc<dyn SettingsStore>,
}

impl Collaborators {
    /// Generation settings for a new world, falling back to defaults for unset values
    pub fn world_settings(&self, seed: u64, dimension: Dimension) -> WorldSettings {
        WorldSettings {
            seed,
            dimension,
            generate_structures: self.settings.saved_structure_generation().unwrap_or(true),
            difficulty: self.settings.saved_difficulty().unwrap_or_default(),
        }
    }
}
