//! # worldcycle-core
//!
//! Lifecycle management for large persistent worlds that must be torn down and
//! rebuilt while players stay connected.
//!
//! - [`scheduler`]: one task API over the host's two concurrency models
//! - [`spawn`]: heuristic search for a safe landing point
//! - [`pool`]: fixed ring of pre-built worlds for hosts without runtime world creation
//! - [`reset`]: phase-by-phase teardown and rebuild of a world and its sub-dimensions
//! - [`service`]: picks one of the two strategies from the host's capabilities

pub mod config;
pub mod error;
pub mod host;
pub mod latch;
pub mod persistence;
pub mod pool;
pub mod reset;
pub mod scheduler;
pub mod service;
pub mod spawn;
pub mod spiral;

pub use config::{CoreConfig, PoolConfig, ResetConfig, SchedulerConfig, SpawnSearchConfig};
pub use error::{PoolError, PoolWarning, ResetError, SchedulerError, StorageError};
pub use host::{
    Block, BlockQuery, Broadcaster, Collaborators, Difficulty, Dimension, GameMode,
    HostCapabilities, Initiator, Location, PlayerId, PlayerRoster, SettingsStore, WorldHost,
    WorldInfo, WorldSettings,
};
pub use persistence::{FsWorldStorage, WorldMetadata, WorldStorage};
pub use pool::{PoolStats, WorldPoolManager, WorldSlot};
pub use reset::{ResetOrchestrator, ResetPhase};
pub use scheduler::{RuntimeModel, Scheduler, SchedulerHandle};
pub use service::{ResetOutcome, ResetService};
pub use spawn::{find_safe_spawn, SpawnCandidate};
