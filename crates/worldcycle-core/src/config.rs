//! Tunables for the reset, pool, spawn search and scheduler
//!
//! Plain serde structs with compiled defaults. Loading and layering is the
//! host binary's job.

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::host::{GameMode, Location};

/// Pools larger than this are accepted but warned about
pub const MAX_RECOMMENDED_POOL_SIZE: usize = 20;

/// Size used when the configured pool is too small to rotate
pub const FALLBACK_POOL_SIZE: usize = 3;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub reset: ResetConfig,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub spawn: SpawnSearchConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Instant reset settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetConfig {
    /// Base world name; sub-dimensions append `_nether` / `_end`
    pub base_world: String,
    /// Centre of the preload grid and start of the spawn search
    pub base_point: IVec3,
    /// Preload grid radius in chunks (5 = 11x11 = 121 chunks)
    pub preload_radius: i32,
    /// Where players wait while their world is rebuilt
    pub holding_area: Location,
    /// Game mode applied to players in the holding area
    pub holding_game_mode: GameMode,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            base_world: "world".to_string(),
            base_point: IVec3::new(0, 64, 0),
            preload_radius: 5,
            holding_area: Location::new("lobby", Vec3::new(0.5, 100.0, 0.5)),
            holding_game_mode: GameMode::Adventure,
        }
    }
}

impl ResetConfig {
    /// Side length of the preload grid in chunks
    pub fn preload_grid_side(&self) -> usize {
        (self.preload_radius.max(0) * 2 + 1) as usize
    }
}

/// Fixed-pool rotation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Slot directories are named `<base_name>_<index>`
    pub base_name: String,
    pub size: usize,
    /// Load every existing slot at startup instead of only slot 0
    pub pregenerate_on_startup: bool,
    /// Cool-down in ticks before a retired slot is rebuilt (6000 = 5 minutes)
    pub regeneration_delay_ticks: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            base_name: "world_pool".to_string(),
            size: 3,
            pregenerate_on_startup: false,
            regeneration_delay_ticks: 6000,
        }
    }
}

impl PoolConfig {
    pub fn slot_name(&self, index: usize) -> String {
        format!("{}_{}", self.base_name, index)
    }
}

/// Safe-spawn search settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnSearchConfig {
    /// Distance in blocks between rings (and between points on a ring)
    pub step: i32,
    /// Once past this radius an acceptable candidate ends the search
    pub min_radius: i32,
    /// Hard limit of the search
    pub max_radius: i32,
    /// Candidates at or above this score end the search immediately
    pub good_score: u8,
    /// Candidates at or above this score are taken once `min_radius` is exceeded
    pub acceptable_score: u8,
    /// Preferred standing height range
    pub min_preferred_y: i32,
    pub max_preferred_y: i32,
}

impl Default for SpawnSearchConfig {
    fn default() -> Self {
        Self {
            step: 8,
            min_radius: 200,
            max_radius: 500,
            good_score: 80,
            acceptable_score: 60,
            min_preferred_y: 62,
            max_preferred_y: 120,
        }
    }
}

/// Scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Length of one tick in milliseconds
    pub tick_millis: u64,
    /// Threads in the async pool
    pub async_threads: usize,
    /// Region tick threads (region-threaded runtime only)
    pub region_threads: usize,
    /// Regions are `2^region_shift` chunks wide
    pub region_shift: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_millis: 50,
            async_threads: 4,
            region_threads: 4,
            region_shift: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoreConfig::default();
        assert_eq!(config.reset.base_world, "world");
        assert_eq!(config.reset.preload_grid_side(), 11);
        assert_eq!(config.pool.size, 3);
        assert_eq!(config.spawn.good_score, 80);
        assert_eq!(config.scheduler.tick_millis, 50);
    }

    #[test]
    fn test_slot_names() {
        let pool = PoolConfig::default();
        assert_eq!(pool.slot_name(0), "world_pool_0");
        assert_eq!(pool.slot_name(12), "world_pool_12");
    }

    #[test]
    fn test_config_ron_roundtrip() {
        let config = CoreConfig::default();
        let text = ron::ser::to_string_pretty(&config, Default::default()).unwrap();
        let parsed: CoreConfig = ron::from_str(&text).unwrap();
        assert_eq!(parsed.reset.base_point, config.reset.base_point);
        assert_eq!(parsed.pool.regeneration_delay_ticks, 6000);
    }
}
