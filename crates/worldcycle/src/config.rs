//! Layered configuration for the headless host
//!
//! Sources, later ones winning:
//! 1. Compiled defaults
//! 2. Optional RON file (`worldcycle.ron` unless `--config` says otherwise)
//! 3. `WORLDCYCLE_` environment variables, `__` between path segments
//!    (e.g. `WORLDCYCLE_CORE__POOL__SIZE=5`)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use worldcycle_core::{CoreConfig, RuntimeModel};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub runtime: RuntimeOverride,

    #[serde(default)]
    pub host: HostConfig,

    #[serde(default)]
    pub core: CoreConfig,
}

/// Forces a runtime model instead of probing for one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeOverride {
    #[default]
    Auto,
    Global,
    Region,
}

impl RuntimeOverride {
    /// The forced model, `None` for auto
    pub fn model(self) -> Option<RuntimeModel> {
        match self {
            RuntimeOverride::Auto => None,
            RuntimeOverride::Global => Some(RuntimeModel::GlobalLoop),
            RuntimeOverride::Region => Some(RuntimeModel::RegionThreaded),
        }
    }
}

/// Local host settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Directory holding one sub-directory per world
    pub world_root: PathBuf,
    /// Persisted structure flag, difficulty and last seed
    pub settings_file: PathBuf,
    /// Allow creating and deleting worlds at runtime (instant resets).
    /// When false the host behaves like a fixed-world server and resets rotate the pool.
    pub dynamic_worlds: bool,
    /// Players to simulate in the active world
    pub simulated_players: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            world_root: PathBuf::from("worlds"),
            settings_file: PathBuf::from("settings.ron"),
            dynamic_worlds: true,
            simulated_players: 4,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the given file (if present) and the environment
    pub fn load(path: &Path) -> Result<Self> {
        let builder = Config::builder()
            // Layer 1: Compiled defaults
            .add_source(
                Config::try_from(&AppConfig::default())
                    .context("Failed to serialize default configuration")?,
            )
            // Layer 2: Config file (optional, won't error if missing)
            .add_source(
                File::from(path)
                    .format(FileFormat::Ron)
                    .required(false),
            )
            // Layer 3: Environment variables (WORLDCYCLE_HOST__SIMULATED_PLAYERS, etc.)
            .add_source(Environment::with_prefix("WORLDCYCLE").separator("__"));

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.runtime, RuntimeOverride::Auto);
        assert_eq!(config.host.world_root, PathBuf::from("worlds"));
        assert!(config.host.dynamic_worlds);
        assert_eq!(config.core.pool.size, 3);
        assert_eq!(config.core.reset.preload_radius, 5);
    }

    #[test]
    fn test_load_config_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("missing.ron"))
            .expect("Failed to load config");
        assert_eq!(config.core.reset.base_world, "world");
        assert_eq!(config.core.scheduler.tick_millis, 50);
        assert_eq!(config.host.simulated_players, 4);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worldcycle.ron");
        std::fs::write(
            &path,
            r#"(
                runtime: "region",
                host: (dynamic_worlds: false),
                core: (pool: (size: 5, base_name: "arena")),
            )"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).expect("Failed to load config");
        assert_eq!(config.runtime.model(), Some(RuntimeModel::RegionThreaded));
        assert!(!config.host.dynamic_worlds);
        assert_eq!(config.core.pool.size, 5);
        assert_eq!(config.core.pool.slot_name(1), "arena_1");
        // Untouched keys keep their defaults
        assert_eq!(config.core.pool.regeneration_delay_ticks, 6000);
        assert_eq!(config.host.simulated_players, 4);
    }

    #[test]
    fn test_runtime_override_models() {
        assert_eq!(RuntimeOverride::Auto.model(), None);
        assert_eq!(
            RuntimeOverride::Global.model(),
            Some(RuntimeModel::GlobalLoop)
        );
    }
}
