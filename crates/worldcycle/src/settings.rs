//! Server settings persisted across runs in a small RON file

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use worldcycle_core::{Difficulty, SettingsStore};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredSettings {
    #[serde(default)]
    pub generate_structures: Option<bool>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    /// Seed of the most recent reset
    #[serde(default)]
    pub last_seed: Option<u64>,
}

/// [`SettingsStore`] backed by `settings.ron`
pub struct RonSettingsStore {
    path: PathBuf,
    state: Mutex<StoredSettings>,
}

impl RonSettingsStore {
    /// Open the store, starting empty if the file does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {:?}", path))?;
            ron::from_str(&contents)
                .with_context(|| format!("Failed to parse settings in {:?}", path))?
        } else {
            log::debug!("[SETTINGS] No settings at {:?}, using defaults", path);
            StoredSettings::default()
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn snapshot(&self) -> StoredSettings {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_seed(&self) -> Option<u64> {
        self.snapshot().last_seed
    }

    fn write(&self, settings: &StoredSettings) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        let serialized = ron::ser::to_string_pretty(settings, Default::default())
            .context("Failed to serialize settings")?;
        std::fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {:?}", self.path))
    }
}

impl SettingsStore for RonSettingsStore {
    fn saved_structure_generation(&self) -> Option<bool> {
        self.snapshot().generate_structures
    }

    fn saved_difficulty(&self) -> Option<Difficulty> {
        self.snapshot().difficulty
    }

    fn save_world_seed(&self, seed: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.last_seed = Some(seed);
        self.write(&state)?;
        log::info!("[SETTINGS] Saved world seed {} to {:?}", seed, self.path);
        Ok(())
    }
}
